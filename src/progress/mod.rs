//! Progress reporting for crawl jobs
//!
//! The coordinator publishes a [`ProgressSnapshot`] whenever a job's counters
//! change. Callers attach through [`ProgressHub::subscribe`] and receive
//! snapshots until the job reaches a terminal state, at which point the
//! channel closes.

mod hub;

pub use hub::{ProgressHub, DEFAULT_CHANNEL_CAPACITY};

use crate::state::JobStatus;
use crate::storage::CrawlJob;
use serde::Serialize;
use std::fmt;

/// Point-in-time summary of a job's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub job_id: i64,
    pub status: JobStatus,
    pub progress: u8,
    pub pages_processed: u32,
    pub total_pages_found: u32,
    pub images_found: u32,
    pub current_page: Option<String>,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Builds a snapshot from the stored job
    pub fn from_job(job: &CrawlJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            pages_processed: job.pages_processed,
            total_pages_found: job.total_pages_found,
            images_found: job.images_found,
            current_page: job.current_page.clone(),
            error: job.error.clone(),
        }
    }

    /// Returns true if this is the last snapshot a job will emit
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[job {}] {} {:>3}% pages={} found={} images={}",
            self.job_id,
            self.status,
            self.progress,
            self.pages_processed,
            self.total_pages_found,
            self.images_found
        )?;
        if let Some(page) = &self.current_page {
            write!(f, " current={}", page)?;
        }
        if let Some(error) = &self.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}
