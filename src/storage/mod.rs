//! Storage module for persisting crawl data
//!
//! This module handles persistence of crawl jobs and the image records they
//! produce, including:
//! - The `JobStore` and `ImageStore` collaborator traits
//! - A SQLite implementation of both
//! - The record types shared between the crawler and its stores

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ImageStore, JobStore, StorageError, StorageResult};

use crate::crawler::ImageCandidate;
use crate::state::JobStatus;
use crate::url::{last_path_segment, path_extension};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// Maximum number of characters kept from an image's source markup
pub const RAW_MARKUP_LIMIT: usize = 500;

/// The caller-facing description of a crawl to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Absolute seed URL
    pub target_url: String,
    /// Page budget, 1..=1000
    pub max_pages: u32,
    /// Per-request timeout in milliseconds, 2000..=60000
    pub timeout_ms: u64,
    /// Whether to scan for CSS `background-image` declarations
    pub include_css_backgrounds: bool,
}

/// A crawl job as stored by the job store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlJob {
    pub id: i64,
    pub target_url: String,
    pub max_pages: u32,
    pub timeout_ms: u64,
    pub include_css_backgrounds: bool,
    pub status: JobStatus,
    pub progress: u8,
    pub pages_processed: u32,
    pub total_pages_found: u32,
    pub images_found: u32,
    pub current_page: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    /// Returns the request this job was created from
    pub fn request(&self) -> CrawlRequest {
        CrawlRequest {
            target_url: self.target_url.clone(),
            max_pages: self.max_pages,
            timeout_ms: self.timeout_ms,
            include_css_backgrounds: self.include_css_backgrounds,
        }
    }

    /// Applies a partial update in place
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(pages_processed) = update.pages_processed {
            self.pages_processed = pages_processed;
        }
        if let Some(total_pages_found) = update.total_pages_found {
            self.total_pages_found = total_pages_found;
        }
        if let Some(images_found) = update.images_found {
            self.images_found = images_found;
        }
        if let Some(current_page) = &update.current_page {
            self.current_page = current_page.clone();
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = completed_at;
        }
    }
}

/// A partial update to a crawl job
///
/// `None` leaves a field untouched. Nullable fields use a nested `Option`
/// so they can be explicitly cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub pages_processed: Option<u32>,
    pub total_pages_found: Option<u32>,
    pub images_found: Option<u32>,
    pub current_page: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

/// An image record ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImageRecord {
    pub job_id: i64,
    pub page_url: String,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub raw_markup: String,
    pub image_type: Option<String>,
    pub filename: Option<String>,
}

impl NewImageRecord {
    /// Builds a record from an extracted candidate
    ///
    /// Empty alt text becomes `None`; markup is collapsed to a single line
    /// and bounded to [`RAW_MARKUP_LIMIT`] characters.
    pub fn from_candidate(job_id: i64, page_url: &Url, candidate: &ImageCandidate) -> Self {
        let alt_text = Some(candidate.alt_text.trim())
            .filter(|alt| !alt.is_empty())
            .map(str::to_string);

        Self {
            job_id,
            page_url: page_url.to_string(),
            image_url: candidate.image_url.to_string(),
            alt_text,
            raw_markup: condense_markup(&candidate.raw_markup),
            image_type: path_extension(&candidate.image_url),
            filename: last_path_segment(&candidate.image_url),
        }
    }
}

/// A persisted image occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub job_id: i64,
    pub page_url: String,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub raw_markup: String,
    pub image_type: Option<String>,
    pub filename: Option<String>,
    /// Filled in by external enrichment, never by the crawler
    pub dimensions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Collapses line breaks to single spaces and truncates to the markup limit
pub fn condense_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len().min(RAW_MARKUP_LIMIT));
    let mut in_break = false;

    for c in markup.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }

    match out.char_indices().nth(RAW_MARKUP_LIMIT) {
        Some((idx, _)) => out[..idx].to_string(),
        None => out,
    }
}
