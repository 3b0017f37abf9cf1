//! Storage traits and error types
//!
//! This module defines the collaborator interfaces the crawler persists
//! through and the associated error types.

use crate::storage::{CrawlJob, CrawlRequest, ImageRecord, JobUpdate, NewImageRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for crawl jobs
///
/// The crawler is the only writer for a given job id; implementations may
/// treat updates as last-writer-wins.
pub trait JobStore {
    /// Creates a new job in the `Pending` state
    fn create_job(&mut self, request: &CrawlRequest) -> StorageResult<CrawlJob>;

    /// Gets a job by ID
    fn get_job(&self, job_id: i64) -> StorageResult<Option<CrawlJob>>;

    /// Applies a partial update, returning the updated job
    ///
    /// Returns `Ok(None)` if the job does not exist.
    fn update_job(&mut self, job_id: i64, update: &JobUpdate) -> StorageResult<Option<CrawlJob>>;

    /// Lists all jobs, newest first
    fn list_jobs(&self) -> StorageResult<Vec<CrawlJob>>;
}

/// Persistence for discovered image occurrences
pub trait ImageStore {
    /// Stores an image record
    ///
    /// A record is unique per `(job_id, page_url, image_url)`; storing the
    /// same triple again returns the existing record instead of a duplicate.
    fn create_image(&mut self, record: &NewImageRecord) -> StorageResult<ImageRecord>;

    /// Lists records for a job in insertion order
    fn list_images_by_job(&self, job_id: i64) -> StorageResult<Vec<ImageRecord>>;

    /// Lists every record across all jobs in insertion order
    fn list_all_images(&self) -> StorageResult<Vec<ImageRecord>>;

    /// Counts records for a job
    fn count_images_by_job(&self, job_id: i64) -> StorageResult<u64>;

    /// Deletes every record belonging to a job
    fn delete_images_by_job(&mut self, job_id: i64) -> StorageResult<()>;
}
