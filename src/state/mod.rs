//! State module for tracking crawl job lifecycle
//!
//! # Components
//!
//! - `JobStatus`: the pending -> running -> completed | failed state machine

mod job_status;

// Re-export main types
pub use job_status::JobStatus;
