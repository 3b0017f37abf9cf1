//! Crawler module for page fetching and image discovery
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with a standalone retry policy
//! - Tolerant HTML scanning and image/link extraction
//! - Pluggable rewrite hooks for extracted image URLs
//! - The breadth-first frontier and page budget
//! - Job orchestration and progress publishing

mod coordinator;
mod extractor;
mod fetcher;
mod frontier;
mod retry;
pub mod rewrite;
pub mod scanner;

pub use coordinator::{Coordinator, StartOutcome};
pub use extractor::{decode_entities, Extraction, Extractor, ImageCandidate};
pub use fetcher::{build_http_client, fetch_once, FetchError, PageFetcher};
pub use frontier::Frontier;
pub use retry::RetryPolicy;
pub use rewrite::{NextImageRewrite, UrlRewrite};
