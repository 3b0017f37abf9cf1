//! Crawler coordinator - job lifecycle and the traversal loop
//!
//! This module ties the crawl together, including:
//! - Accepting and validating crawl requests
//! - Driving the pending -> running -> completed/failed state machine
//! - Running the fetch -> extract -> enqueue -> persist loop for a job
//! - Publishing progress snapshots after every page
//! - Guarding against duplicate starts and honouring cancellation

use crate::config::{validate_request, Config};
use crate::crawler::extractor::{Extractor, ImageCandidate};
use crate::crawler::fetcher::{build_http_client, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::retry::RetryPolicy;
use crate::progress::{ProgressHub, ProgressSnapshot};
use crate::state::JobStatus;
use crate::storage::{
    CrawlJob, CrawlRequest, ImageRecord, ImageStore, JobStore, JobUpdate, NewImageRecord,
    StorageError,
};
use crate::url::parse_seed;
use crate::GleanError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

/// Result of asking the coordinator to start a job
#[derive(Debug)]
pub enum StartOutcome {
    /// The traversal was spawned; the handle resolves to the final job
    Started(JoinHandle<Result<CrawlJob, GleanError>>),
    /// The job is already being crawled; the request was ignored
    AlreadyRunning,
}

/// Orchestrates crawl jobs against a shared store
///
/// Cloning is cheap and clones share all state, so a coordinator can be
/// handed to request handlers while jobs run in the background.
pub struct Coordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    storage: Mutex<S>,
    fetcher: PageFetcher,
    extractor: Extractor,
    hub: ProgressHub,
    running: Mutex<HashSet<i64>>,
    cancelled: Mutex<HashSet<i64>>,
}

/// Removes a job from the running set when its task ends, however it ends
struct RunningGuard<S> {
    inner: Arc<Inner<S>>,
    job_id: i64,
}

impl<S> Drop for RunningGuard<S> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.inner.running.lock() {
            running.remove(&self.job_id);
        }
        if let Ok(mut cancelled) = self.inner.cancelled.lock() {
            cancelled.remove(&self.job_id);
        }
    }
}

impl<S> Coordinator<S>
where
    S: JobStore + ImageStore + Send + 'static,
{
    /// Creates a coordinator from configuration and a store
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to accept jobs
    /// * `Err(GleanError)` - The HTTP client could not be built
    pub fn new(config: &Config, storage: S) -> Result<Self, GleanError> {
        let client = build_http_client(&config.user_agent)?;
        let fetcher = PageFetcher::new(client, RetryPolicy::from(&config.retry));
        let extractor = Extractor::from_config(&config.crawler);

        Ok(Self::with_parts(storage, fetcher, extractor, ProgressHub::new()))
    }

    /// Creates a coordinator from pre-built parts
    pub fn with_parts(storage: S, fetcher: PageFetcher, extractor: Extractor, hub: ProgressHub) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage: Mutex::new(storage),
                fetcher,
                extractor,
                hub,
                running: Mutex::new(HashSet::new()),
                cancelled: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Validates a request and records a new pending job
    pub fn submit(&self, request: CrawlRequest) -> Result<CrawlJob, GleanError> {
        validate_request(&request)?;
        let job = self.with_storage(|s| s.create_job(&request))?;
        tracing::info!("Submitted job {} for {}", job.id, job.target_url);
        Ok(job)
    }

    /// Starts crawling a pending job in the background
    ///
    /// A job that is already running is left alone and
    /// [`StartOutcome::AlreadyRunning`] is returned. Jobs that have finished
    /// cannot be started again.
    pub fn start(&self, job_id: i64) -> Result<StartOutcome, GleanError> {
        {
            let mut running = self.inner.running.lock().map_err(|_| StorageError::LockPoisoned)?;
            if running.contains(&job_id) {
                tracing::info!("Job {} is already running; ignoring start request", job_id);
                return Ok(StartOutcome::AlreadyRunning);
            }

            let job = self.job(job_id)?;
            if !job.status.can_transition_to(JobStatus::Running) {
                return Err(GleanError::InvalidTransition {
                    from: job.status,
                    to: JobStatus::Running,
                });
            }
            running.insert(job_id);
        }

        let guard = RunningGuard {
            inner: Arc::clone(&self.inner),
            job_id,
        };
        let coordinator = self.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            coordinator.run_job(job_id).await
        });

        Ok(StartOutcome::Started(handle))
    }

    /// Submits a request, runs it to completion and returns the final job
    pub async fn crawl(&self, request: CrawlRequest) -> Result<CrawlJob, GleanError> {
        let job = self.submit(request)?;
        match self.start(job.id)? {
            StartOutcome::Started(handle) => handle
                .await
                .map_err(|e| GleanError::Io(std::io::Error::other(e)))?,
            StartOutcome::AlreadyRunning => Err(GleanError::InvalidTransition {
                from: JobStatus::Running,
                to: JobStatus::Running,
            }),
        }
    }

    /// Subscribes to a job's progress snapshots
    ///
    /// A job that already finished yields its stored terminal snapshot
    /// followed by end-of-stream.
    pub async fn subscribe(&self, job_id: i64) -> Result<broadcast::Receiver<ProgressSnapshot>, GleanError> {
        let job = self.job(job_id)?;
        if job.status.is_terminal() {
            return Ok(ProgressHub::replay(ProgressSnapshot::from_job(&job)));
        }
        Ok(self.inner.hub.subscribe(job_id).await)
    }

    /// Requests cooperative cancellation of a running job
    ///
    /// The traversal notices the request before its next page and fails the
    /// job with "crawl cancelled". Returns false if the job is not running.
    pub fn cancel(&self, job_id: i64) -> Result<bool, GleanError> {
        let running = self.inner.running.lock().map_err(|_| StorageError::LockPoisoned)?;
        if !running.contains(&job_id) {
            return Ok(false);
        }

        let mut cancelled = self.inner.cancelled.lock().map_err(|_| StorageError::LockPoisoned)?;
        cancelled.insert(job_id);
        tracing::info!("Cancellation requested for job {}", job_id);
        Ok(true)
    }

    /// Returns true if the job currently has a traversal in flight
    pub fn is_running(&self, job_id: i64) -> bool {
        self.inner
            .running
            .lock()
            .map(|running| running.contains(&job_id))
            .unwrap_or(false)
    }

    /// Gets a job, failing with `JobNotFound` if it does not exist
    pub fn job(&self, job_id: i64) -> Result<CrawlJob, GleanError> {
        self.with_storage(|s| s.get_job(job_id))?
            .ok_or(GleanError::JobNotFound(job_id))
    }

    pub fn jobs(&self) -> Result<Vec<CrawlJob>, GleanError> {
        self.with_storage(|s| s.list_jobs())
    }

    /// Lists the image records a job produced
    pub fn images(&self, job_id: i64) -> Result<Vec<ImageRecord>, GleanError> {
        self.job(job_id)?;
        self.with_storage(|s| s.list_images_by_job(job_id))
    }

    /// Runs the traversal for a job and records the terminal state
    ///
    /// Any error escaping the run, including a rejected completion write,
    /// moves the job to `Failed`. The job's progress channel is closed on
    /// every path, with a synthesized failed snapshot if even the failure
    /// could not be stored.
    async fn run_job(&self, job_id: i64) -> Result<CrawlJob, GleanError> {
        let job = match self.job(job_id) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Job {}: could not load job: {}", job_id, e);
                self.inner.hub.finish(unloadable_job_snapshot(job_id, &e)).await;
                return Err(e);
            }
        };

        let (result, terminal) = match self.drive(&job).await {
            Ok(done) => {
                tracing::info!(
                    "Job {} completed: {} pages, {} images",
                    done.id,
                    done.pages_processed,
                    done.images_found
                );
                let snapshot = ProgressSnapshot::from_job(&done);
                (Ok(done), snapshot)
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job_id, e);
                let message = e.to_string();
                match self.mark_failed(job_id, &message) {
                    Ok(failed) => {
                        let snapshot = ProgressSnapshot::from_job(&failed);
                        (Ok(failed), snapshot)
                    }
                    Err(store_err) => {
                        tracing::error!("Job {}: could not record failure: {}", job_id, store_err);
                        let mut snapshot = ProgressSnapshot::from_job(&job);
                        snapshot.status = JobStatus::Failed;
                        snapshot.error = Some(message);
                        (Err(store_err), snapshot)
                    }
                }
            }
        };

        self.inner.hub.finish(terminal).await;
        result
    }

    /// Moves the job to running, traverses it and records completion
    async fn drive(&self, job: &CrawlJob) -> Result<CrawlJob, GleanError> {
        let job_id = job.id;
        let job = self.transition(
            job_id,
            JobStatus::Running,
            JobUpdate {
                progress: Some(0),
                pages_processed: Some(0),
                total_pages_found: Some(1),
                images_found: Some(0),
                current_page: Some(Some(job.target_url.clone())),
                ..Default::default()
            },
        )?;
        tracing::info!("Starting job {}: {} (max {} pages)", job.id, job.target_url, job.max_pages);
        self.inner.hub.publish(ProgressSnapshot::from_job(&job)).await;

        let frontier = self.traverse(&job).await?;
        self.transition(
            job_id,
            JobStatus::Completed,
            JobUpdate {
                progress: Some(100),
                pages_processed: Some(frontier.pages_processed()),
                total_pages_found: Some(count(frontier.total_found())),
                current_page: Some(None),
                completed_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
    }

    fn mark_failed(&self, job_id: i64, message: &str) -> Result<CrawlJob, GleanError> {
        self.transition(
            job_id,
            JobStatus::Failed,
            JobUpdate {
                error: Some(Some(message.to_string())),
                completed_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
    }

    /// The breadth-first loop; per-page failures never end it
    async fn traverse(&self, job: &CrawlJob) -> Result<Frontier, GleanError> {
        let seed = parse_seed(&job.target_url)?;
        let timeout = Duration::from_millis(job.timeout_ms);
        let mut frontier = Frontier::new(seed, job.max_pages);

        loop {
            if self.is_cancelled(job.id)? {
                return Err(GleanError::Cancelled);
            }

            let Some(page_url) = frontier.next_url() else {
                break;
            };
            tracing::debug!("Job {}: fetching {}", job.id, page_url);

            let images_found = match self.inner.fetcher.fetch(page_url.as_str(), timeout).await {
                Ok(html) => {
                    let extraction = self
                        .inner
                        .extractor
                        .extract(&html, &page_url, job.include_css_backgrounds);
                    let added = frontier.enqueue_all(extraction.links);
                    tracing::debug!("Job {}: {} new link(s) from {}", job.id, added, page_url);

                    let images_found = self.persist_images(job.id, &page_url, &extraction.images)?;
                    frontier.record_processed();
                    Some(images_found)
                }
                Err(e) => {
                    tracing::warn!("Job {}: skipping {}: {}", job.id, page_url, e);
                    None
                }
            };

            let job = self.update(
                job.id,
                JobUpdate {
                    progress: Some(frontier.progress_percent()),
                    pages_processed: Some(frontier.pages_processed()),
                    total_pages_found: Some(count(frontier.total_found())),
                    images_found,
                    current_page: Some(Some(page_url.to_string())),
                    ..Default::default()
                },
            )?;
            self.inner.hub.publish(ProgressSnapshot::from_job(&job)).await;
        }

        Ok(frontier)
    }

    /// Stores a page's images and returns the job's running image total
    fn persist_images(&self, job_id: i64, page_url: &Url, images: &[ImageCandidate]) -> Result<u32, GleanError> {
        let total = self.with_storage(|s| {
            for candidate in images {
                s.create_image(&NewImageRecord::from_candidate(job_id, page_url, candidate))?;
            }
            s.count_images_by_job(job_id)
        })?;

        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    /// Applies an update that moves the job to a new status
    fn transition(&self, job_id: i64, to: JobStatus, update: JobUpdate) -> Result<CrawlJob, GleanError> {
        let current = self.job(job_id)?;
        if !current.status.can_transition_to(to) {
            return Err(GleanError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        self.update(
            job_id,
            JobUpdate {
                status: Some(to),
                ..update
            },
        )
    }

    fn update(&self, job_id: i64, update: JobUpdate) -> Result<CrawlJob, GleanError> {
        self.with_storage(|s| s.update_job(job_id, &update))?
            .ok_or(GleanError::JobNotFound(job_id))
    }

    fn is_cancelled(&self, job_id: i64) -> Result<bool, GleanError> {
        let cancelled = self.inner.cancelled.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(cancelled.contains(&job_id))
    }

    /// Runs `f` with the store locked; the lock is never held across an await
    fn with_storage<T>(&self, f: impl FnOnce(&mut S) -> Result<T, StorageError>) -> Result<T, GleanError> {
        let mut storage = self.inner.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&mut storage)?)
    }
}

/// Terminal snapshot for a job whose record could not be read back
fn unloadable_job_snapshot(job_id: i64, error: &GleanError) -> ProgressSnapshot {
    ProgressSnapshot {
        job_id,
        status: JobStatus::Failed,
        progress: 0,
        pages_processed: 0,
        total_pages_found: 0,
        images_found: 0,
        current_page: None,
        error: Some(error.to_string()),
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
