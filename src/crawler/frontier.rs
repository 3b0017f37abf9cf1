//! Crawl frontier and page budget
//!
//! This module handles:
//! - The FIFO queue of discovered-but-unfetched URLs
//! - The visited set, so no URL is fetched twice in one job
//! - The page budget, which counts successfully processed pages only

use std::collections::{HashSet, VecDeque};
use url::Url;

/// Breadth-first traversal state for a single crawl job
///
/// A URL is in at most one of `queue` and `visited` at any time: it moves
/// from the queue to the visited set when handed out by [`Frontier::next_url`],
/// and [`Frontier::enqueue`] refuses anything already in either.
#[derive(Debug, Clone)]
pub struct Frontier {
    queue: VecDeque<Url>,
    queued: HashSet<Url>,
    visited: HashSet<Url>,
    max_pages: u32,
    pages_processed: u32,
}

impl Frontier {
    /// Creates a frontier holding only the seed URL
    pub fn new(seed: Url, max_pages: u32) -> Self {
        let mut frontier = Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            max_pages,
            pages_processed: 0,
        };
        frontier.enqueue(seed);
        frontier
    }

    /// Hands out the next URL to fetch and marks it visited
    ///
    /// Returns `None` when the queue is empty or the page budget is spent.
    /// Already-visited URLs are skipped without consuming budget.
    pub fn next_url(&mut self) -> Option<Url> {
        while !self.budget_reached() {
            let url = self.queue.pop_front()?;
            self.queued.remove(&url);

            if self.visited.insert(url.clone()) {
                return Some(url);
            }
            tracing::trace!("Skipping already visited {}", url);
        }
        None
    }

    /// Adds a URL to the back of the queue unless already known
    ///
    /// Returns true if the URL was newly queued.
    pub fn enqueue(&mut self, url: Url) -> bool {
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return false;
        }
        self.queued.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Queues every new URL in order; returns how many were added
    pub fn enqueue_all(&mut self, urls: impl IntoIterator<Item = Url>) -> usize {
        urls.into_iter().map(|url| self.enqueue(url)).filter(|&added| added).count()
    }

    /// Records a page that was fetched and extracted successfully
    pub fn record_processed(&mut self) {
        self.pages_processed = self.pages_processed.saturating_add(1);
    }

    /// Returns true once `max_pages` pages have been processed
    pub fn budget_reached(&self) -> bool {
        self.pages_processed >= self.max_pages
    }

    #[cfg(test)]
    fn is_exhausted(&self) -> bool {
        self.queue.is_empty() || self.budget_reached()
    }

    pub fn pages_processed(&self) -> u32 {
        self.pages_processed
    }

    /// Visited plus queued URLs
    pub fn total_found(&self) -> usize {
        self.visited.len() + self.queue.len()
    }

    #[cfg(test)]
    fn visited_count(&self) -> usize {
        self.visited.len()
    }

    #[cfg(test)]
    fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Percentage of the page budget used, rounded and capped at 100
    pub fn progress_percent(&self) -> u8 {
        if self.max_pages == 0 {
            return 100;
        }
        let percent = (f64::from(self.pages_processed) / f64::from(self.max_pages) * 100.0).round();
        percent.min(100.0) as u8
    }
}
