//! URL handling module for Sumi-Glean
//!
//! This module provides reference resolution, origin classification and the
//! page-extension filter that together decide which discovered links may
//! enter the crawl frontier.

mod resolve;

use url::Url;

// Re-export main functions
pub use resolve::{last_path_segment, parse_seed, path_extension, resolve_url};

/// Extensions that never denote a crawlable HTML page
pub const NON_PAGE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "zip", "exe", "dmg", "jpg", "jpeg", "png", "gif", "svg", "webp",
    "ico", "css", "js",
];

/// Origin classification of a URL relative to the crawl seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginClassification {
    /// Same scheme, host and port as the seed
    SameOrigin,
    /// Anything else - recorded nowhere, never fetched
    CrossOrigin,
}

impl OriginClassification {
    /// Returns true if URLs with this classification may be crawled
    pub fn should_crawl(&self) -> bool {
        matches!(self, Self::SameOrigin)
    }
}

/// Classifies `url` against the origin of `origin_url`
///
/// Two URLs share an origin when scheme, host and port (after default-port
/// resolution) are identical.
///
/// # Examples
///
/// ```
/// use sumi_glean::url::{classify_origin, OriginClassification};
/// use url::Url;
///
/// let seed = Url::parse("https://example.com/").unwrap();
/// let link = Url::parse("https://example.com:443/about").unwrap();
/// assert_eq!(classify_origin(&link, &seed), OriginClassification::SameOrigin);
///
/// let other = Url::parse("http://example.com/about").unwrap();
/// assert_eq!(classify_origin(&other, &seed), OriginClassification::CrossOrigin);
/// ```
pub fn classify_origin(url: &Url, origin_url: &Url) -> OriginClassification {
    if url.origin() == origin_url.origin() {
        OriginClassification::SameOrigin
    } else {
        OriginClassification::CrossOrigin
    }
}

/// Returns true if `url` shares the origin of `origin_url`
pub fn is_same_origin(url: &Url, origin_url: &Url) -> bool {
    classify_origin(url, origin_url).should_crawl()
}

/// Returns true if the URL path ends in a known non-page extension
pub fn is_non_page_resource(url: &Url) -> bool {
    path_extension(url)
        .map(|ext| NON_PAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Turns an href into a frontier-eligible URL, if it is one
///
/// Returns `None` (silently) when the href:
/// - fails to resolve against `page_url`, or resolves to a non-http(s) scheme
/// - points to a different origin than `origin_url`
/// - ends in one of [`NON_PAGE_EXTENSIONS`]
///
/// The returned URL never carries a fragment.
pub fn frontier_link(href: &str, page_url: &Url, origin_url: &Url) -> Option<Url> {
    let url = match resolve_url(href, page_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::trace!("Dropping link {:?}: {}", href, e);
            return None;
        }
    };

    if !is_same_origin(&url, origin_url) {
        tracing::trace!("Dropping cross-origin link {}", url);
        return None;
    }

    if is_non_page_resource(&url) {
        tracing::trace!("Dropping non-page resource {}", url);
        return None;
    }

    Some(url)
}
