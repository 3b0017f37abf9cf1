//! Image and link extraction from raw HTML
//!
//! Extraction runs over the tag stream produced by the scanner; nothing here
//! builds a DOM. Image candidates come from three sources, always emitted in
//! this order:
//!
//! 1. `<img src>` elements
//! 2. `<source srcset>` elements inside a `<picture>` (first srcset entry)
//! 3. `background-image: url(...)` anywhere in the raw text, when enabled
//!
//! Every image URL is entity-decoded, resolved against the page URL and then
//! passed through the configured rewrite hooks. Candidates whose URL is empty
//! or fails to resolve are dropped.

use crate::config::CrawlerConfig;
use crate::crawler::rewrite::{NextImageRewrite, UrlRewrite};
use crate::crawler::scanner::{Scanner, Token};
use crate::url::{frontier_link, resolve_url};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Matches `background-image: url(...)` and captures the URL
static CSS_BACKGROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background-image\s*:\s*url\(\s*(?:&quot;|["'])?([^)]*?)(?:&quot;|["'])?\s*\)"#)
        .expect("valid background-image regex")
});

/// Entities decoded in attribute values and CSS URLs
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

/// A provisional image reference found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// Resolved absolute URL, after rewrite hooks
    pub image_url: Url,
    /// Decoded alt text; empty when absent
    pub alt_text: String,
    /// The markup the image was found in
    pub raw_markup: String,
}

/// Everything extracted from a single page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Frontier-eligible links in document order, without duplicates
    pub links: Vec<Url>,
    /// Image candidates in source order
    pub images: Vec<ImageCandidate>,
}

/// Extracts links and image candidates from HTML pages
#[derive(Debug, Default)]
pub struct Extractor {
    rewrites: Vec<Box<dyn UrlRewrite>>,
}

impl Extractor {
    /// Creates an extractor with no rewrite hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an extractor with the hooks enabled in the crawler config
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let extractor = Self::new();
        if config.next_image_fixup {
            extractor.with_rewrite(NextImageRewrite::default())
        } else {
            extractor
        }
    }

    /// Adds a rewrite hook; hooks run in registration order
    pub fn with_rewrite(mut self, hook: impl UrlRewrite + 'static) -> Self {
        self.rewrites.push(Box::new(hook));
        self
    }

    /// Extracts links and images from a page
    ///
    /// # Arguments
    ///
    /// * `html` - Raw page body
    /// * `page_url` - URL the page was fetched from; relative references
    ///   resolve against it and links must share its origin
    /// * `include_css_backgrounds` - Whether to scan for CSS background images
    pub fn extract(&self, html: &str, page_url: &Url, include_css_backgrounds: bool) -> Extraction {
        let mut links = Vec::new();
        let mut seen_links = HashSet::new();
        let mut img_images = Vec::new();
        let mut picture_images = Vec::new();
        let mut picture_depth = 0usize;

        for token in Scanner::new(html) {
            let tag = match token {
                Token::Start(tag) => tag,
                Token::End(name) => {
                    if name == "picture" {
                        picture_depth = picture_depth.saturating_sub(1);
                    }
                    continue;
                }
            };

            match tag.name.as_str() {
                "a" => {
                    let Some(href) = tag.attr("href") else { continue };
                    if let Some(link) = frontier_link(&decode_entities(href), page_url, page_url) {
                        if seen_links.insert(link.clone()) {
                            links.push(link);
                        }
                    }
                }
                "img" => {
                    let Some(src) = tag.attr("src").filter(|s| !s.trim().is_empty()) else {
                        continue;
                    };
                    if let Some(image_url) = self.image_url(src, page_url) {
                        let alt_text = tag
                            .attr("alt")
                            .map(|alt| decode_entities(alt).into_owned())
                            .unwrap_or_default();
                        img_images.push(ImageCandidate {
                            image_url,
                            alt_text,
                            raw_markup: tag.raw.to_string(),
                        });
                    }
                }
                "picture" if !tag.self_closing => picture_depth += 1,
                "source" if picture_depth > 0 => {
                    let Some(srcset) = tag.attr("srcset") else { continue };
                    let image_url = first_srcset_url(srcset).and_then(|u| self.image_url(u, page_url));
                    if let Some(image_url) = image_url {
                        picture_images.push(ImageCandidate {
                            image_url,
                            alt_text: String::new(),
                            raw_markup: tag.raw.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        let mut images = img_images;
        images.append(&mut picture_images);

        if include_css_backgrounds {
            images.extend(self.css_backgrounds(html, page_url));
        }

        tracing::debug!(
            "Extracted {} link(s) and {} image(s) from {}",
            links.len(),
            images.len(),
            page_url
        );

        Extraction { links, images }
    }

    /// Scans raw text for `background-image: url(...)` declarations
    fn css_backgrounds(&self, html: &str, page_url: &Url) -> Vec<ImageCandidate> {
        CSS_BACKGROUND
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let image_url = self.image_url(caps.get(1)?.as_str(), page_url)?;
                Some(ImageCandidate {
                    image_url,
                    alt_text: String::new(),
                    raw_markup: whole.as_str().to_string(),
                })
            })
            .collect()
    }

    /// Decodes, resolves and rewrites a raw image reference
    fn image_url(&self, raw: &str, page_url: &Url) -> Option<Url> {
        let decoded = decode_entities(raw);
        let url = match resolve_url(&decoded, page_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!("Dropping image reference {:?}: {}", raw, e);
                return None;
            }
        };

        Some(self.rewrites.iter().fold(url, |url, hook| hook.rewrite(url)))
    }
}

/// Returns the URL of the first srcset entry, without its descriptor
fn first_srcset_url(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()?
        .split_whitespace()
        .next()
        .filter(|url| !url.is_empty())
}

/// Decodes the small set of HTML entities found in attribute values
///
/// Decoding is a single left-to-right pass, so the output of one decode is
/// never re-interpreted. Unknown entities are left as written. Decoding is
/// not idempotent on double-encoded text: `&amp;lt;` decodes to `&lt;`, and
/// decoding that again yields `<`. Call it exactly once per raw value.
///
/// # Examples
///
/// ```
/// use sumi_glean::crawler::decode_entities;
///
/// assert_eq!(decode_entities("a.png?w=1&amp;h=2"), "a.png?w=1&h=2");
/// assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
/// ```
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, replacement)) => {
                out.push_str(replacement);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}
