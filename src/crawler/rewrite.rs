//! URL rewrite hooks applied to extracted image URLs
//!
//! The extractor stays free of site-specific knowledge; anything that needs
//! to adjust a resolved image URL for a particular site or framework plugs in
//! here instead.

use std::fmt;
use url::Url;

/// Default width injected into Next.js image-proxy URLs
pub const NEXT_IMAGE_DEFAULT_WIDTH: u32 = 1920;

/// Default quality injected into Next.js image-proxy URLs
pub const NEXT_IMAGE_DEFAULT_QUALITY: u32 = 75;

/// A transformation applied to every resolved image URL
pub trait UrlRewrite: fmt::Debug + Send + Sync {
    /// Returns the rewritten URL, or the input unchanged if the hook does not apply
    fn rewrite(&self, url: Url) -> Url;
}

/// Completes Next.js `/_next/image` proxy URLs
///
/// The proxy rejects requests without `w` and `q` parameters, but pages often
/// reference it with only `url=`. When the path contains `/_next/image` and a
/// `url` parameter is present, missing `w`/`q` parameters are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextImageRewrite {
    width: u32,
    quality: u32,
}

impl NextImageRewrite {
    pub fn new(width: u32, quality: u32) -> Self {
        Self { width, quality }
    }

    fn applies_to(url: &Url) -> bool {
        url.path().contains("/_next/image") && url.query_pairs().any(|(key, _)| key == "url")
    }
}

impl Default for NextImageRewrite {
    fn default() -> Self {
        Self::new(NEXT_IMAGE_DEFAULT_WIDTH, NEXT_IMAGE_DEFAULT_QUALITY)
    }
}

impl UrlRewrite for NextImageRewrite {
    fn rewrite(&self, mut url: Url) -> Url {
        if !Self::applies_to(&url) {
            return url;
        }

        let has_width = url.query_pairs().any(|(key, _)| key == "w");
        let has_quality = url.query_pairs().any(|(key, _)| key == "q");

        if !has_width || !has_quality {
            let mut pairs = url.query_pairs_mut();
            if !has_width {
                pairs.append_pair("w", &self.width.to_string());
            }
            if !has_quality {
                pairs.append_pair("q", &self.quality.to_string());
            }
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(input: &str) -> String {
        NextImageRewrite::default()
            .rewrite(Url::parse(input).unwrap())
            .to_string()
    }

    #[test]
    fn test_adds_missing_width_and_quality() {
        assert_eq!(
            rewrite("https://example.com/_next/image?url=%2Fhero.jpg"),
            "https://example.com/_next/image?url=%2Fhero.jpg&w=1920&q=75"
        );
    }

    #[test]
    fn test_keeps_existing_parameters() {
        assert_eq!(
            rewrite("https://example.com/_next/image?url=%2Fhero.jpg&w=640"),
            "https://example.com/_next/image?url=%2Fhero.jpg&w=640&q=75"
        );
        assert_eq!(
            rewrite("https://example.com/_next/image?url=%2Fa.jpg&w=640&q=90"),
            "https://example.com/_next/image?url=%2Fa.jpg&w=640&q=90"
        );
    }

    #[test]
    fn test_requires_url_parameter() {
        assert_eq!(
            rewrite("https://example.com/_next/image?w=640"),
            "https://example.com/_next/image?w=640"
        );
    }

    #[test]
    fn test_other_paths_untouched() {
        assert_eq!(
            rewrite("https://example.com/images/a.png?url=x"),
            "https://example.com/images/a.png?url=x"
        );
    }

    #[test]
    fn test_custom_defaults() {
        let hook = NextImageRewrite::new(800, 50);
        let url = hook.rewrite(Url::parse("https://example.com/_next/image?url=a.png").unwrap());
        assert_eq!(url.query(), Some("url=a.png&w=800&q=50"));
    }
}
