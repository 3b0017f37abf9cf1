use crate::UrlError;
use url::Url;

/// Resolves a possibly-relative reference against a base URL
///
/// # Resolution Steps
///
/// 1. Trim surrounding whitespace; reject empty references
/// 2. Join against `base` using standard URL reference resolution
///    (absolute references replace the base entirely)
/// 3. Reject anything that is not `http`/`https` after resolution
/// 4. Drop the fragment (everything after #)
///
/// # Arguments
///
/// * `reference` - The href/src value as written in the document
/// * `base` - The URL of the page the reference was found on
///
/// # Returns
///
/// * `Ok(Url)` - Absolute URL without fragment
/// * `Err(UrlError)` - The reference could not be resolved
///
/// # Examples
///
/// ```
/// use sumi_glean::url::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/blog/post").unwrap();
/// let url = resolve_url("../img/a.png#x", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/img/a.png");
/// ```
pub fn resolve_url(reference: &str, base: &Url) -> Result<Url, UrlError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UrlError::Parse("empty reference".to_string()));
    }

    let mut url = base
        .join(reference)
        .map_err(|e| UrlError::Parse(format!("{}: {}", reference, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Parses a seed URL, which must already be absolute
pub fn parse_seed(raw: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Returns the last non-empty path segment of a URL, if any
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Returns the lowercase extension of the last path segment, if any
///
/// `https://x.com/img/Photo.JPG?w=2` yields `jpg`; a segment without a dot,
/// or with nothing after the last dot, yields `None`.
pub fn path_extension(url: &Url) -> Option<String> {
    let segment = last_path_segment(url)?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
