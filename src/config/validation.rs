use crate::config::types::{Config, CrawlerConfig, OutputConfig, RetryConfig, UserAgentConfig};
use crate::storage::CrawlRequest;
use crate::{ConfigError, GleanError};
use url::Url;

/// Upper bound on `max_pages` for a single job
pub const MAX_PAGES_LIMIT: u32 = 1000;

/// Lower bound on the per-request timeout (milliseconds)
pub const MIN_TIMEOUT_MS: u64 = 2_000;

/// Upper bound on the per-request timeout (milliseconds)
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates a crawl request before a job is created for it
///
/// # Rules
///
/// - `target_url` parses as an absolute `http`/`https` URL with a host
/// - `max_pages` is within `1..=1000`
/// - `timeout_ms` is within `2000..=60000`
pub fn validate_request(request: &CrawlRequest) -> Result<(), GleanError> {
    let url = Url::parse(&request.target_url).map_err(|e| {
        GleanError::InvalidRequest(format!(
            "target URL '{}' is not a valid absolute URL: {}",
            request.target_url, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(GleanError::InvalidRequest(format!(
            "target URL must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(GleanError::InvalidRequest(format!(
            "target URL '{}' has no host",
            request.target_url
        )));
    }

    check_max_pages(request.max_pages).map_err(GleanError::InvalidRequest)?;
    check_timeout(request.timeout_ms).map_err(GleanError::InvalidRequest)?;

    Ok(())
}

fn check_max_pages(max_pages: u32) -> Result<(), String> {
    if max_pages < 1 || max_pages > MAX_PAGES_LIMIT {
        return Err(format!(
            "max_pages must be between 1 and {}, got {}",
            MAX_PAGES_LIMIT, max_pages
        ));
    }
    Ok(())
}

fn check_timeout(timeout_ms: u64) -> Result<(), String> {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        return Err(format!(
            "timeout_ms must be between {} and {}, got {}",
            MIN_TIMEOUT_MS, MAX_TIMEOUT_MS, timeout_ms
        ));
    }
    Ok(())
}

/// Validates crawler defaults
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    check_max_pages(config.max_pages).map_err(ConfigError::Validation)?;
    check_timeout(config.timeout_ms).map_err(ConfigError::Validation)?;
    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_base_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "timeout_base_delay_ms ({}ms) must not be shorter than base_delay_ms ({}ms)",
            config.timeout_base_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid contact URL '{}': {}",
            config.contact_url, e
        ))
    })?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain exactly one @ with text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, max_pages: u32, timeout_ms: u64) -> CrawlRequest {
        CrawlRequest {
            target_url: url.to_string(),
            max_pages,
            timeout_ms,
            include_css_backgrounds: false,
        }
    }

    #[test]
    fn test_validate_request_accepts_bounds() {
        assert!(validate_request(&request("https://example.com/", 1, 2_000)).is_ok());
        assert!(validate_request(&request("http://example.com:8080/a", 1000, 60_000)).is_ok());
    }

    #[test]
    fn test_validate_request_rejects_page_budget() {
        assert!(validate_request(&request("https://example.com/", 0, 10_000)).is_err());
        assert!(validate_request(&request("https://example.com/", 1001, 10_000)).is_err());
    }

    #[test]
    fn test_validate_request_rejects_timeout() {
        assert!(validate_request(&request("https://example.com/", 10, 1_999)).is_err());
        assert!(validate_request(&request("https://example.com/", 10, 60_001)).is_err());
    }

    #[test]
    fn test_validate_request_rejects_bad_urls() {
        assert!(validate_request(&request("/relative/path", 10, 10_000)).is_err());
        assert!(validate_request(&request("ftp://example.com/", 10, 10_000)).is_err());
        assert!(validate_request(&request("not a url", 10, 10_000)).is_err());
    }

    #[test]
    fn test_validate_retry_config() {
        let mut retry = RetryConfig::default();
        assert!(validate_retry_config(&retry).is_ok());

        retry.max_attempts = 0;
        assert!(validate_retry_config(&retry).is_err());

        retry.max_attempts = 3;
        retry.timeout_base_delay_ms = 10;
        retry.base_delay_ms = 100;
        assert!(validate_retry_config(&retry).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
