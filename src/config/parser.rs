use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration from TOML text
///
/// Missing optional sections (`[retry]`) and keys take their defaults before
/// validation runs.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads a configuration file from the given path
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_glean::config::load_config;
///
/// let config = load_config(Path::new("glean.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Hex-encoded SHA-256 of a configuration file's bytes
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration and the hash of the exact bytes it was parsed from
///
/// The file is read once, so the hash always matches the loaded config even
/// if the file changes on disk meanwhile.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(content.as_bytes())))
}

fn hash_content(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
