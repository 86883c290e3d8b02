// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::env::DriverConfig;

pub const CONFIG_FILE_NAME: &str = "rabbit-redial.json";

/// Looks for the config file in the working directory, `config/`, then the home directory.
pub fn find_config_file() -> Result<PathBuf> {
    let locations = [
        ("Current directory", PathBuf::from(CONFIG_FILE_NAME)),
        ("Config directory", Path::new("config").join(CONFIG_FILE_NAME)),
    ];

    for (location_name, path) in locations.iter() {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Ok(path.to_path_buf());
        }
    }

    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Ok(home_config);
        }
    }

    Err(anyhow!(
        "Could not find {} in the current directory, config/ or your home directory",
        CONFIG_FILE_NAME
    ))
}

pub fn load_config_file(path: &Path) -> Result<DriverConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<DriverConfig> {
    let config: DriverConfig = serde_json::from_str(content)
        .context("Configuration file contains invalid JSON or missing required fields")?;
    config.validate()?;
    Ok(config)
}

/// File config when one can be found, the environment otherwise.
pub fn load_config() -> Result<DriverConfig> {
    match find_config_file() {
        Ok(path) => load_config_file(&path),
        Err(_) => Ok(DriverConfig::load()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_file() {
        let config = parse_config(r#"{"amqp_addr": "amqp://localhost", "queue": "jobs"}"#).unwrap();

        assert_eq!(config.queue, "jobs");
        assert_eq!(config.exchange_type, "direct");
        assert_eq!(config.retry_timeout_secs, 60);
    }

    #[test]
    fn rejects_empty_queue() {
        let err = parse_config(r#"{"amqp_addr": "amqp://localhost", "queue": ""}"#).unwrap_err();
        assert!(err.to_string().contains("queue"));
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_config(r#"{"queue": "jobs"}"#).is_err());
    }
}
