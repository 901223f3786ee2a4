//! Configuration loading.
//!
//! Settings come from an optional YAML file plus command-line overrides.
//! A missing or unparsable file falls back silently to the built-in
//! defaults so the tool works with no config at all.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Console log level: trace, debug, info, warn or error.
    pub log_level: String,
    /// Debug-level log file.
    pub log_file: String,
    /// Per-operation browser timeout in seconds.
    pub timeout: u64,
    /// Attempt limit for the retry loops.
    pub max_retries: u32,
    /// User agent the launched browser identifies as.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: "logs/enecoq.log".to_string(),
            timeout: 30,
            max_retries: 3,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                         AppleWebKit/605.1.15 (KHTML, like Gecko) \
                         Version/26.0 Safari/605.1.15"
                .to_string(),
        }
    }
}

impl Config {
    /// Parse a YAML config file. Errors are reported to the caller;
    /// use [`Config::load`] for the silent-fallback behavior.
    pub fn from_file(path: &Path) -> Result<Self, serde_yaml::Error> {
        let text = std::fs::read_to_string(path).unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text)
    }

    /// Load configuration with optional command-line overrides.
    ///
    /// A missing or invalid file is not an error: the defaults apply.
    pub fn load(
        path: Option<&Path>,
        log_level: Option<&str>,
        log_file: Option<&str>,
    ) -> Self {
        let mut config = match path {
            Some(path) if path.exists() => match Self::from_file(path) {
                Ok(config) => config,
                Err(err) => {
                    debug!("ignoring invalid config file {}: {err}", path.display());
                    Self::default()
                }
            },
            _ => Self::default(),
        };

        if let Some(level) = log_level {
            config.log_level = level.to_ascii_lowercase();
        }
        if let Some(file) = log_file {
            config.log_file = file.to_string();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, "logs/enecoq.log");
        assert_eq!(config.timeout, 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "log_level: debug\ntimeout: 60\nmax_retries: 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None, None);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.timeout, 60);
        assert_eq!(config.max_retries, 5);
        // Unspecified keys keep their defaults.
        assert_eq!(config.log_file, "logs/enecoq.log");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.yaml")), None, None);
        assert_eq!(config.max_retries, Config::default().max_retries);
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "timeout: [not a number\n").unwrap();

        let config = Config::load(Some(&path), None, None);
        assert_eq!(config.timeout, Config::default().timeout);
    }

    #[test]
    fn test_empty_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(Some(&path), None, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "log_level: warn\nlog_file: a.log\n").unwrap();

        let config = Config::load(Some(&path), Some("DEBUG"), Some("b.log"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_file, "b.log");
    }
}
