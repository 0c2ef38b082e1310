//! Configuration types.
//!
//! Loaded once at startup and never mutated afterwards. Values come from an
//! optional TOML file (`LEADWATCH_CONFIG`) with environment variables layered
//! on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default table location.
pub const DEFAULT_RESULT_PATH: &str = "leads.csv";

/// Default pause between cycles.
pub const DEFAULT_POLL_SECS: u64 = 5;

/// Default number of most-recent messages read per source.
pub const DEFAULT_RECENT_WINDOW: usize = 5;

/// Messages shorter than this (in characters) are never leads.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 10;

/// Default address of the local desktop-automation bridge.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8765";

/// Keyword lists driving classification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// At least one must appear for a message to be a lead.
    pub required: Vec<String>,
    /// Any of these disqualifies a message...
    pub blacklist: Vec<String>,
    /// ...unless one of these also appears.
    pub overrides: Vec<String>,
}

/// Process-wide monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Chat sources are monitored when their display name contains any of these.
    pub listen_names: Vec<String>,
    pub keywords: KeywordConfig,
    /// Where the lead table lives.
    pub result_path: PathBuf,
    pub poll_interval: Duration,
    pub recent_window: usize,
    pub min_content_chars: usize,
    pub bridge: BridgeConfig,
}

/// Connection settings for the HTTP bridge connector.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BRIDGE_URL.to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            listen_names: Vec::new(),
            keywords: KeywordConfig::default(),
            result_path: PathBuf::from(DEFAULT_RESULT_PATH),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            recent_window: DEFAULT_RECENT_WINDOW,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            bridge: BridgeConfig::default(),
        }
    }
}

/// On-disk TOML layout. Every field is optional; absent fields keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    listen: Vec<String>,
    keywords: KeywordConfig,
    result_path: Option<PathBuf>,
    poll_interval_secs: Option<u64>,
    recent_window: Option<usize>,
    min_content_chars: Option<usize>,
    bridge_url: Option<String>,
    bridge_timeout_secs: Option<u64>,
}

impl MonitorConfig {
    /// Build configuration from `LEADWATCH_CONFIG` (if set) and environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("LEADWATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|reason| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        let file: FileConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        let defaults = Self::default();
        Ok(Self {
            listen_names: file.listen,
            keywords: file.keywords,
            result_path: file.result_path.unwrap_or(defaults.result_path),
            poll_interval: file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            recent_window: file.recent_window.unwrap_or(defaults.recent_window),
            min_content_chars: file.min_content_chars.unwrap_or(defaults.min_content_chars),
            bridge: BridgeConfig {
                base_url: file.bridge_url.unwrap_or(defaults.bridge.base_url),
                token: None,
                request_timeout: file
                    .bridge_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.bridge.request_timeout),
            },
        })
    }

    /// Override fields from environment-style lookups.
    ///
    /// Takes a lookup function so tests can supply variables without touching
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LEADWATCH_LISTEN") {
            self.listen_names = split_list(&v);
        }
        if let Some(v) = lookup("LEADWATCH_REQUIRED") {
            self.keywords.required = split_list(&v);
        }
        if let Some(v) = lookup("LEADWATCH_BLACKLIST") {
            self.keywords.blacklist = split_list(&v);
        }
        if let Some(v) = lookup("LEADWATCH_OVERRIDE") {
            self.keywords.overrides = split_list(&v);
        }
        if let Some(v) = lookup("LEADWATCH_RESULT_PATH") {
            self.result_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LEADWATCH_POLL_SECS") {
            self.poll_interval = Duration::from_secs(parse_number("LEADWATCH_POLL_SECS", &v)?);
        }
        if let Some(v) = lookup("LEADWATCH_WINDOW") {
            self.recent_window = parse_number("LEADWATCH_WINDOW", &v)?;
        }
        if let Some(v) = lookup("LEADWATCH_MIN_CHARS") {
            self.min_content_chars = parse_number("LEADWATCH_MIN_CHARS", &v)?;
        }
        if let Some(v) = lookup("LEADWATCH_BRIDGE_URL") {
            self.bridge.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("LEADWATCH_BRIDGE_TOKEN").filter(|v| !v.is_empty()) {
            self.bridge.token = Some(SecretString::from(v));
        }
        Ok(())
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recent_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "recent_window".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval".into(),
                message: "must be at least 1 second".into(),
            });
        }
        if self.result_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "result_path".into(),
                hint: "Set LEADWATCH_RESULT_PATH to a writable file path".into(),
            });
        }
        if self.result_path.is_dir() {
            return Err(ConfigError::InvalidValue {
                key: "result_path".into(),
                message: format!("{} is a directory", self.result_path.display()),
            });
        }
        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{raw}'"),
    })
}
