//! Chat stream configuration.
//!
//! Loaded from `<config dir>/medassist/config.toml` (or an explicit path),
//! then overridden by `MEDASSIST_*` environment variables. Passed explicitly
//! to the components that need it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::notice::FailureNotices;
use crate::stream_handler::{MalformedFramePolicy, ReaderLimits};

pub const ENV_ENDPOINT_URL: &str = "MEDASSIST_ENDPOINT_URL";
pub const ENV_DIRECT_ENDPOINT_URL: &str = "MEDASSIST_DIRECT_ENDPOINT_URL";
pub const ENV_API_TOKEN: &str = "MEDASSIST_API_TOKEN";
pub const ENV_USER_ID: &str = "MEDASSIST_USER_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ChatStreamConfig {
    /// Streaming chat completion endpoint.
    pub endpoint_url: String,
    /// Non-streaming alternate endpoint. Routing is disabled when unset.
    pub direct_endpoint_url: Option<String>,
    /// Queries containing any of these (case-insensitive) go to the direct endpoint.
    pub direct_keywords: Vec<String>,
    /// Time allowed for connecting and receiving response headers.
    pub request_timeout_secs: u64,
    /// Time allowed between two chunks of a running stream.
    pub idle_timeout_secs: u64,
    pub max_rebuffer_lines: usize,
    pub max_pending_bytes: usize,
    pub malformed_frame_policy: MalformedFramePolicy,
    pub notices: FailureNotices,
    /// Extra fields merged into every completion request body.
    pub metadata: Map<String, Value>,
    pub api_token: Option<String>,
    pub user_id: Option<String>,
}

impl Default for ChatStreamConfig {
    fn default() -> Self {
        let limits = ReaderLimits::default();
        Self {
            endpoint_url: "http://127.0.0.1:54321/functions/v1/chat".to_string(),
            direct_endpoint_url: None,
            direct_keywords: Vec::new(),
            request_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_rebuffer_lines: limits.max_rebuffer_lines,
            max_pending_bytes: limits.max_pending_bytes,
            malformed_frame_policy: limits.malformed_frame_policy,
            notices: FailureNotices::default(),
            metadata: Map::new(),
            api_token: None,
            user_id: None,
        }
    }
}

impl ChatStreamConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("medassist").join("config.toml"))
    }

    /// Load from `path`, or from [`Self::default_path`] when it exists, then
    /// apply environment overrides. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config file: path={}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(ENV_ENDPOINT_URL) {
            self.endpoint_url = url;
        }
        if let Some(url) = non_empty(ENV_DIRECT_ENDPOINT_URL) {
            self.direct_endpoint_url = Some(url);
        }
        if let Some(token) = non_empty(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(user_id) = non_empty(ENV_USER_ID) {
            self.user_id = Some(user_id);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_pending_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reader_limits(&self) -> ReaderLimits {
        ReaderLimits {
            max_rebuffer_lines: self.max_rebuffer_lines,
            max_pending_bytes: self.max_pending_bytes,
            malformed_frame_policy: self.malformed_frame_policy,
        }
    }
}
