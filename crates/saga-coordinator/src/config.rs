use std::path::Path;
use std::time::Duration;

use saga_storage::RetryPolicy;
use serde::Deserialize;

use crate::error::ConfigLoadError;

pub const DEFAULT_LOG_PREFIX: &str = "saga_";
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 10;

/// Settings as they appear in a TOML document. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawCoordinatorConfig {
    log_prefix: Option<String>,
    member_id: Option<u8>,
    cleanup_on_success: Option<bool>,
    append_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

/// Coordinator settings.
///
/// ```toml
/// log-prefix = "transfer_"
/// member-id = 3
/// cleanup-on-success = true
/// append-retries = 2
/// retry-backoff-ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    log_prefix: String,
    member_id: u8,
    cleanup_on_success: bool,
    append_retries: u32,
    retry_backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            log_prefix: String::from(DEFAULT_LOG_PREFIX),
            member_id: 0,
            cleanup_on_success: false,
            append_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl From<RawCoordinatorConfig> for CoordinatorConfig {
    fn from(raw: RawCoordinatorConfig) -> Self {
        let defaults = Self::default();
        Self {
            log_prefix: raw.log_prefix.unwrap_or(defaults.log_prefix),
            member_id: raw.member_id.unwrap_or(defaults.member_id),
            cleanup_on_success: raw.cleanup_on_success.unwrap_or(defaults.cleanup_on_success),
            append_retries: raw.append_retries.unwrap_or(defaults.append_retries),
            retry_backoff_ms: raw.retry_backoff_ms.unwrap_or(defaults.retry_backoff_ms),
        }
    }
}

impl CoordinatorConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, contains an
    /// unknown key, or a value has the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawCoordinatorConfig = toml::from_str(content)?;
        Ok(raw.into())
    }

    /// Reads the config file at `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Read`] if the file exists but cannot be read,
    /// or [`ConfigLoadError::Parse`] if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigLoadError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&content).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    #[must_use]
    pub fn member_id(&self) -> u8 {
        self.member_id
    }

    /// Whether a completed saga's log stream is removed by `end_saga`.
    /// Aborted sagas always keep their log.
    #[must_use]
    pub fn cleanup_on_success(&self) -> bool {
        self.cleanup_on_success
    }

    #[must_use]
    pub fn append_retries(&self) -> u32 {
        self.append_retries
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.append_retries, self.retry_backoff())
    }

    #[must_use]
    pub fn with_log_prefix(mut self, log_prefix: impl Into<String>) -> Self {
        self.log_prefix = log_prefix.into();
        self
    }

    #[must_use]
    pub fn with_member_id(mut self, member_id: u8) -> Self {
        self.member_id = member_id;
        self
    }

    #[must_use]
    pub fn with_cleanup_on_success(mut self, cleanup_on_success: bool) -> Self {
        self.cleanup_on_success = cleanup_on_success;
        self
    }

    #[must_use]
    pub fn with_append_retries(mut self, append_retries: u32, backoff: Duration) -> Self {
        self.append_retries = append_retries;
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
