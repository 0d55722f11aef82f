//! API endpoint configuration.
//!
//! # Responsibility
//! - Hold the backend base address and client timing constants.
//! - Validate and persist a user-chosen base address.
//!
//! # Invariants
//! - A stored base address is always `http`/`https` with a host and no
//!   trailing slash.
//! - The API prefix is never part of the stored value.

use crate::repo::kv_repo::{KvRepository, RepoError, KEY_API_BASE_URL};
use log::{info, warn};
use reqwest::Url;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://192.168.31.248:8080";
pub const API_PREFIX: &str = "/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(1000);
/// Consecutive reconciliation failures before subscribers are alerted.
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub enum ConfigError {
    EmptyBaseUrl,
    InvalidBaseUrl { input: String, reason: String },
    UnsupportedScheme(String),
    Storage(RepoError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBaseUrl => write!(f, "base URL cannot be empty"),
            Self::InvalidBaseUrl { input, reason } => {
                write!(f, "invalid base URL `{input}`: {reason}")
            }
            Self::UnsupportedScheme(scheme) => {
                write!(f, "unsupported base URL scheme `{scheme}`; expected http or https")
            }
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ConfigError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Validates a base address entered by the user.
///
/// Returns the normalized form: trimmed, without trailing slashes.
pub fn validate_base_url(input: &str) -> Result<String, ConfigError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }

    let parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidBaseUrl {
        input: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidBaseUrl {
            input: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(trimmed.to_string())
}

/// Client-side configuration for talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
    pub request_timeout: Duration,
    pub reconcile_delay: Duration,
    pub failure_alert_threshold: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            failure_alert_threshold: DEFAULT_FAILURE_ALERT_THRESHOLD,
        }
    }
}

impl ApiConfig {
    /// Builds a config for an explicit base address.
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Loads the persisted base address, falling back to the default.
    ///
    /// A stored value that no longer validates is ignored with a warning.
    pub fn load(kv: &dyn KvRepository) -> Result<Self, ConfigError> {
        let Some(stored) = kv.get(KEY_API_BASE_URL)? else {
            return Ok(Self::default());
        };
        match Self::with_base_url(&stored) {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!("event=config_load module=config status=fallback reason=invalid_stored_url error={err}");
                Ok(Self::default())
            }
        }
    }

    /// Validates and persists a new base address, returning the normalized value.
    pub fn save_base_url(kv: &dyn KvRepository, input: &str) -> Result<String, ConfigError> {
        let normalized = validate_base_url(input)?;
        kv.set(KEY_API_BASE_URL, &normalized)?;
        info!("event=config_save module=config status=ok base_url={normalized}");
        Ok(normalized)
    }

    /// Removes the persisted override so the default applies again.
    pub fn reset_base_url(kv: &dyn KvRepository) -> Result<(), ConfigError> {
        kv.remove(KEY_API_BASE_URL)?;
        info!("event=config_reset module=config status=ok");
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base address with the versioned API prefix appended.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.base_url, API_PREFIX)
    }

    pub fn is_default(&self) -> bool {
        self.base_url == DEFAULT_BASE_URL
    }
}
