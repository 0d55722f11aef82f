//! Error taxonomy for backend calls.

use crate::model::profile::ProfileValidationError;
use crate::repo::kv_repo::RepoError;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Connection, timeout, or body transfer failure.
    Network(reqwest::Error),
    /// HTTP 401 on a request carrying the session token; the token has
    /// already been dropped. A 401 from login or registration is a `Status`.
    Unauthorized,
    /// Any other non-success status, with the backend's message when given.
    Status { status: u16, message: String },
    /// Body did not match the expected record shape.
    Decode(String),
    InvalidProfile(ProfileValidationError),
    Storage(RepoError),
}

impl ApiError {
    /// Whether the failure is transient and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } if !message.is_empty() => message.clone(),
            Self::Unauthorized => "Session expired, please sign in again.".to_string(),
            Self::Network(_) => "Cannot reach the server, check the server address.".to_string(),
            other => other.to_string(),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(err) => write!(f, "network failure: {err}"),
            Self::Unauthorized => write!(f, "not authorized"),
            Self::Status { status, message } => {
                if message.is_empty() {
                    write!(f, "backend returned status {status}")
                } else {
                    write!(f, "backend returned status {status}: {message}")
                }
            }
            Self::Decode(message) => write!(f, "unexpected response body: {message}"),
            Self::InvalidProfile(err) => write!(f, "invalid profile from backend: {err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            Self::InvalidProfile(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Unauthorized | Self::Status { .. } | Self::Decode(_) => None,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<ProfileValidationError> for ApiError {
    fn from(value: ProfileValidationError) -> Self {
        Self::InvalidProfile(value)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-success status and its body to `ApiError::Status`.
pub(crate) fn status_error(status: u16, body: &str) -> ApiError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.error.or(parsed.message).unwrap_or_default();
    ApiError::Status { status, message }
}
