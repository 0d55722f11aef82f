//! Signed-in user profile model.
//!
//! # Invariants
//! - `id` is positive and stable for the lifetime of an account.
//! - `username` is never blank.
//! - `points` is the backend balance; the client never clamps it.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Backend user identifier.
pub type UserId = i64;

/// Profile of the signed-in user, including the points balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub points: i64,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Set once the user is paired with a partner.
    #[serde(default)]
    pub couple_id: Option<i64>,
}

/// Validation failures for profile payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileValidationError {
    NonPositiveId(UserId),
    BlankUsername,
}

impl Display for ProfileValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => write!(f, "profile id must be positive, got {id}"),
            Self::BlankUsername => write!(f, "profile username must not be blank"),
        }
    }
}

impl Error for ProfileValidationError {}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>, points: i64) -> Self {
        Self {
            id,
            username: username.into(),
            points,
            avatar: None,
            couple_id: None,
        }
    }

    /// Checks the invariants a parsed or persisted profile must hold.
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if self.id <= 0 {
            return Err(ProfileValidationError::NonPositiveId(self.id));
        }
        if self.username.trim().is_empty() {
            return Err(ProfileValidationError::BlankUsername);
        }
        Ok(())
    }

    /// Returns whether the user currently has a partner.
    pub fn has_partner(&self) -> bool {
        self.couple_id.is_some()
    }
}
