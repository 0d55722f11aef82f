//! Local profile state and its reconciliation against the backend.
//!
//! # Responsibility
//! - Hold the signed-in profile in memory with a persisted mirror.
//! - Apply optimistic points deltas and reconcile them later.
//! - Overwrite local state with the backend's authoritative profile.
//!
//! # Invariants
//! - Only the mutator (local delta) and remote sync (overwrite) write the
//!   profile; both write whole values.
//! - A result fetched for one session never lands in another session.

use crate::api::ApiError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod optimistic;
pub mod remote;
pub mod store;

pub use optimistic::{PointsMutator, ReconcilePolicy};
pub use remote::{ProfileSource, RemoteSync};
pub use store::{ProfileStore, SessionId};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// A points mutation was attempted with nobody signed in.
    NoActiveProfile,
    BalanceOverflow { balance: i64, delta: i64 },
    /// The session ended while a fetch was in flight; its result was dropped.
    SessionChanged,
    Remote(ApiError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveProfile => write!(f, "no signed-in profile"),
            Self::BalanceOverflow { balance, delta } => {
                write!(f, "points balance {balance} cannot absorb delta {delta}")
            }
            Self::SessionChanged => write!(f, "session changed before the profile arrived"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(value: ApiError) -> Self {
        Self::Remote(value)
    }
}
