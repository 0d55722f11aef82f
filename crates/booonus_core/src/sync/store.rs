//! In-memory profile holder with a persisted mirror.
//!
//! # Invariants
//! - Memory is authoritative for the running process; mirror write failures
//!   are logged and the next successful write overwrites the mirror.
//! - Memory and mirror are updated under one lock, so the mirror never
//!   regresses behind a newer in-memory value.
//! - The session id only grows.

use crate::model::profile::UserProfile;
use crate::repo::kv_repo::{KvRepository, KEY_PROFILE};
use crate::sync::{SyncError, SyncResult};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Identity of one signed-in span; bumped on sign-in and on clear.
pub type SessionId = u64;

struct StoreState {
    profile: Option<UserProfile>,
    session: SessionId,
}

/// Signed-in profile held in memory and mirrored to the key-value store.
///
/// Only `begin_session`, `clear` and the sync crate internals write it.
pub struct ProfileStore {
    state: Mutex<StoreState>,
    kv: Arc<dyn KvRepository>,
}

impl ProfileStore {
    /// Creates an empty store; call `load` to pick up a persisted mirror.
    pub fn new(kv: Arc<dyn KvRepository>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                profile: None,
                session: 0,
            }),
            kv,
        }
    }

    /// Reads the persisted mirror into memory.
    ///
    /// Missing, unreadable, or invalid mirrors leave the store empty.
    pub fn load(&self) -> Option<UserProfile> {
        let loaded = match self.kv.get(KEY_PROFILE) {
            Ok(Some(raw)) => parse_mirror(&raw),
            Ok(None) => None,
            Err(err) => {
                warn!("event=mirror_read module=sync status=error error={err}");
                None
            }
        };

        let mut state = self.state.lock();
        state.profile = loaded.clone();
        info!(
            "event=mirror_read module=sync status=ok found={} session={}",
            loaded.is_some(),
            state.session
        );
        loaded
    }

    /// Wipes memory and mirror and ends the current session.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        self.end_session(&mut state);
    }

    /// Clears the store only if `expected` is still the active session.
    ///
    /// Returns `false` when a newer session already replaced it.
    pub(crate) fn clear_if_session(&self, expected: SessionId) -> bool {
        let mut state = self.state.lock();
        if state.session != expected {
            return false;
        }
        self.end_session(&mut state);
        true
    }

    /// Starts a new session holding a freshly signed-in profile.
    pub fn begin_session(&self, profile: UserProfile) -> SessionId {
        let mut state = self.state.lock();
        state.session += 1;
        self.persist(&profile);
        state.profile = Some(profile);
        info!("event=session_begin module=sync status=ok session={}", state.session);
        state.session
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.lock().profile.clone()
    }

    pub fn points(&self) -> Option<i64> {
        self.state.lock().profile.as_ref().map(|profile| profile.points)
    }

    pub fn session(&self) -> SessionId {
        self.state.lock().session
    }

    /// Adds `delta` to the balance and mirrors the result.
    pub(crate) fn apply_delta(&self, delta: i64) -> SyncResult<(UserProfile, SessionId)> {
        let mut state = self.state.lock();
        let session = state.session;
        let profile = state.profile.as_mut().ok_or(SyncError::NoActiveProfile)?;
        let balance = profile.points;
        profile.points = balance
            .checked_add(delta)
            .ok_or(SyncError::BalanceOverflow { balance, delta })?;

        let updated = profile.clone();
        self.persist(&updated);
        Ok((updated, session))
    }

    /// Overwrites the profile wholesale unless the session moved on.
    ///
    /// Returns `false` when the write was discarded.
    pub(crate) fn replace_if_session(&self, profile: UserProfile, expected: SessionId) -> bool {
        let mut state = self.state.lock();
        if state.session != expected {
            return false;
        }
        self.persist(&profile);
        state.profile = Some(profile);
        true
    }

    fn end_session(&self, state: &mut StoreState) {
        state.profile = None;
        state.session += 1;
        if let Err(err) = self.kv.remove(KEY_PROFILE) {
            warn!("event=mirror_clear module=sync status=error error={err}");
        }
        info!("event=store_clear module=sync status=ok session={}", state.session);
    }

    fn persist(&self, profile: &UserProfile) {
        let serialized = match serde_json::to_string(profile) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!("event=mirror_write module=sync status=error error_code=serialize error={err}");
                return;
            }
        };
        if let Err(err) = self.kv.set(KEY_PROFILE, &serialized) {
            warn!("event=mirror_write module=sync status=error error_code=storage error={err}");
        }
    }
}

fn parse_mirror(raw: &str) -> Option<UserProfile> {
    let profile: UserProfile = match serde_json::from_str(raw) {
        Ok(profile) => profile,
        Err(err) => {
            warn!("event=mirror_read module=sync status=error error_code=decode error={err}");
            return None;
        }
    };
    if let Err(err) = profile.validate() {
        warn!("event=mirror_read module=sync status=error error_code=invalid error={err}");
        return None;
    }
    Some(profile)
}
