//! Authoritative profile refresh.
//!
//! # Invariants
//! - A successful refresh replaces the stored profile wholesale; pending
//!   optimistic deltas are not merged.
//! - A failed refresh leaves the store untouched, except a rejected session
//!   token: that ends the session it was fetched for and publishes
//!   `SessionExpired`.
//! - Concurrent refreshes are safe; the last one to complete wins.

use crate::api::{ApiError, ApiResult};
use crate::bus::{BusEvent, EventBus};
use crate::model::profile::UserProfile;
use crate::sync::store::{ProfileStore, SessionId};
use crate::sync::{SyncError, SyncResult};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Source of the authoritative profile (`GET /profile`).
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> ApiResult<UserProfile>;
}

/// Pulls the authoritative profile into the store.
///
/// Results are bound to the session that was active when the fetch began.
pub struct RemoteSync {
    source: Arc<dyn ProfileSource>,
    store: Arc<ProfileStore>,
    bus: EventBus,
}

impl RemoteSync {
    /// Creates a sync bound to `store`; updates are announced on `bus`.
    pub fn new(source: Arc<dyn ProfileSource>, store: Arc<ProfileStore>, bus: EventBus) -> Self {
        Self { source, store, bus }
    }

    /// Fetches and applies the profile for the session active right now.
    pub async fn refresh(&self) -> SyncResult<UserProfile> {
        let session = self.store.session();
        self.refresh_for_session(session).await
    }

    /// Fetches the profile and applies it only if `session` is still active.
    pub async fn refresh_for_session(&self, session: SessionId) -> SyncResult<UserProfile> {
        let started_at = Instant::now();
        let profile = match self.source.fetch_profile().await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(
                    "event=profile_refresh module=sync status=error session={} duration_ms={} error={}",
                    session,
                    started_at.elapsed().as_millis(),
                    err
                );
                if matches!(err, ApiError::Unauthorized) && self.store.clear_if_session(session) {
                    warn!("event=session_expired module=sync status=ok session={session}");
                    self.bus.emit(BusEvent::SessionExpired);
                }
                return Err(err.into());
            }
        };
        profile.validate().map_err(|err| SyncError::Remote(err.into()))?;

        if !self.store.replace_if_session(profile.clone(), session) {
            info!(
                "event=profile_refresh module=sync status=discarded session={} reason=session_changed",
                session
            );
            return Err(SyncError::SessionChanged);
        }

        info!(
            "event=profile_refresh module=sync status=ok session={} points={} duration_ms={}",
            session,
            profile.points,
            started_at.elapsed().as_millis()
        );
        self.bus.emit(BusEvent::ProfileUpdated(profile.clone()));
        Ok(profile)
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }
}
