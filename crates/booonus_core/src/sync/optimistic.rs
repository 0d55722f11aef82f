//! Optimistic points updates with deferred reconciliation.
//!
//! # Responsibility
//! - Apply a points delta locally and notify subscribers immediately.
//! - Schedule one delayed authoritative refresh per mutation.
//!
//! # Invariants
//! - The store write and the `UserPointsUpdated` publish happen in that
//!   order within one synchronous call; no network I/O happens before
//!   `apply_delta` returns.
//! - No local clamping: the backend decides whether a balance is valid.
//! - Reconciliation failures are logged and never retried automatically.
//! - A rejected session token during reconciliation ends the session (see
//!   `RemoteSync`); it is not counted as a failure.
//! - A reconciliation scheduled in one session never writes into another.

use crate::api::ApiError;
use crate::bus::{BusEvent, EventBus, PointsUpdate};
use crate::config::ApiConfig;
use crate::sync::remote::RemoteSync;
use crate::sync::store::{ProfileStore, SessionId};
use crate::sync::{SyncError, SyncResult};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Timing and alerting knobs for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub delay: Duration,
    /// Failures in a row before `ReconciliationFailing` is published.
    pub failure_alert_threshold: u32,
}

impl From<&ApiConfig> for ReconcilePolicy {
    fn from(config: &ApiConfig) -> Self {
        Self {
            delay: config.reconcile_delay,
            failure_alert_threshold: config.failure_alert_threshold,
        }
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

/// Cancellable handle to one scheduled reconciliation.
struct ReconcileHandle {
    task: JoinHandle<()>,
}

impl ReconcileHandle {
    fn cancel(&self) {
        self.task.abort();
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Applies local points deltas and schedules their reconciliation.
///
/// Dropping the mutator aborts every reconciliation still pending.
pub struct PointsMutator {
    store: Arc<ProfileStore>,
    remote: Arc<RemoteSync>,
    bus: EventBus,
    runtime: Handle,
    policy: ReconcilePolicy,
    pending: Mutex<Vec<ReconcileHandle>>,
    consecutive_failures: Arc<AtomicU32>,
}

impl PointsMutator {
    /// `runtime` is where reconciliation tasks are spawned.
    pub fn new(
        store: Arc<ProfileStore>,
        remote: Arc<RemoteSync>,
        bus: EventBus,
        runtime: Handle,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            store,
            remote,
            bus,
            runtime,
            policy,
            pending: Mutex::new(Vec::new()),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Applies `delta` to the signed-in user's balance.
    ///
    /// Positive deltas reward, negative ones penalize or pay. `reason` is
    /// forwarded to subscribers only; it is not logged.
    ///
    /// # Errors
    /// - `NoActiveProfile` when nobody is signed in.
    /// - `BalanceOverflow` when the sum does not fit in `i64`.
    pub fn apply_delta(&self, delta: i64, reason: &str) -> SyncResult<PointsUpdate> {
        let (profile, session) = match self.store.apply_delta(delta) {
            Ok(applied) => applied,
            Err(err) => {
                warn!("event=points_apply module=sync status=error delta={delta} error={err}");
                return Err(err);
            }
        };
        info!(
            "event=points_apply module=sync status=ok session={} delta={} balance={}",
            session, delta, profile.points
        );

        let update = PointsUpdate {
            profile,
            delta,
            reason: reason.to_string(),
        };
        self.bus.emit(BusEvent::PointsUpdated(update.clone()));
        self.schedule_reconciliation(session);
        Ok(update)
    }

    /// Aborts every reconciliation that has not run yet.
    ///
    /// Returns how many were still pending.
    pub fn cancel_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut cancelled = 0;
        for handle in pending.drain(..) {
            if !handle.is_finished() {
                handle.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("event=reconcile_cancel module=sync status=ok cancelled={cancelled}");
        }
        cancelled
    }

    /// Reconciliations scheduled but not finished.
    pub fn pending_reconciliations(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.len()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    fn schedule_reconciliation(&self, session: SessionId) {
        let remote = Arc::clone(&self.remote);
        let bus = self.bus.clone();
        let failures = Arc::clone(&self.consecutive_failures);
        let policy = self.policy;

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(policy.delay).await;
            match remote.refresh_for_session(session).await {
                Ok(profile) => {
                    failures.store(0, Ordering::Release);
                    info!(
                        "event=reconcile module=sync status=ok session={} points={}",
                        session, profile.points
                    );
                }
                Err(SyncError::SessionChanged) => {
                    info!("event=reconcile module=sync status=discarded session={session}");
                }
                Err(SyncError::Remote(ApiError::Unauthorized)) => {
                    failures.store(0, Ordering::Release);
                    warn!("event=reconcile module=sync status=unauthorized session={session}");
                }
                Err(err) => {
                    let count = failures.fetch_add(1, Ordering::AcqRel) + 1;
                    let transient = matches!(&err, SyncError::Remote(api) if api.is_transient());
                    warn!(
                        "event=reconcile module=sync status=error session={} consecutive_failures={} transient={} error={}",
                        session, count, transient, err
                    );
                    if count >= policy.failure_alert_threshold {
                        bus.emit(BusEvent::ReconciliationFailing {
                            consecutive_failures: count,
                        });
                    }
                }
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(ReconcileHandle { task });
    }
}

impl Drop for PointsMutator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
