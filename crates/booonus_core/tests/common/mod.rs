#![allow(dead_code)]

pub mod backend;

use async_trait::async_trait;
use booonus_core::db::open_db_in_memory;
use booonus_core::{
    ApiError, ApiResult, BusEvent, EventBus, PointsMutator, ProfileSource, ProfileStore,
    ReconcilePolicy, RemoteSync, SqliteKvRepository, SubscriptionHandle, Topic, UserProfile,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// One scripted answer: wait `delay`, then return the profile or fail with
/// the given HTTP status.
pub struct Reply {
    pub delay: Duration,
    pub outcome: Result<UserProfile, u16>,
}

impl Reply {
    pub fn ok(profile: UserProfile) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(profile),
        }
    }

    pub fn ok_after(delay_ms: u64, profile: UserProfile) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            outcome: Ok(profile),
        }
    }

    pub fn fail(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(status),
        }
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileSource for ScriptedSource {
    async fn fetch_profile(&self) -> ApiResult<UserProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().pop_front().unwrap_or_else(|| Reply::fail(503));
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.outcome.map_err(|status| match status {
            401 => ApiError::Unauthorized,
            status => ApiError::Status {
                status,
                message: String::new(),
            },
        })
    }
}

pub struct Harness {
    pub kv: Arc<SqliteKvRepository>,
    pub store: Arc<ProfileStore>,
    pub bus: EventBus,
    pub source: Arc<ScriptedSource>,
    pub remote: Arc<RemoteSync>,
    pub mutator: PointsMutator,
}

/// Builds the sync stack on the current Tokio runtime.
pub fn harness(replies: Vec<Reply>) -> Harness {
    harness_with_policy(replies, ReconcilePolicy::default())
}

pub fn harness_with_policy(replies: Vec<Reply>, policy: ReconcilePolicy) -> Harness {
    let kv = Arc::new(SqliteKvRepository::new(
        open_db_in_memory().expect("in-memory db should open"),
    ));
    let store = Arc::new(ProfileStore::new(kv.clone()));
    let bus = EventBus::new();
    let source = Arc::new(ScriptedSource::new(replies));
    let remote = Arc::new(RemoteSync::new(source.clone(), store.clone(), bus.clone()));
    let mutator = PointsMutator::new(
        store.clone(),
        remote.clone(),
        bus.clone(),
        Handle::current(),
        policy,
    );
    Harness {
        kv,
        store,
        bus,
        source,
        remote,
        mutator,
    }
}

pub fn profile(points: i64) -> UserProfile {
    UserProfile::new(7, "alice", points)
}

/// Subscribes a recorder to `topic`.
pub fn record(
    bus: &EventBus,
    topic: Topic,
) -> (Arc<Mutex<Vec<BusEvent>>>, SubscriptionHandle<Topic, BusEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handle = bus.subscribe(topic, move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });
    (events, handle)
}
