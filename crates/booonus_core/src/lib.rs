//! Client core for the Booonus couples' points app.
//! Screens call into this crate for auth, profile state, optimistic points
//! updates and backend access; it is the single owner of client state.

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use api::{ApiClient, ApiError, ApiResult};
pub use bus::{
    BusEvent, EventBus, HandlerResult, NotificationChannel, PointsUpdate, SubscriptionHandle, Topic,
};
pub use config::{validate_base_url, ApiConfig, ConfigError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::profile::{ProfileValidationError, UserId, UserProfile};
pub use model::records::{
    CoupleInfo, HistoryKind, Partner, PointsEvent, PointsHistoryEntry, Rule, RuleTarget, ShopItem,
};
pub use repo::kv_repo::{KvRepository, RepoError, RepoResult, SqliteKvRepository};
pub use service::session_service::{SessionError, SessionResult, SessionService};
pub use sync::{
    PointsMutator, ProfileSource, ProfileStore, ReconcilePolicy, RemoteSync, SessionId, SyncError,
    SyncResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
