//! In-process notification channel.
//!
//! # Responsibility
//! - Decouple state writers (sync) from the screens reacting to changes.
//! - Own no global state: the application root constructs one bus per
//!   session and passes it by reference.
//!
//! # Invariants
//! - Delivery is synchronous on the publishing task.
//! - State is process-lifetime only.

pub mod channel;
pub mod events;

pub use channel::{HandlerResult, NotificationChannel, SubscriptionHandle};
pub use events::{BusEvent, EventBus, PointsUpdate, Topic};
