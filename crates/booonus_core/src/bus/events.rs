//! Application topics and payloads carried on the event bus.

use crate::bus::channel::NotificationChannel;
use crate::model::profile::UserProfile;
use crate::model::records::CoupleInfo;

/// Named topics screens can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    UserPointsUpdated,
    UserProfileUpdated,
    CoupleInfoUpdated,
    PointsHistoryUpdated,
    ReconciliationFailing,
    SessionExpired,
}

/// Payload of an optimistic points change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsUpdate {
    /// Profile after the delta was applied locally.
    pub profile: UserProfile,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    PointsUpdated(PointsUpdate),
    ProfileUpdated(UserProfile),
    /// `None` when the couple relationship no longer exists.
    CoupleInfoUpdated(Option<CoupleInfo>),
    PointsHistoryUpdated,
    ReconciliationFailing { consecutive_failures: u32 },
    /// The backend rejected the session token; local state was cleared.
    SessionExpired,
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::PointsUpdated(_) => Topic::UserPointsUpdated,
            Self::ProfileUpdated(_) => Topic::UserProfileUpdated,
            Self::CoupleInfoUpdated(_) => Topic::CoupleInfoUpdated,
            Self::PointsHistoryUpdated => Topic::PointsHistoryUpdated,
            Self::ReconciliationFailing { .. } => Topic::ReconciliationFailing,
            Self::SessionExpired => Topic::SessionExpired,
        }
    }
}

/// Event bus shared by the session and the screens.
pub type EventBus = NotificationChannel<Topic, BusEvent>;

impl NotificationChannel<Topic, BusEvent> {
    /// Publishes `event` on the topic it belongs to.
    pub fn emit(&self, event: BusEvent) -> usize {
        self.publish(event.topic(), &event)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusEvent, EventBus, Topic};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn emit_routes_by_event_topic() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        let handle = bus.subscribe(Topic::PointsHistoryUpdated, move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });

        assert_eq!(
            bus.emit(BusEvent::ReconciliationFailing {
                consecutive_failures: 3
            }),
            0
        );
        assert_eq!(bus.emit(BusEvent::PointsHistoryUpdated), 1);
        assert_eq!(*received.lock(), vec![BusEvent::PointsHistoryUpdated]);
        handle.unsubscribe();
    }
}
