//! Backend records consumed by the client screens.
//!
//! These mirror the JSON the backend returns. Timestamps stay as the
//! backend's RFC 3339 strings; the client only displays them.

use crate::model::profile::UserId;
use serde::{Deserialize, Serialize};

/// Partner summary embedded in couple responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoupleInfo {
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    pub partner: Partner,
}

/// Origin of a points history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Transaction,
    Rule,
    Event,
    Revert,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsHistoryEntry {
    pub id: i64,
    pub user_id: UserId,
    /// Signed change applied by this entry.
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub can_revert: bool,
    #[serde(default)]
    pub is_reverted: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Which member of the couple a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    User1,
    User2,
    Both,
}

impl RuleTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User1 => "user1",
            Self::User2 => "user2",
            Self::Both => "both",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub couple_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Positive values reward, negative values penalize.
    pub points: i64,
    pub target_type: RuleTarget,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A one-off points event recorded by one partner for a target user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEvent {
    pub id: i64,
    pub couple_id: i64,
    pub creator_id: UserId,
    pub target_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_true() -> bool {
    true
}
