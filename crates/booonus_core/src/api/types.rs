//! Request and response envelopes of the backend's `/api/v1` routes.

use crate::model::profile::UserProfile;
use crate::model::records::{
    CoupleInfo, Partner, PointsEvent, PointsHistoryEntry, Rule, RuleTarget, ShopItem,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Debug, Formatter};

/// Username/password pair for login and registration.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

impl Debug for AuthResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("message", &self.message)
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UsernameRequest<'a> {
    pub username: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteResponse {
    pub couple_id: i64,
    pub partner: Partner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoupleResponse {
    #[serde(default)]
    pub couple: Option<CoupleInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointsResponse {
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub history: Vec<PointsHistoryEntry>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopItemsResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<ShopItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewShopItem {
    pub name: String,
    pub description: String,
    pub price: i64,
}

/// Partial update; `None` fields are left unchanged by the backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShopItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedShopItem {
    pub item_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    pub points: i64,
    pub target_type: RuleTarget,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<RuleTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRule {
    pub rule_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleExecution {
    #[serde(default)]
    pub affected_users: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<PointsEvent>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub target_id: i64,
    pub name: String,
    pub description: String,
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedEvent {
    pub event_id: i64,
}

/// The backend serializes empty lists as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
