//! Application root for one client process.
//!
//! # Responsibility
//! - Own the event bus, profile store, remote sync and points mutator.
//! - Expose sign-in/sign-out and the points-changing use cases.
//!
//! # Invariants
//! - Sign-out cancels pending reconciliations before clearing state.
//! - A 401 on any token-bearing user action signs the user out locally;
//!   a 401 from login or registration only reports bad credentials.
//! - Points-changing calls apply their optimistic delta only after the
//!   backend accepted the action.

use crate::api::types::{
    AuthResponse, CreatedEvent, CreatedRule, CreatedShopItem, Credentials, EventsPage,
    HistoryPage, InviteResponse, NewEvent, NewRule, NewShopItem, RulePatch, ShopItemPatch,
};
use crate::api::{ApiClient, ApiError};
use crate::bus::{BusEvent, EventBus, PointsUpdate};
use crate::config::{ApiConfig, ConfigError};
use crate::model::profile::{UserId, UserProfile};
use crate::model::records::{CoupleInfo, Rule, RuleTarget, ShopItem};
use crate::repo::kv_repo::{KvRepository, RepoError};
use crate::sync::{PointsMutator, ProfileStore, ReconcilePolicy, RemoteSync, SyncError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::runtime::Handle;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    NotSignedIn,
    /// Input rejected before any request was sent.
    InvalidInput(&'static str),
    Api(ApiError),
    Sync(SyncError),
    Config(ConfigError),
    Storage(RepoError),
}

impl SessionError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) | Self::Sync(SyncError::Remote(err)) => err.user_message(),
            other => other.to_string(),
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "not signed in"),
            Self::InvalidInput(reason) => write!(f, "invalid input: {reason}"),
            Self::Api(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotSignedIn | Self::InvalidInput(_) => None,
            Self::Api(err) => Some(err),
            Self::Sync(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<SyncError> for SessionError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<ConfigError> for SessionError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Owns every piece of client state for one process.
///
/// Screens hold a reference and call the use-case methods; state changes
/// reach them through `bus()`.
pub struct SessionService {
    kv: Arc<dyn KvRepository>,
    api: Arc<ApiClient>,
    bus: EventBus,
    store: Arc<ProfileStore>,
    remote: Arc<RemoteSync>,
    mutator: PointsMutator,
}

impl SessionService {
    /// Builds the service from persisted configuration.
    ///
    /// `runtime` hosts deferred reconciliation tasks.
    pub fn new(kv: Arc<dyn KvRepository>, runtime: Handle) -> SessionResult<Self> {
        let config = ApiConfig::load(kv.as_ref())?;
        Self::with_config(kv, &config, runtime)
    }

    /// Builds the service against an explicit configuration.
    pub fn with_config(
        kv: Arc<dyn KvRepository>,
        config: &ApiConfig,
        runtime: Handle,
    ) -> SessionResult<Self> {
        let api = Arc::new(ApiClient::new(config, Arc::clone(&kv))?);
        let bus = EventBus::new();
        let store = Arc::new(ProfileStore::new(Arc::clone(&kv)));
        let remote = Arc::new(RemoteSync::new(
            api.clone(),
            Arc::clone(&store),
            bus.clone(),
        ));
        let mutator = PointsMutator::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            bus.clone(),
            runtime,
            ReconcilePolicy::from(config),
        );

        info!(
            "event=session_service_init module=service status=ok api_root={}",
            api.api_root()
        );
        Ok(Self {
            kv,
            api,
            bus,
            store,
            remote,
            mutator,
        })
    }

    /// Restores the cached profile, then refreshes it if a token exists.
    ///
    /// Refresh failures are logged; the cached profile stays visible.
    pub async fn start(&self) -> Option<UserProfile> {
        let cached = self.store.load();
        let has_token = match self.api.has_token() {
            Ok(has_token) => has_token,
            Err(err) => {
                warn!("event=session_start module=service status=error error_code=token_read error={err}");
                false
            }
        };
        if !has_token {
            return cached;
        }

        match self.remote.refresh().await {
            Ok(profile) => Some(profile),
            Err(SyncError::Remote(ApiError::Unauthorized)) => {
                self.sign_out_locally();
                None
            }
            Err(err) => {
                warn!("event=session_start module=service status=degraded error={err}");
                self.store.profile()
            }
        }
    }

    /// Signs in and starts a new session.
    ///
    /// Rejected credentials surface as `ApiError::Status` with the
    /// backend's message; cached state is left alone.
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<UserProfile> {
        let response = self.api.login(&Credentials::new(username, password)).await?;
        self.enter_session(response, "login")
    }

    pub async fn register(&self, username: &str, password: &str) -> SessionResult<UserProfile> {
        let response = self
            .api
            .register(&Credentials::new(username, password))
            .await?;
        self.enter_session(response, "register")
    }

    /// Signs out: cancels deferred work, drops the token, clears the store.
    pub fn logout(&self) {
        self.sign_out_locally();
        info!("event=logout module=service status=ok");
    }

    /// User-initiated refresh; errors reach the caller.
    pub async fn refresh_profile(&self) -> SessionResult<UserProfile> {
        match self.remote.refresh().await {
            Err(SyncError::Remote(ApiError::Unauthorized)) => {
                self.sign_out_locally();
                Err(SessionError::Api(ApiError::Unauthorized))
            }
            other => Ok(other?),
        }
    }

    /// Buys `item` and debits its price optimistically.
    pub async fn purchase_item(&self, item: &ShopItem) -> SessionResult<PointsUpdate> {
        self.require_profile()?;
        self.guard(self.api.buy_shop_item(item.id).await)?;
        Ok(self
            .mutator
            .apply_delta(-item.price, &format!("purchase: {}", item.name))?)
    }

    /// Executes `rule` and applies its points optimistically.
    ///
    /// Every rule target includes the signed-in user, so the delta always
    /// applies locally.
    pub async fn execute_rule(&self, rule: &Rule) -> SessionResult<PointsUpdate> {
        self.require_profile()?;
        self.guard(self.api.execute_rule(rule.id).await)?;
        Ok(self
            .mutator
            .apply_delta(rule.points, &format!("rule: {}", rule.name))?)
    }

    /// Records an event; the local balance moves only when the signed-in
    /// user is the target.
    pub async fn create_event(
        &self,
        target_id: UserId,
        name: &str,
        description: &str,
        points: i64,
    ) -> SessionResult<(CreatedEvent, Option<PointsUpdate>)> {
        let profile = self.require_profile()?;
        let name = non_blank(name, "event name cannot be empty")?;
        let request = NewEvent {
            target_id,
            name: name.to_string(),
            description: description.trim().to_string(),
            points,
        };
        let created = self.guard(self.api.create_event(&request).await)?;

        let update = if target_id == profile.id {
            Some(
                self.mutator
                    .apply_delta(points, &format!("event: {}", request.name))?,
            )
        } else {
            None
        };
        Ok((created, update))
    }

    /// Reverts one history entry and reloads the authoritative balance.
    pub async fn revert_history(&self, history_id: i64) -> SessionResult<UserProfile> {
        self.require_profile()?;
        self.guard(self.api.revert(history_id).await)?;
        let profile = self.refresh_profile().await?;
        self.bus.emit(BusEvent::PointsHistoryUpdated);
        Ok(profile)
    }

    /// Page of the signed-in user's points history.
    pub async fn recent_history(&self, limit: u32, offset: u32) -> SessionResult<HistoryPage> {
        self.guard(self.api.get_history(limit, offset).await)
    }

    /// Renames the signed-in user and reloads the profile.
    pub async fn update_username(&self, username: &str) -> SessionResult<UserProfile> {
        self.require_profile()?;
        let username = non_blank(username, "username cannot be empty")?;
        self.guard(self.api.update_profile(username).await)?;
        self.refresh_profile().await
    }

    /// Balance as the backend currently records it; the store is unchanged.
    pub async fn server_points(&self) -> SessionResult<i64> {
        self.guard(self.api.get_points().await)
    }

    /// Pairs the signed-in user with `username`.
    pub async fn invite_partner(&self, username: &str) -> SessionResult<InviteResponse> {
        self.require_profile()?;
        let username = non_blank(username, "partner username cannot be empty")?;
        let invite = self.guard(self.api.invite_couple(username).await)?;
        info!(
            "event=couple_invite module=service status=ok couple_id={}",
            invite.couple_id
        );
        self.refresh_profile().await?;
        self.bus.emit(BusEvent::CoupleInfoUpdated(Some(CoupleInfo {
            id: invite.couple_id,
            created_at: None,
            partner: invite.partner.clone(),
        })));
        Ok(invite)
    }

    /// Dissolves the couple relationship.
    pub async fn unbind_partner(&self) -> SessionResult<UserProfile> {
        self.require_profile()?;
        self.guard(self.api.remove_couple().await)?;
        info!("event=couple_remove module=service status=ok");
        let profile = self.refresh_profile().await?;
        self.bus.emit(BusEvent::CoupleInfoUpdated(None));
        Ok(profile)
    }

    pub async fn list_shop_items(&self, owner_id: Option<UserId>) -> SessionResult<Vec<ShopItem>> {
        Ok(self.guard(self.api.list_shop_items(owner_id).await)?.items)
    }

    /// Adds an item to the signed-in user's shop.
    pub async fn add_shop_item(
        &self,
        name: &str,
        description: &str,
        price: i64,
    ) -> SessionResult<CreatedShopItem> {
        let name = non_blank(name, "item name cannot be empty")?;
        if price == 0 {
            return Err(SessionError::InvalidInput("item price cannot be zero"));
        }
        let item = NewShopItem {
            name: name.to_string(),
            description: description.trim().to_string(),
            price,
        };
        self.guard(self.api.create_shop_item(&item).await)
    }

    pub async fn edit_shop_item(&self, item_id: i64, patch: &ShopItemPatch) -> SessionResult<()> {
        self.guard(self.api.update_shop_item(item_id, patch).await)?;
        Ok(())
    }

    pub async fn remove_shop_item(&self, item_id: i64) -> SessionResult<()> {
        self.guard(self.api.delete_shop_item(item_id).await)?;
        Ok(())
    }

    pub async fn list_rules(&self) -> SessionResult<Vec<Rule>> {
        Ok(self.guard(self.api.list_rules().await)?.rules)
    }

    /// Creates a couple rule; zero-point rules are rejected locally.
    pub async fn add_rule(
        &self,
        name: &str,
        description: &str,
        points: i64,
        target_type: RuleTarget,
    ) -> SessionResult<CreatedRule> {
        let name = non_blank(name, "rule name cannot be empty")?;
        if points == 0 {
            return Err(SessionError::InvalidInput("rule points cannot be zero"));
        }
        let rule = NewRule {
            name: name.to_string(),
            description: description.trim().to_string(),
            points,
            target_type,
        };
        self.guard(self.api.create_rule(&rule).await)
    }

    pub async fn edit_rule(&self, rule_id: i64, patch: &RulePatch) -> SessionResult<()> {
        self.guard(self.api.update_rule(rule_id, patch).await)?;
        Ok(())
    }

    pub async fn remove_rule(&self, rule_id: i64) -> SessionResult<()> {
        self.guard(self.api.delete_rule(rule_id).await)?;
        Ok(())
    }

    /// Page of couple events, newest first.
    pub async fn list_events(&self, limit: u32, offset: u32) -> SessionResult<EventsPage> {
        self.guard(self.api.list_events(limit, offset).await)
    }

    /// Fetches the couple relationship and notifies subscribers.
    pub async fn couple(&self) -> SessionResult<Option<CoupleInfo>> {
        let response = self.guard(self.api.get_couple().await)?;
        self.bus
            .emit(BusEvent::CoupleInfoUpdated(response.couple.clone()));
        Ok(response.couple)
    }

    /// Persists a new base address and retargets the client.
    pub fn set_base_url(&self, input: &str) -> SessionResult<String> {
        let normalized = ApiConfig::save_base_url(self.kv.as_ref(), input)?;
        self.api.set_base_url(&ApiConfig::with_base_url(&normalized)?);
        Ok(normalized)
    }

    /// Returns to the default base address.
    pub fn reset_base_url(&self) -> SessionResult<String> {
        ApiConfig::reset_base_url(self.kv.as_ref())?;
        let config = ApiConfig::default();
        self.api.set_base_url(&config);
        Ok(config.base_url().to_string())
    }

    /// Tears the session down: pending work and every subscription.
    pub fn shutdown(&self) {
        self.mutator.cancel_pending();
        self.bus.clear();
        info!("event=session_shutdown module=service status=ok");
    }

    pub fn kv(&self) -> &Arc<dyn KvRepository> {
        &self.kv
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn mutator(&self) -> &PointsMutator {
        &self.mutator
    }

    fn enter_session(&self, response: AuthResponse, action: &str) -> SessionResult<UserProfile> {
        self.mutator.cancel_pending();
        self.api.store_token(&response.token)?;
        let session = self.store.begin_session(response.user.clone());
        info!(
            "event={} module=service status=ok session={} user_id={}",
            action, session, response.user.id
        );
        self.bus.emit(BusEvent::ProfileUpdated(response.user.clone()));
        Ok(response.user)
    }

    fn require_profile(&self) -> SessionResult<UserProfile> {
        self.store.profile().ok_or(SessionError::NotSignedIn)
    }

    fn guard<T>(&self, result: Result<T, ApiError>) -> SessionResult<T> {
        match result {
            Err(ApiError::Unauthorized) => {
                self.sign_out_locally();
                Err(SessionError::Api(ApiError::Unauthorized))
            }
            other => Ok(other?),
        }
    }

    fn sign_out_locally(&self) {
        self.mutator.cancel_pending();
        if let Err(err) = self.api.clear_token() {
            warn!("event=logout module=service status=error error_code=token_clear error={err}");
        }
        self.store.clear();
    }
}

fn non_blank<'a>(value: &'a str, reason: &'static str) -> SessionResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidInput(reason));
    }
    Ok(trimmed)
}
