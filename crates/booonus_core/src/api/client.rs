//! Thin typed wrapper over the backend REST API.
//!
//! # Responsibility
//! - Build requests against the currently configured API root.
//! - Attach the stored bearer token to every request.
//! - Decode bodies into explicit record types.
//!
//! # Invariants
//! - A 401 on a token-bearing request removes the stored token before
//!   `ApiError::Unauthorized` is returned. The profile mirror belongs to the
//!   sync store and is never touched here.
//! - Login and registration are sent without a token; their 401 is an
//!   ordinary `ApiError::Status` carrying the backend's message.
//! - Tokens and passwords never appear in log lines.

use crate::api::error::{status_error, ApiError, ApiResult};
use crate::api::types::{
    AuthResponse, CoupleResponse, CreatedEvent, CreatedRule, CreatedShopItem, Credentials,
    EventsPage, HistoryPage, InviteResponse, MessageResponse, NewEvent, NewRule, NewShopItem,
    PointsResponse, ProfileResponse, RuleExecution, RulePatch, RulesResponse, ShopItemPatch,
    ShopItemsResponse, UsernameRequest,
};
use crate::config::ApiConfig;
use crate::model::profile::{UserId, UserProfile};
use crate::repo::kv_repo::{KvRepository, KEY_AUTH_TOKEN};
use crate::sync::remote::ProfileSource;
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

/// Whether a request is sent on behalf of a signed-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Anonymous,
    Session,
}

/// Typed client for the backend's `/api/v1` routes.
///
/// The bearer token is read from the key-value store on every request, so
/// a token written by one caller is picked up by the next request.
pub struct ApiClient {
    http: reqwest::Client,
    api_root: RwLock<String>,
    kv: Arc<dyn KvRepository>,
}

impl ApiClient {
    /// Builds a client targeting `config.api_root()`.
    ///
    /// # Errors
    /// - `Network` when the HTTP backend cannot be initialized.
    pub fn new(config: &ApiConfig, kv: Arc<dyn KvRepository>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            api_root: RwLock::new(config.api_root()),
            kv,
        })
    }

    /// Retargets subsequent requests; in-flight requests are unaffected.
    pub fn set_base_url(&self, config: &ApiConfig) {
        *self.api_root.write() = config.api_root();
    }

    pub fn api_root(&self) -> String {
        self.api_root.read().clone()
    }

    pub fn has_token(&self) -> ApiResult<bool> {
        Ok(self.kv.get(KEY_AUTH_TOKEN)?.is_some())
    }

    pub fn store_token(&self, token: &str) -> ApiResult<()> {
        self.kv.set(KEY_AUTH_TOKEN, token)?;
        Ok(())
    }

    pub fn clear_token(&self) -> ApiResult<()> {
        self.kv.remove(KEY_AUTH_TOKEN)?;
        Ok(())
    }

    pub async fn register(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        let request = self.anonymous_request(Method::POST, "/register").json(credentials);
        let response: AuthResponse = self.execute(request, "register", Access::Anonymous).await?;
        response.user.validate()?;
        Ok(response)
    }

    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        let request = self.anonymous_request(Method::POST, "/login").json(credentials);
        let response: AuthResponse = self.execute(request, "login", Access::Anonymous).await?;
        response.user.validate()?;
        Ok(response)
    }

    pub async fn get_profile(&self) -> ApiResult<UserProfile> {
        let request = self.request(Method::GET, "/profile")?;
        let response: ProfileResponse = self.execute(request, "get_profile", Access::Session).await?;
        response.user.validate()?;
        Ok(response.user)
    }

    pub async fn update_profile(&self, username: &str) -> ApiResult<MessageResponse> {
        let request = self
            .request(Method::PUT, "/profile")?
            .json(&UsernameRequest { username });
        self.execute(request, "update_profile", Access::Session).await
    }

    pub async fn invite_couple(&self, username: &str) -> ApiResult<InviteResponse> {
        let request = self
            .request(Method::POST, "/couple/invite")?
            .json(&UsernameRequest { username });
        self.execute(request, "invite_couple", Access::Session).await
    }

    pub async fn get_couple(&self) -> ApiResult<CoupleResponse> {
        let request = self.request(Method::GET, "/couple")?;
        self.execute(request, "get_couple", Access::Session).await
    }

    pub async fn remove_couple(&self) -> ApiResult<MessageResponse> {
        let request = self.request(Method::DELETE, "/couple")?;
        self.execute(request, "remove_couple", Access::Session).await
    }

    pub async fn get_points(&self) -> ApiResult<i64> {
        let request = self.request(Method::GET, "/points")?;
        let response: PointsResponse = self.execute(request, "get_points", Access::Session).await?;
        Ok(response.points)
    }

    pub async fn get_history(&self, limit: u32, offset: u32) -> ApiResult<HistoryPage> {
        let request = self
            .request(Method::GET, "/points/history")?
            .query(&[("limit", limit), ("offset", offset)]);
        self.execute(request, "get_history", Access::Session).await
    }

    pub async fn revert(&self, history_id: i64) -> ApiResult<MessageResponse> {
        let request = self.request(Method::POST, &format!("/revert/{history_id}"))?;
        self.execute(request, "revert", Access::Session).await
    }

    /// Lists shop items; `owner_id` narrows to one partner's shop.
    pub async fn list_shop_items(&self, owner_id: Option<UserId>) -> ApiResult<ShopItemsResponse> {
        let mut request = self.request(Method::GET, "/shop")?;
        if let Some(owner_id) = owner_id {
            request = request.query(&[("owner_id", owner_id)]);
        }
        self.execute(request, "list_shop_items", Access::Session).await
    }

    pub async fn create_shop_item(&self, item: &NewShopItem) -> ApiResult<CreatedShopItem> {
        let request = self.request(Method::POST, "/shop")?.json(item);
        self.execute(request, "create_shop_item", Access::Session).await
    }

    pub async fn update_shop_item(
        &self,
        item_id: i64,
        patch: &ShopItemPatch,
    ) -> ApiResult<MessageResponse> {
        let request = self
            .request(Method::PUT, &format!("/shop/{item_id}"))?
            .json(patch);
        self.execute(request, "update_shop_item", Access::Session).await
    }

    pub async fn delete_shop_item(&self, item_id: i64) -> ApiResult<MessageResponse> {
        let request = self.request(Method::DELETE, &format!("/shop/{item_id}"))?;
        self.execute(request, "delete_shop_item", Access::Session).await
    }

    pub async fn buy_shop_item(&self, item_id: i64) -> ApiResult<MessageResponse> {
        let request = self.request(Method::POST, &format!("/shop/{item_id}/buy"))?;
        self.execute(request, "buy_shop_item", Access::Session).await
    }

    pub async fn list_rules(&self) -> ApiResult<RulesResponse> {
        let request = self.request(Method::GET, "/rules")?;
        self.execute(request, "list_rules", Access::Session).await
    }

    pub async fn create_rule(&self, rule: &NewRule) -> ApiResult<CreatedRule> {
        let request = self.request(Method::POST, "/rules")?.json(rule);
        self.execute(request, "create_rule", Access::Session).await
    }

    pub async fn update_rule(&self, rule_id: i64, patch: &RulePatch) -> ApiResult<MessageResponse> {
        let request = self
            .request(Method::PUT, &format!("/rules/{rule_id}"))?
            .json(patch);
        self.execute(request, "update_rule", Access::Session).await
    }

    pub async fn delete_rule(&self, rule_id: i64) -> ApiResult<MessageResponse> {
        let request = self.request(Method::DELETE, &format!("/rules/{rule_id}"))?;
        self.execute(request, "delete_rule", Access::Session).await
    }

    pub async fn execute_rule(&self, rule_id: i64) -> ApiResult<RuleExecution> {
        let request = self.request(Method::POST, &format!("/rules/{rule_id}/execute"))?;
        self.execute(request, "execute_rule", Access::Session).await
    }

    pub async fn list_events(&self, limit: u32, offset: u32) -> ApiResult<EventsPage> {
        let request = self
            .request(Method::GET, "/events")?
            .query(&[("limit", limit), ("offset", offset)]);
        self.execute(request, "list_events", Access::Session).await
    }

    pub async fn create_event(&self, event: &NewEvent) -> ApiResult<CreatedEvent> {
        let request = self.request(Method::POST, "/events")?.json(event);
        self.execute(request, "create_event", Access::Session).await
    }

    fn anonymous_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_root.read(), path);
        self.http.request(method, url)
    }

    fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let mut builder = self.anonymous_request(method, path);
        if let Some(token) = self.kv.get(KEY_AUTH_TOKEN)? {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
        access: Access,
    ) -> ApiResult<T> {
        let started_at = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "event=api_request module=api status=error endpoint={} duration_ms={} error_code=network error={}",
                    endpoint,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(ApiError::Network(err));
            }
        };

        let status = response.status();
        debug!(
            "event=api_request module=api status=ok endpoint={} http_status={} duration_ms={}",
            endpoint,
            status.as_u16(),
            started_at.elapsed().as_millis()
        );

        if status == StatusCode::UNAUTHORIZED && access == Access::Session {
            self.drop_token(endpoint);
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.map_err(ApiError::Network)?;
        decode_body(status, &body)
    }

    fn drop_token(&self, endpoint: &str) {
        if let Err(err) = self.kv.remove(KEY_AUTH_TOKEN) {
            warn!("event=token_drop module=api status=error endpoint={endpoint} error={err}");
            return;
        }
        warn!("event=token_drop module=api status=ok endpoint={endpoint} reason=unauthorized");
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> ApiResult<T> {
    if !status.is_success() {
        return Err(status_error(status.as_u16(), body));
    }
    serde_json::from_str(body).map_err(|err| ApiError::Decode(err.to_string()))
}

#[async_trait]
impl ProfileSource for ApiClient {
    async fn fetch_profile(&self) -> ApiResult<UserProfile> {
        self.get_profile().await
    }
}
