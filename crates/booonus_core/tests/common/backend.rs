//! In-process stand-in for the points backend, served on a loopback port.

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use booonus_core::UserProfile;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "secret";
pub const TOKEN: &str = "tok-alice";
pub const COUPLE_ID: i64 = 3;

type Reply = (StatusCode, Json<Value>);
type Shared = Arc<Mutex<BackendState>>;

/// Server-side view of one user and the couple's catalog.
pub struct BackendState {
    pub profile: UserProfile,
    /// Every authenticated route answers 401 while set.
    pub reject_tokens: bool,
    /// Answer for the next purchase instead of accepting it.
    pub buy_error: Option<(StatusCode, String)>,
    pub prices: HashMap<i64, i64>,
    pub rule_points: HashMap<i64, i64>,
    pub history_points: HashMap<i64, i64>,
    /// `METHOD /path` of every request received, in order.
    pub hits: Vec<String>,
}

pub struct StubBackend {
    state: Shared,
    base_url: String,
    task: JoinHandle<()>,
}

impl StubBackend {
    /// Binds a random loopback port and serves `profile` as the signed-in user.
    pub async fn start(profile: UserProfile) -> Self {
        let state = Arc::new(Mutex::new(BackendState {
            profile,
            reject_tokens: false,
            buy_error: None,
            prices: HashMap::from([(1, 30), (2, 500)]),
            rule_points: HashMap::from([(4, 5), (5, -8)]),
            history_points: HashMap::from([(9, -30)]),
            hits: Vec::new(),
        }));

        let app = Router::new()
            .route("/api/v1/login", post(login))
            .route("/api/v1/register", post(register))
            .route("/api/v1/profile", get(profile_get).put(profile_rename))
            .route("/api/v1/points", get(points))
            .route("/api/v1/shop", post(shop_create))
            .route("/api/v1/shop/:id/buy", post(shop_buy))
            .route("/api/v1/rules/:id/execute", post(rule_execute))
            .route("/api/v1/events", get(events_list).post(event_create))
            .route("/api/v1/revert/:id", post(revert))
            .route("/api/v1/couple", delete(couple_remove))
            .route("/api/v1/couple/invite", post(couple_invite))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback listener should bind");
        let addr = listener.local_addr().expect("listener address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
            task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, BackendState> {
        self.state.lock()
    }

    pub fn hits(&self) -> Vec<String> {
        self.state.lock().hits.clone()
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn failure(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": message })))
}

fn authorize(state: &BackendState, headers: &HeaderMap) -> Result<(), Reply> {
    let expected = format!("Bearer {TOKEN}");
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if state.reject_tokens || presented != Some(expected.as_str()) {
        return Err(failure(StatusCode::UNAUTHORIZED, "Invalid token"));
    }
    Ok(())
}

fn auth_reply(state: &BackendState) -> Value {
    json!({ "message": "ok", "token": TOKEN, "user": state.profile })
}

async fn login(State(shared): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut state = shared.lock();
    state.hits.push("POST /login".to_string());
    if body["username"] != state.profile.username.as_str() || body["password"] != PASSWORD {
        return failure(StatusCode::UNAUTHORIZED, "Invalid username or password");
    }
    ok(auth_reply(&state))
}

async fn register(State(shared): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut state = shared.lock();
    state.hits.push("POST /register".to_string());
    if let Some(username) = body["username"].as_str() {
        state.profile.username = username.to_string();
    }
    (StatusCode::CREATED, Json(auth_reply(&state)))
}

async fn profile_get(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = shared.lock();
    state.hits.push("GET /profile".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    ok(json!({ "user": state.profile }))
}

async fn profile_rename(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push("PUT /profile".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    if let Some(username) = body["username"].as_str() {
        state.profile.username = username.to_string();
    }
    ok(json!({ "message": "Profile updated" }))
}

async fn points(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = shared.lock();
    state.hits.push("GET /points".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    ok(json!({ "points": state.profile.points }))
}

async fn shop_create(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push("POST /shop".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    let item_id = state.prices.len() as i64 + 1;
    let price = body["price"].as_i64().unwrap_or_default();
    state.prices.insert(item_id, price);
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Item created", "item_id": item_id })),
    )
}

async fn shop_buy(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push(format!("POST /shop/{item_id}/buy"));
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    if let Some((status, message)) = state.buy_error.take() {
        return failure(status, &message);
    }
    let Some(price) = state.prices.get(&item_id).copied() else {
        return failure(StatusCode::NOT_FOUND, "Item not found");
    };
    state.profile.points -= price;
    ok(json!({ "message": "Purchase successful" }))
}

async fn rule_execute(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(rule_id): Path<i64>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push(format!("POST /rules/{rule_id}/execute"));
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    let Some(points) = state.rule_points.get(&rule_id).copied() else {
        return failure(StatusCode::NOT_FOUND, "Rule not found");
    };
    state.profile.points += points;
    ok(json!({ "message": "Rule executed", "affected_users": 1 }))
}

async fn events_list(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = shared.lock();
    state.hits.push("GET /events".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    ok(json!({
        "events": [{
            "id": 11,
            "couple_id": COUPLE_ID,
            "creator_id": state.profile.id,
            "target_id": state.profile.id,
            "name": "dishes",
            "description": "",
            "points": 4,
            "created_at": "2024-05-01T10:00:00Z"
        }],
        "total": 1,
        "limit": 10,
        "offset": 0
    }))
}

async fn event_create(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push("POST /events".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    if body["target_id"].as_i64() == Some(state.profile.id) {
        state.profile.points += body["points"].as_i64().unwrap_or_default();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Event created", "event_id": 12 })),
    )
}

async fn revert(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(history_id): Path<i64>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push(format!("POST /revert/{history_id}"));
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    let Some(points) = state.history_points.remove(&history_id) else {
        return failure(StatusCode::BAD_REQUEST, "Already reverted");
    };
    state.profile.points -= points;
    ok(json!({ "message": "Reverted" }))
}

async fn couple_invite(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = shared.lock();
    state.hits.push("POST /couple/invite".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    let partner = body["username"].as_str().unwrap_or_default().to_string();
    state.profile.couple_id = Some(COUPLE_ID);
    ok(json!({
        "message": "Couple created",
        "couple_id": COUPLE_ID,
        "partner": { "id": 8, "username": partner }
    }))
}

async fn couple_remove(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = shared.lock();
    state.hits.push("DELETE /couple".to_string());
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    state.profile.couple_id = None;
    ok(json!({ "message": "Couple removed" }))
}
