//! Statsync Development Server
//!
//! A minimal stats store for exercising the sync engine end to end. It keeps
//! the last posted snapshot per user in memory and pushes every accepted
//! snapshot to that user's realtime connections. There is no conflict
//! handling: the last POST wins.
//!
//! # Configuration
//!
//! Environment variables:
//! - `STATSYNC_PORT`: Port to listen on (default: 8080)
//! - `STATSYNC_SERVER_CONFIG`: Path to config file (default: ~/.config/statsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /stats/{userId}`: Stored snapshot for the user (auth required)
//! - `POST /stats`: Store a snapshot, body carries `userId` (auth required)
//! - `GET /realtime?token=...`: WebSocket channel for `stats:updated` events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use statsync_core::transport::ChannelMessage;
use statsync_core::UserStatsSnapshot;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// Configuration
// ============================================================================

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("STATSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let config_path = std::env::var("STATSYNC_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("statsync-server")
                    .join("config.yaml")
            });

        Self { port, config_path }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
struct AuthUser {
    user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from config file
    fn load(config_path: &PathBuf) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(store) => {
                    tracing::info!("Loaded {} API key(s)", store.keys.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        let config: ConfigFile = serde_yaml::from_str(contents)?;
        let keys = config
            .api_keys
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Ok(Self { keys })
    }

    /// Validate an API key and return the associated user
    fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn auth_error(status: StatusCode, error: &'static str, message: &'static str) -> Response {
    (status, Json(AuthError { error, message })).into_response()
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => {
            return auth_error(
                StatusCode::UNAUTHORIZED,
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            );
        }
        None => {
            return auth_error(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            );
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => auth_error(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

// ============================================================================
// Stats Store
// ============================================================================

/// Last posted snapshot per user, plus a broadcast channel per user for
/// realtime subscribers.
struct StatsHub {
    stats: RwLock<HashMap<String, UserStatsSnapshot>>,
    channels: RwLock<HashMap<String, broadcast::Sender<UserStatsSnapshot>>>,
}

impl StatsHub {
    fn new() -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, user_id: &str) -> Option<UserStatsSnapshot> {
        self.stats.read().await.get(user_id).cloned()
    }

    /// Stores `snapshot` and pushes it to the user's subscribers.
    async fn put(&self, user_id: &str, snapshot: UserStatsSnapshot) {
        self.stats
            .write()
            .await
            .insert(user_id.to_string(), snapshot.clone());

        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(user_id) {
            // Ignore send errors (no subscribers)
            let _ = sender.send(snapshot);
        }
    }

    async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<UserStatsSnapshot> {
        let mut channels = self.channels.write().await;
        match channels.get(user_id) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(16);
                channels.insert(user_id.to_string(), sender);
                receiver
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    api_keys: Arc<ApiKeyStore>,
    hub: Arc<StatsHub>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Body of `POST /stats`
#[derive(Deserialize)]
struct PushRequest {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(flatten)]
    snapshot: UserStatsSnapshot,
}

async fn get_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Response {
    if user.user_id != user_id {
        return auth_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not belong to this user",
        );
    }

    match state.hub.get(&user_id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, "No stats stored for this user").into_response(),
    }
}

async fn post_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PushRequest>,
) -> Response {
    if user.user_id != body.user_id {
        return auth_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not belong to this user",
        );
    }
    if !body.snapshot.is_consistent() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "hearts must be within 0..=maxHearts and maxHearts within 1..=10",
        )
            .into_response();
    }

    tracing::info!("Stored stats for '{}' (xp {})", body.user_id, body.snapshot.xp);
    state.hub.put(&body.user_id, body.snapshot).await;
    StatusCode::OK.into_response()
}

async fn realtime(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match params.get("token").and_then(|t| state.api_keys.validate(t)) {
        Some(user) => user,
        None => {
            return auth_error(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key");
        }
    };

    ws.on_upgrade(move |socket| realtime_session(socket, state.hub, user))
}

async fn realtime_session(mut socket: WebSocket, hub: Arc<StatsHub>, user: AuthUser) {
    let mut updates = hub.subscribe(&user.user_id).await;
    tracing::info!("Realtime client connected for '{}'", user.user_id);

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => match ChannelMessage::decode(text.as_str()) {
                    Ok(ChannelMessage::PresenceJoin { user_id }) => {
                        tracing::debug!("Presence join from '{}'", user_id);
                    }
                    Ok(ChannelMessage::PresencePing) => {}
                    Ok(other) => tracing::debug!("Ignoring client message: {:?}", other),
                    Err(e) => tracing::warn!("Unreadable client message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Realtime socket error: {}", e);
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    let text = match ChannelMessage::StatsUpdated(snapshot).encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode update: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Realtime client lagged by {} update(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Realtime client disconnected for '{}'", user.user_id);
}

fn app(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/realtime", get(realtime));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/stats", post(post_stats))
        .route("/stats/{user_id}", get(get_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statsync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState {
        api_keys: Arc::new(ApiKeyStore::load(&config.config_path)),
        hub: Arc::new(StatsHub::new()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
