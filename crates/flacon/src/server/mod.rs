mod broadcast;
mod chain;
mod double_spend;
mod error;
mod keys;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::InvalidHeaderValue;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use flacon_core::primitives::Secp256k1Primitives;
use flacon_core::provider::{ChainData, TxSubmitter};
use flacon_core::ConflictPolicy;

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub chain: Arc<dyn ChainData>,
    pub submitter: Arc<dyn TxSubmitter>,
    pub conflict_policy: ConflictPolicy,
    /// Upper bound on a single provider submission.
    pub submit_timeout: Duration,
    pub primitives: Arc<Secp256k1Primitives>,
}

type SharedState = Arc<AppState>;

/// `?net=` query shared by the endpoints that take nothing else.
#[derive(Deserialize)]
struct NetworkQuery {
    net: Option<String>,
}

// ==============================================================================
// Router
// ==============================================================================

/// Request bodies are raw transactions or small JSON documents.
const API_BODY_LIMIT: usize = 1024 * 1024;

pub fn build_router(
    state: AppState,
    allow_origin: Option<&str>,
) -> Result<Router, InvalidHeaderValue> {
    let cors = match allow_origin {
        Some(origin) => {
            let allowed: HeaderValue = origin.parse()?;
            CorsLayer::new()
                .allow_origin(AllowOrigin::exact(allowed))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        }
        None => CorsLayer::permissive(),
    };

    let shared = Arc::new(state);

    let api = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/key", get(keys::generate_key))
        .route("/api/v1/utxos", get(chain::get_utxos))
        .route("/api/v1/fees", get(chain::get_fees))
        .route("/api/v1/broadcast", post(broadcast::broadcast))
        .route("/api/v1/broadcast/batch", post(broadcast::broadcast_batch))
        .route("/api/v1/double-spend", post(double_spend::double_spend))
        // Unversioned paths served to earlier clients.
        .route("/api/generate-key", get(keys::generate_key))
        .route("/api/utxos", get(chain::get_utxos))
        .route("/api/fee", get(chain::get_fees))
        .route("/api/broadcast", post(broadcast::broadcast))
        .route("/api/broadcast-batch", post(broadcast::broadcast_batch))
        .route("/api/double-spend", post(double_spend::double_spend))
        .layer(DefaultBodyLimit::max(API_BODY_LIMIT));

    Ok(Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .merge(api)
        .route("/api", any(api_not_found))
        .route("/api/{*path}", any(api_not_found))
        .layer(cors)
        .with_state(shared))
}

async fn root() -> &'static str {
    "Flacon API is running"
}

async fn ping() -> &'static str {
    "pong"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_not_found() -> error::AppError {
    error::AppError::NotFound("API route not found".to_string())
}
