use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use stride_core::sync::{SyncRequest, SyncResponse};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::authorize;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{RateLimitMetricsSnapshot, SyncRateLimiter};
use crate::store::{StoreStats, SyncStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: Arc<SyncStore>,
    rate_limiter: Arc<SyncRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            store: Arc::new(SyncStore::new()),
            rate_limiter: Arc::new(SyncRateLimiter::from_config(config.as_ref())),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    store: StoreStats,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        store: state.store.stats().await,
        rate_limit: state.rate_limiter.metrics_snapshot(),
    })
}

async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    authorize(&headers, state.config.api_token.as_deref())?;
    state.rate_limiter.check(&request.device_id).await?;

    let changes = request.change_count();
    if changes > state.config.max_changes_per_request {
        return Err(AppError::PayloadTooLarge(format!(
            "{changes} changes exceed the limit of {}",
            state.config.max_changes_per_request
        )));
    }

    let response = state.store.exchange(&request).await?;
    tracing::info!(
        endpoint = "sync",
        user = user_fingerprint(&request.user_id),
        changes,
        conflicts = response.conflicts.len(),
        "Handled sync request"
    );
    Ok(Json(response))
}

fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
