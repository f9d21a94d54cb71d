//! Tool provider server: exposes the news and weather tools over HTTP.
//!
//! Every response is JSON. Handlers share only read-only state, so requests
//! never wait on each other.

mod routes;

use crate::providers::{NewsSource, WeatherSource};
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Paths listed in 404 responses.
pub const AVAILABLE_ENDPOINTS: &[&str] = &["/news", "/get_news", "/weather", "/get_weather", "/health"];

/// Shared, read-only server state.
pub struct AppState {
    pub news: Arc<NewsSource>,
    pub weather: Arc<WeatherSource>,
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(
        news: Arc<NewsSource>,
        weather: Arc<WeatherSource>,
        registry: Arc<ToolRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            news,
            weather,
            registry,
        })
    }
}

/// Build the Axum router with all tool routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .route("/", get(routes::cmd_health).fallback(routes::cmd_not_found))
        .route("/health", get(routes::cmd_health).fallback(routes::cmd_not_found))
        .route("/news", routes::news_routes())
        .route("/get_news", routes::news_routes())
        .route("/weather", routes::weather_routes())
        .route("/get_weather", routes::weather_routes())
        .fallback(routes::cmd_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn serve(bind: &str, state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(
        "Tool server listening on http://{} (tools: {})",
        listener.local_addr()?,
        state.registry.names().join(", ")
    );

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Tool server failed")
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("internal server error: {detail}") })),
    )
        .into_response()
}
