use super::{AppState, AVAILABLE_ENDPOINTS};
use crate::providers::ProviderError;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub(super) fn news_routes() -> MethodRouter<Arc<AppState>> {
    get(cmd_news_get).post(cmd_news_post).fallback(cmd_not_found)
}

pub(super) fn weather_routes() -> MethodRouter<Arc<AppState>> {
    get(cmd_weather_get).post(cmd_weather_post).fallback(cmd_not_found)
}

pub(super) async fn cmd_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": "newsbrief tool server",
        "tools": state.registry.names(),
        "endpoints": {
            "news": "/news or /get_news",
            "weather": "/weather or /get_weather (requires latitude and longitude)",
        },
    }))
}

pub(super) async fn cmd_not_found(method: Method, uri: Uri) -> Response {
    warn!("No route for {} {}", method, uri.path());
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("unknown endpoint: {} {}", method, uri.path()),
            "available_endpoints": AVAILABLE_ENDPOINTS,
        })),
    )
        .into_response()
}

async fn cmd_news_get(State(state): State<Arc<AppState>>) -> Response {
    news(&state).await
}

async fn cmd_news_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if let Err(rejection) = parse_body(&body) {
        return rejection;
    }
    news(&state).await
}

async fn cmd_weather_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // Blank query values count as absent.
    let param = |name: &str| {
        params
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Value::String(v.clone()))
    };
    let latitude = param("latitude");
    let longitude = param("longitude");
    weather(&state, latitude.as_ref(), longitude.as_ref()).await
}

async fn cmd_weather_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };
    weather(&state, body.get("latitude"), body.get("longitude")).await
}

async fn news(state: &AppState) -> Response {
    info!("Serving news request");
    render("news", state.news.fetch_titles().await)
}

async fn weather(state: &AppState, latitude: Option<&Value>, longitude: Option<&Value>) -> Response {
    info!("Serving weather request");
    render("weather", state.weather.report(latitude, longitude).await)
}

fn render<T: Serialize>(tool: &str, result: Result<T, ProviderError>) -> Response {
    match result {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            warn!("{} request failed ({}): {}", tool, status.as_u16(), e);
            (status, Json(e.into_tool_result())).into_response()
        }
    }
}

/// POST bodies: empty means `{}`, anything else must be a JSON object.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(bad_request("request body must be a JSON object".into())),
        Err(e) => Err(bad_request(format!("invalid JSON: {e}"))),
    }
}

fn bad_request(message: String) -> Response {
    warn!("Rejected request body: {}", message);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
