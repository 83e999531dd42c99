//! HTTP API for faucet service

use super::config::ServerConfig;
use super::error::{FaucetError, FaucetResult};
use super::service::{ClaimRequest, CooldownStatus, FaucetService};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const CLAIM_PATH: &str = "/api/claimFaucet";
pub const COOLDOWN_PATH: &str = "/api/cooldown";

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Lenient body parsing: anything that is not a JSON object with a string
/// address yields no request, which later fails address validation.
fn parse_claim_body(body: &[u8]) -> Option<ClaimRequest> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// Claim handler
///
/// The body is taken raw so that authentication runs before it is inspected.
pub async fn claim_handler(
    State(service): State<Arc<FaucetService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = parse_claim_body(&body);

    match service.claim(bearer_token(&headers), request).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => {
            if e.is_internal() {
                error!("Claim error: {:?}", e);
            }
            e.into_response()
        }
    }
}

/// Any method other than POST on the claim route
pub async fn method_not_allowed_handler(
    State(service): State<Arc<FaucetService>>,
    method: Method,
) -> Response {
    let error = FaucetError::MethodNotAllowed(method.to_string());
    service.metrics().record_outcome(error.outcome());
    error.into_response()
}

/// Cooldown status handler
pub async fn cooldown_handler(
    State(service): State<Arc<FaucetService>>,
    headers: HeaderMap,
) -> FaucetResult<Json<CooldownStatus>> {
    let status = service.cooldown_status(bearer_token(&headers)).await?;
    Ok(Json(status))
}

/// Health check handler
pub async fn health_handler(State(service): State<Arc<FaucetService>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "ledger": service.ledger().backend(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Trickle Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Hourly FaucetPay reward claims for authenticated users",
        "endpoints": {
            "POST /api/claimFaucet": "Claim the faucet reward",
            "GET /api/cooldown": "Time left before the next claim",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}

/// Prometheus metrics handler
pub async fn metrics_handler(State(service): State<Arc<FaucetService>>) -> Response {
    match service.metrics().gather() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Routes without middleware
pub fn router(service: Arc<FaucetService>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(COOLDOWN_PATH, get(cooldown_handler))
        .route(
            CLAIM_PATH,
            post(claim_handler).fallback(method_not_allowed_handler),
        )
        .with_state(service)
}

/// Full application with tracing and optional CORS
pub fn build_app(service: Arc<FaucetService>, server: &ServerConfig) -> Router {
    let mut app = router(service).layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
        info!("CORS enabled");
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_claim_body() {
        let parsed = parse_claim_body(br#"{"faucetPayAddress":"abc"}"#).unwrap();
        assert_eq!(parsed.destination_address.as_deref(), Some("abc"));

        let parsed = parse_claim_body(br#"{"destination_address":"xyz"}"#).unwrap();
        assert_eq!(parsed.destination_address.as_deref(), Some("xyz"));

        let parsed = parse_claim_body(b"{}").unwrap();
        assert!(parsed.destination_address.is_none());

        assert!(parse_claim_body(b"").is_none());
        assert!(parse_claim_body(b"not json").is_none());
        assert!(parse_claim_body(br#"{"faucetPayAddress":42}"#).is_none());
    }
}
