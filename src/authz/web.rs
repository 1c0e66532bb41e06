use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::authz::audience;
use crate::authz::errors::AuthzError;
use crate::authz::jwt::{self, Authenticator};
use crate::authz::service::DecisionService;
use crate::authz::types::{AuthorizationRequest, DecisionResponse, Identity, ReloadResponse};

/// Largest accepted decision request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the decision API. With an authenticator, every policy route requires
/// a bearer token; health routes never do.
pub fn router(
    service: Arc<DecisionService>,
    authenticator: Option<Arc<dyn Authenticator>>,
) -> Router {
    let mut api = Router::new()
        .route("/allowed", post(handle_allowed))
        .route("/__reload__", post(handle_reload));

    match authenticator {
        Some(authenticator) => {
            api = api.route_layer(middleware::from_fn_with_state(
                authenticator,
                jwt::verify_jwt,
            ));
        }
        None => {
            tracing::warn!("No JWT issuer configured. No authentication will be required.");
        }
    }

    api.route("/__heartbeat__", get(health))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn handle_allowed(
    State(service): State<Arc<DecisionService>>,
    request: Request,
) -> impl IntoResponse {
    let (parts, body) = request.into_parts();

    let identity = parts
        .extensions
        .get::<Identity>()
        .cloned()
        .unwrap_or_default();
    let remote_addr = remote_addr(&parts);
    let origin = audience::from_headers(&parts.headers);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return AuthzError::MalformedPayload(e.to_string()).into_response(),
    };

    match parse_request(&body).and_then(|req| service.decide(&origin, &remote_addr, req, &identity))
    {
        Ok(decision) => Json(DecisionResponse {
            allowed: decision.allowed,
            principals: decision.principals,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Peer address from `ConnectInfo`, empty when the listener does not provide it.
fn remote_addr(parts: &Parts) -> String {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default()
}

fn parse_request(body: &Bytes) -> Result<AuthorizationRequest, AuthzError> {
    if body.is_empty() {
        return Err(AuthzError::MissingBody);
    }
    serde_json::from_slice(body).map_err(|e| AuthzError::MalformedPayload(e.to_string()))
}

async fn handle_reload(State(service): State<Arc<DecisionService>>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || service.reload())
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ReloadResponse {
                success: true,
                message: String::new(),
            }),
        ),
        Err(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReloadResponse {
                success: false,
                message,
            }),
        ),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
