//! HTTP and WebSocket surface over [`Actions`].
//!
//! Every JSON route authenticates the caller from the `Authorization: Bearer`
//! header, calls one action, and returns its envelope. The HTTP status is
//! derived from the envelope's error code so plain HTTP clients can branch
//! on it without reading the body.

mod booking;
mod feed;
mod loyalty;
mod staff;

use std::net::SocketAddr;

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actions::{ActionResponse, Actions};
use crate::auth::{bearer_token, UserContext};
use crate::error::SalonError;
use crate::metrics::MetricsSnapshot;

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone)]
pub struct Caller(pub UserContext);

#[axum::async_trait]
impl FromRequestParts<Actions> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, actions: &Actions) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);
        actions
            .authenticate(token)
            .await
            .map(Caller)
            .map_err(|e| ActionResponse::<()>::from_error(&e).into_response())
    }
}

/// HTTP status for an envelope error code
fn status_for(code: Option<&str>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some("AUTH_REQUIRED") => StatusCode::UNAUTHORIZED,
        Some("PERMISSION_DENIED") => StatusCode::FORBIDDEN,
        Some("VALIDATION_ERROR") => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl<T: Serialize> IntoResponse for ActionResponse<T> {
    fn into_response(self) -> Response {
        let status = status_for(self.code.as_deref());
        (status, Json(self)).into_response()
    }
}

/// Envelope for a request that failed before reaching an action
pub(crate) fn rejected(err: &SalonError) -> Response {
    ActionResponse::<()>::from_error(err).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    cached_entries: usize,
    feed_subscribers: usize,
    metrics: MetricsSnapshot,
}

async fn health(State(actions): State<Actions>) -> Json<Health> {
    Json(Health {
        status: "ok",
        cached_entries: actions.cache().len(),
        feed_subscribers: actions.feed().total_subscribers(),
        metrics: actions.metrics().snapshot(),
    })
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "error": "Route not found", "code": "OPERATION_FAILED"})),
    )
        .into_response()
}

/// Create the router with every route mounted
pub fn router(actions: Actions) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(booking::routes())
        .merge(loyalty::routes())
        .merge(staff::routes())
        .merge(feed::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(actions)
}

/// Bind `addr` and serve until the process stops
pub async fn serve(actions: Actions, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(actions);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Salon API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
