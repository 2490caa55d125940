//! `/booking-feed/:salon_id` WebSocket.
//!
//! The upgrade request carries a bearer token, either in the `Authorization`
//! header or as a `token` query parameter, and the caller must be a member
//! of the salon. Once upgraded, the client must send
//! `{"type":"auth","salonId":...}` first. After that the socket receives a
//! stats snapshot followed by every message the hub publishes for the salon.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::rejected;
use crate::actions::Actions;
use crate::auth::{bearer_token, UserContext};
use crate::feed::{ClientMessage, FeedMessage};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) fn routes() -> Router<Actions> {
    Router::new().route("/booking-feed/:salon_id", get(feed_socket))
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Salon member admitted to a salon's feed
#[derive(Debug)]
struct FeedAccess {
    caller: UserContext,
    salon_id: String,
}

#[axum::async_trait]
impl FromRequestParts<Actions> for FeedAccess {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, actions: &Actions) -> Result<Self, Self::Rejection> {
        let Path(salon_id) = Path::<String>::from_request_parts(parts, actions)
            .await
            .map_err(IntoResponse::into_response)?;

        let header_token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);
        let token = match header_token {
            Some(token) => Some(token),
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.token),
        };

        let caller = actions
            .authenticate(token.as_deref())
            .await
            .map_err(|e| rejected(&e))?;
        caller.require_salon_member(&salon_id).map_err(|e| {
            warn!(salon_id = %salon_id, user_id = %caller.user_id, "Feed access denied");
            rejected(&e)
        })?;
        Ok(Self { caller, salon_id })
    }
}

async fn feed_socket(
    State(actions): State<Actions>,
    access: FeedAccess,
    ws: WebSocketUpgrade,
) -> Response {
    debug!(salon_id = %access.salon_id, user_id = %access.caller.user_id, "Feed upgrade accepted");
    ws.on_upgrade(move |socket| run_feed(socket, actions, access.salon_id))
}

/// Parse an auth frame; only the matching salon is accepted.
fn is_auth_for(text: &str, salon_id: &str) -> bool {
    matches!(
        serde_json::from_str::<ClientMessage>(text),
        Ok(ClientMessage::Auth { salon_id: ref requested }) if requested == salon_id
    )
}

async fn run_feed(socket: WebSocket, actions: Actions, salon_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let authed = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                Message::Text(text) => return is_auth_for(&text, &salon_id),
                Message::Close(_) => return false,
                _ => {}
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if !authed {
        warn!(salon_id = %salon_id, "Feed connection closed before authenticating");
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let mut updates = actions.feed().subscribe(&salon_id);
    info!(salon_id = %salon_id, "Feed client connected");

    let snapshot = FeedMessage::Stats(actions.feed().stats(&salon_id, actions.today()));
    if send_json(&mut sender, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(message) => {
                    if send_json(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(salon_id = %salon_id, skipped, "Feed client lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(updates);
    actions
        .metrics()
        .set_feed_subscribers(actions.feed().total_subscribers());
    debug!(salon_id = %salon_id, "Feed client disconnected");
}

async fn send_json<S>(sender: &mut S, message: &FeedMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(message) else {
        return Ok(());
    };
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
