//! The live WebSocket: one connection, one session, pushed outcomes.
//!
//! A connection joins its session's broadcast group at upgrade time, using
//! the same session cookie as the HTTP surface. State already proven is
//! pushed immediately on join; later outcomes arrive through the group. The
//! inbound direction carries login-link requests, with debounce rejections
//! surfaced only to the requesting connection.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::access::AccessGate;
use crate::auth::{AuthError, AuthService};
use crate::realtime::{outcome_for, ServerEvent, SessionChannels};

use super::auth::session::session_id_from_headers;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Ask for a login link to be mailed to `email`.
    Begin { email: String },
}

/// Upgrade a connection onto the live channel for its session.
pub async fn live(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    auth: Extension<Arc<AuthService>>,
    gate: Extension<Arc<AccessGate>>,
    channels: Extension<Arc<SessionChannels>>,
) -> impl IntoResponse {
    // A connection that never saw the HTTP surface has no session cookie;
    // that is a wiring problem between the two layers, not a user error.
    let Some(session_id) = session_id_from_headers(&headers) else {
        error!("live connection without a session cookie");
        return StatusCode::BAD_REQUEST.into_response();
    };

    ws.on_upgrade(move |socket| handle_live(socket, session_id, auth.0, gate.0, channels.0))
        .into_response()
}

async fn handle_live(
    socket: WebSocket,
    session_id: String,
    auth: Arc<AuthService>,
    gate: Arc<AccessGate>,
    channels: Arc<SessionChannels>,
) {
    let (mut sink, mut stream) = socket.split();
    let (connection_id, mut events) = channels.join(&session_id);

    // A session that already proved an identity is told so right away,
    // before any broadcast could arrive.
    match auth.is_authenticated(&session_id).await {
        Ok(Some(email)) => {
            let event = outcome_for(&gate, &email);
            if send_event(&mut sink, &event).await.is_err() {
                channels.leave(&session_id, connection_id);
                return;
            }
        }
        Ok(None) => {}
        Err(err) => error!("failed to read session state on join: {err}"),
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&text, &session_id, &auth).await {
                        if send_event(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    channels.leave(&session_id, connection_id);
}

/// React to an inbound message, returning an event for this connection only.
async fn handle_client_message(
    text: &str,
    session_id: &str,
    auth: &AuthService,
) -> Option<ServerEvent> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!("ignoring unparsable client message: {err}");
            return None;
        }
    };

    match message {
        ClientMessage::Begin { email } => {
            match auth.begin_authentication(session_id, &email).await {
                Ok(credentials) => {
                    info!(email = %credentials.contact_address, "login link requested");
                    None
                }
                Err(AuthError::Debounced { remaining_ms }) => {
                    Some(ServerEvent::Debounced { remaining_ms })
                }
                Err(AuthError::Persistence(err)) => {
                    error!("issuance hit the store: {err}");
                    None
                }
                Err(err) => {
                    warn!("rejected issuance request: {err}");
                    None
                }
            }
        }
    }
}

async fn send_event(sink: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> Result<()> {
    let text = serde_json::to_string(event).context("failed to serialize server event")?;
    sink.send(Message::Text(text))
        .await
        .context("failed to push event to connection")
}
