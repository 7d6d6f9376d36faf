//! WebSocket delivery bridge.
//!
//! One bridge per connected viewer: it authenticates the caller, attaches
//! to the target session, replays buffered history, then pumps the mailbox
//! out and viewer input back in until either side ends.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use term_broker_core::{CredentialVerifier, OutputEvent};
use term_broker_session::SessionRegistry;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::protocol::{self, CLOSE_NOT_FOUND, CLOSE_UNAUTHENTICATED, InboundFrame};

/// Shared state for the WebSocket endpoint.
#[derive(Clone)]
pub struct WsState {
    /// Session table.
    pub registry: Arc<SessionRegistry>,
    /// External credential verifier.
    pub verifier: Arc<dyn CredentialVerifier>,
}

/// Attachment parameters carried on the query string.
#[derive(serde::Deserialize)]
struct AttachQuery {
    token: Option<String>,
}

/// Router exposing `GET /ws/{session_id}?token=...`.
#[must_use]
pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/ws/{session_id}", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<AttachQuery>,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, query.token))
}

/// Close the connection before attaching, with a distinguishable reason.
async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(
    socket: WebSocket,
    state: WsState,
    raw_session_id: String,
    token: Option<String>,
) {
    // Connecting: authenticate, then resolve the target session.
    let Some(token) = token else {
        reject(socket, CLOSE_UNAUTHENTICATED, "token required").await;
        return;
    };
    let identity = match state.verifier.verify(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(%err, "viewer credential rejected");
            reject(socket, CLOSE_UNAUTHENTICATED, "invalid token").await;
            return;
        }
    };
    let session = match Uuid::parse_str(&raw_session_id) {
        Ok(id) => state.registry.get(id).await,
        Err(_) => None,
    };
    let Some(session) = session else {
        reject(socket, CLOSE_NOT_FOUND, "session not found").await;
        return;
    };

    tracing::debug!(
        session = %session.id(),
        viewer = %identity.username,
        "viewer attached"
    );

    // Attached: mailbox and history snapshot are taken as one atomic step,
    // so the replay and the live feed are gap-free and duplicate-free.
    let mut sub = session.subscribe();
    let (mut sink, mut stream) = socket.split();

    if !sub.history.is_empty()
        && sink
            .send(Message::Binary(sub.history.clone()))
            .await
            .is_err()
    {
        session.unsubscribe(sub.id);
        return;
    }

    let output_pump = async {
        while let Some(event) = sub.events.recv().await {
            match event {
                OutputEvent::Data(chunk) => {
                    if sink.send(Message::Binary(chunk)).await.is_err() {
                        break;
                    }
                }
                OutputEvent::Closed => break,
            }
        }
    };

    let input_pump = async {
        while let Some(Ok(message)) = stream.next().await {
            let data: Bytes = match message {
                Message::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
                Message::Binary(data) => data,
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            match protocol::parse_frame(&data) {
                InboundFrame::Resize(size) => session.resize(size),
                InboundFrame::Input(input) => {
                    session.write(Bytes::copy_from_slice(input)).await;
                }
                InboundFrame::Malformed => {
                    tracing::debug!(session = %session.id(), "dropping malformed control frame");
                }
            }
        }
    };

    // Whichever pump finishes first cancels the other: mailbox sentinel,
    // peer disconnect and send failure all end the bridge the same way.
    tokio::select! {
        () = output_pump => {}
        () = input_pump => {}
    }

    // Draining: release the mailbox and discard anything that raced in.
    session.unsubscribe(sub.id);
    while sub.events.try_recv().is_ok() {}

    let _ = sink.close().await;
    tracing::debug!(session = %session.id(), "viewer detached");
}
