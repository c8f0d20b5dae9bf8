//! WebSocket transport and a small REST surface.
//!
//! Each connection to `/agents/chat/:session_id` attaches to one session.
//! Frames from the client are handled strictly one at a time; everything
//! the session produces while handling a frame goes through a single
//! unbounded channel drained by a writer task, so the client sees one
//! ordered stream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::constants::{APOLOGY, GREETING};
use crate::message::Message;
use crate::output::{ChannelRenderer, Renderer, ServerEvent};
use crate::resolver::ApprovalDecision;
use crate::session::{ChatError, Inbound, SessionManager};
use crate::store::SessionMeta;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

/// Incoming frame from the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// New user text.
    Message { text: String },
    /// Answers for pending tool calls.
    Approvals { decisions: Vec<ApprovalDecision> },
    Ping,
}

/// Parses one text frame.
///
/// Anything that is not JSON is taken as user text. JSON that is not a
/// known frame is an error.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, String> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() => {
            serde_json::from_value(value).map_err(|e| format!("Invalid frame: {}", e))
        }
        _ => Ok(ClientFrame::Message {
            text: text.to_string(),
        }),
    }
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut renderer = ChannelRenderer::new(tx);
    let session = match state.sessions.get_or_create(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "rejecting connection");
            renderer.emit(ServerEvent::Error {
                message: format!("{:#}", e),
            });
            drop(renderer);
            let _ = send_task.await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, "WebSocket connected");
    renderer.emit(ServerEvent::Connected {
        session_id: session_id.clone(),
    });
    renderer.emit(ServerEvent::Message {
        message: Message::assistant_text(GREETING),
    });
    {
        let guard = session.lock().await;
        renderer.emit(ServerEvent::History {
            messages: guard.messages().to_vec(),
        });
        renderer.status(&guard.status());
    }

    while let Some(Ok(frame)) = receiver.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket closed by client");
                break;
            }
            _ => continue,
        };

        let inbound = match parse_client_frame(&text) {
            Ok(ClientFrame::Message { text }) => Inbound::UserText(text),
            Ok(ClientFrame::Approvals { decisions }) => Inbound::Decisions(decisions),
            Ok(ClientFrame::Ping) => {
                renderer.emit(ServerEvent::Pong);
                continue;
            }
            Err(message) => {
                renderer.emit(ServerEvent::Error { message });
                continue;
            }
        };

        let mut guard = session.lock().await;
        match guard.handle(inbound, &mut renderer).await {
            Ok(status) => {
                tracing::debug!(session_id = %session_id, ?status, "frame handled");
            }
            Err(ChatError::Model(e)) => {
                tracing::error!(session_id = %session_id, error = %e, "model request failed");
                renderer.emit(ServerEvent::Message {
                    message: Message::assistant_text(APOLOGY),
                });
                renderer.render_error(&format!("{:#}", e));
                renderer.status(&guard.status());
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "frame rejected");
                renderer.render_error(&e.to_string());
            }
        }
    }

    // Closing the channel lets the writer flush what is queued and stop.
    drop(renderer);
    let _ = send_task.await;
    drop(session);
    state.sessions.release(&session_id).await;
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub live: Vec<String>,
    pub stored: Vec<SessionMeta>,
}

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, StatusCode> {
    let stored = state.sessions.list_stored().map_err(|e| {
        tracing::error!(error = %e, "failed to list sessions");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(ListSessionsResponse {
        live: state.sessions.ids().await,
        stored,
    }))
}

async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    if crate::store::validate_id(&id).is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let session = state
        .sessions
        .find(&id)
        .await
        .map_err(|e| {
            tracing::error!(session_id = %id, error = %e, "failed to load session");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    let session = session.lock().await;
    Ok(Json(session.messages().to_vec()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents/chat/:session_id", get(ws_upgrade))
        .route("/v1/sessions", get(list_sessions))
        .route("/v1/sessions/:id/messages", get(session_messages))
        .with_state(state)
}

/// Serves until Ctrl+C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
