//! Network transports over [`MirrorService`].
//!
//! `POST /mirror` answers one JSON report per request. `GET /ws` upgrades to a
//! WebSocket that takes one `{"url": ...}` message, streams a
//! `{"message", "complete": false}` notification per finished resource and
//! closes with a terminal `{"message", "complete": true}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mirror::{MirrorReport, MirrorService};

pub type SharedService = Arc<dyn MirrorService>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorPayload {
    #[serde(default)]
    pub url: Option<String>,
}

impl MirrorPayload {
    /// The URL to mirror, if one was actually supplied.
    pub fn url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Frame sent over the message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub message: String,
    pub complete: bool,
}

impl ChannelMessage {
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            complete: false,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            complete: true,
        }
    }
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mirror", post(handle_mirror))
        .route("/ws", get(handle_channel))
        .with_state(service)
}

pub async fn start(addr: SocketAddr, service: SharedService) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Mirror service listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_mirror(
    State(service): State<SharedService>,
    payload: Result<Json<MirrorPayload>, JsonRejection>,
) -> Json<MirrorReport> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected mirror payload");
            return Json(MirrorReport::invalid_url());
        }
    };

    match payload.url() {
        Some(url) => Json(service.mirror(url, None).await),
        None => Json(MirrorReport::invalid_url()),
    }
}

async fn handle_channel(
    ws: WebSocketUpgrade,
    State(service): State<SharedService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| channel_session(socket, service))
}

async fn channel_session(mut socket: WebSocket, service: SharedService) {
    let payload: MirrorPayload = match socket.recv().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap_or_default(),
        Some(Ok(_)) => MirrorPayload::default(),
        Some(Err(e)) => {
            debug!(error = %e, "Channel closed before a request arrived");
            return;
        }
        None => return,
    };
    let Some(url) = payload.url() else {
        send(&mut socket, &ChannelMessage::terminal(MirrorReport::invalid_url().message)).await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = {
        let mut run = service.mirror(url, Some(tx));
        loop {
            tokio::select! {
                report = &mut run => break report,
                Some(event) = rx.recv() => {
                    send(&mut socket, &ChannelMessage::progress(event.to_string())).await;
                }
            }
        }
    };

    while let Ok(event) = rx.try_recv() {
        send(&mut socket, &ChannelMessage::progress(event.to_string())).await;
    }
    send(&mut socket, &ChannelMessage::terminal(report.message)).await;
}

async fn send(socket: &mut WebSocket, frame: &ChannelMessage) {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode channel message");
            return;
        }
    };
    if let Err(e) = socket.send(Message::Text(text)).await {
        debug!(error = %e, "Channel peer went away");
    }
}
