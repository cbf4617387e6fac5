//! Media stream WebSocket handler.
//!
//! Accepts the telephony platform's media stream connection, spawns the AI
//! session for the selected language, and drives the per-call relay until
//! either side hangs up.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::messages::TelephonyOutbound;
use super::relay::{CallRelay, Flow};
use crate::core::realtime::{AiEvent, OpenAiSession};
use crate::prompts::Language;
use crate::state::AppState;

/// Channel buffer size for audio workloads.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Query parameters on the media stream URL.
#[derive(Debug, Deserialize)]
pub struct MediaStreamParams {
    /// Language tag chosen by the gather webhook; anything unknown falls
    /// back to English
    #[serde(default)]
    pub lang: Option<String>,
}

/// Media stream WebSocket handler.
///
/// Upgrades the HTTP connection to WebSocket; one call relay is created per
/// accepted connection and lives until either side closes.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<MediaStreamParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let language = params
        .lang
        .as_deref()
        .map(Language::from_str_or_default)
        .unwrap_or_default();

    info!(%language, "media stream connection upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state, language))
}

/// Drive one call: telephony socket on one side, AI session on the other.
async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>, language: Language) {
    let call_id = Uuid::new_v4();
    info!(%call_id, %language, "media stream connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<TelephonyOutbound>(CHANNEL_BUFFER_SIZE);

    // Writer task for outbound frames to the telephony side.
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to serialize outbound frame: {e}");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                warn!("failed to send media frame: {e}");
                break;
            }
        }
    });

    // The AI side starts dialing immediately, before the start frame.
    let (ai_events_tx, mut ai_events_rx) = mpsc::channel::<AiEvent>(CHANNEL_BUFFER_SIZE);
    let ai = OpenAiSession::spawn(state.realtime_config(language), ai_events_tx);

    let mut relay = CallRelay::new(
        call_id,
        language,
        Box::new(ai),
        state.lead_sink.clone(),
        out_tx,
    );

    // Single-writer drive loop: both inbound directions funnel into the
    // relay one event at a time.
    let mut ai_events_done = false;
    loop {
        select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if relay.on_telephony_text(&text).await == Flow::Closed {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!(%call_id, "telephony connection closed");
                    break;
                }
                Some(Ok(_)) => {
                    // Binary, ping and pong frames are not part of the
                    // media stream protocol.
                    debug!(%call_id, "ignoring non-text telephony frame");
                }
                Some(Err(e)) => {
                    warn!(%call_id, "telephony socket error: {e}");
                    break;
                }
                None => {
                    info!(%call_id, "telephony connection ended");
                    break;
                }
            },

            event = ai_events_rx.recv(), if !ai_events_done => match event {
                Some(event) => {
                    if relay.on_ai_event(event).await == Flow::Closed {
                        break;
                    }
                }
                None => {
                    // The AI connection task ended; any terminal state was
                    // already delivered as an event.
                    ai_events_done = true;
                }
            },
        }
    }

    // Idempotent: a stop frame may already have torn the call down.
    relay.shutdown().await;
    sender_task.abort();
    info!(%call_id, "media stream terminated");
}
