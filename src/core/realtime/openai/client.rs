//! OpenAI Realtime API client.
//!
//! One (re)connectable WebSocket link to the Realtime API, owned by exactly
//! one call. A single spawned task dials the backend, re-sends the full
//! session configuration after every successful open (backend sessions do
//! not survive reconnection), pumps frames in both directions, and retries
//! unrequested connection losses with linear backoff up to a fixed ceiling.
//!
//! Inbound server events are translated to [`AiEvent`]s and delivered over
//! the channel supplied at spawn time, in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::{OPENAI_REALTIME_URL, OpenAiAudioFormat, OpenAiModel, OpenAiVoice};
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, ToolDef, TurnDetection};
use crate::core::realtime::base::{
    AiEvent, AiSession, LinkState, RealtimeConfig, RealtimeError, RealtimeResult,
};

/// Channel capacity for outbound WebSocket events.
const WS_CHANNEL_CAPACITY: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Why the frame pump stopped.
enum PumpEnd {
    /// The backend connection dropped or errored
    ConnectionLost,
    /// The owning relay dropped its handle; nothing left to serve
    RelayGone,
}

// =============================================================================
// OpenAI Realtime Session
// =============================================================================

/// OpenAI Realtime API session client.
///
/// # Thread Safety
///
/// Mutable connection state is shared with the spawned connection task via
/// `Arc`; the `open` flag uses `AtomicBool` for lock-free checks on the
/// audio path.
pub struct OpenAiSession {
    /// Outbound event channel into the connection task
    ws_tx: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    /// Whether the link is currently open (shared with the connection task)
    open: Arc<AtomicBool>,
    /// Set by `disconnect`; suppresses reconnection and discards any dial
    /// that completes afterwards
    disconnect_requested: Arc<AtomicBool>,
    /// Connection task handle
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OpenAiSession {
    /// Spawn the connection task and return the session handle.
    ///
    /// Dialing starts immediately; a failed initial dial enters the same
    /// backoff path as a mid-call connection loss, so the call degrades to
    /// audio-drop instead of failing.
    pub fn spawn(config: RealtimeConfig, events: mpsc::Sender<AiEvent>) -> Self {
        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(false));
        let disconnect_requested = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(run_connection(
            config,
            events,
            rx,
            open.clone(),
            disconnect_requested.clone(),
        ));

        Self {
            ws_tx: Arc::new(Mutex::new(Some(tx))),
            open,
            disconnect_requested,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Queue an event for the connection task.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        if let Some(sender) = self.ws_tx.lock().await.as_ref() {
            sender
                .send(event)
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;
            Ok(())
        } else {
            Err(RealtimeError::NotConnected)
        }
    }
}

#[async_trait]
impl AiSession for OpenAiSession {
    async fn send_audio(&self, payload: &str) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::InputAudioBufferAppend {
            audio: payload.to_string(),
        })
        .await
    }

    async fn submit_tool_result(&self, call_id: &str, output: &str) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
        })
        .await
    }

    async fn create_response(&self) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::ResponseCreate).await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        // Flag first so a dial completing concurrently is discarded, then
        // abort the task to cancel any pending backoff sleep.
        self.disconnect_requested.store(true, Ordering::SeqCst);
        *self.ws_tx.lock().await = None;
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.open.store(false, Ordering::SeqCst);
        tracing::debug!("realtime session disconnected");
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Build the `session.update` payload from the call's configuration.
fn build_session_config(config: &RealtimeConfig) -> SessionConfig {
    let format = config
        .audio_format
        .as_deref()
        .map(OpenAiAudioFormat::from_str_or_default)
        .unwrap_or_default();
    let voice = config
        .voice
        .as_deref()
        .map(OpenAiVoice::from_str_or_default)
        .unwrap_or_default();

    SessionConfig {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: config.instructions.clone(),
        voice: Some(voice.as_str().to_string()),
        input_audio_format: Some(format.as_str().to_string()),
        output_audio_format: Some(format.as_str().to_string()),
        turn_detection: Some(TurnDetection::ServerVad {
            threshold: None,
            silence_duration_ms: None,
        }),
        tools: if config.tools.is_empty() {
            None
        } else {
            Some(
                config
                    .tools
                    .iter()
                    .map(|t| ToolDef {
                        tool_type: "function".to_string(),
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            )
        },
        temperature: config.temperature,
    }
}

/// Dial the Realtime API endpoint.
async fn dial(config: &RealtimeConfig) -> RealtimeResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let model = OpenAiModel::from_str_or_default(&config.model);
    let url = match &config.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => format!("{}?model={}", OPENAI_REALTIME_URL, model.as_str()),
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        format!("Bearer {}", config.api_key)
            .parse()
            .map_err(|_| RealtimeError::ConnectionFailed("invalid API key header".to_string()))?,
    );
    headers.insert("OpenAI-Beta", http::HeaderValue::from_static("realtime=v1"));

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

    Ok(ws_stream)
}

/// Own the link for the lifetime of one call: dial, configure, pump,
/// reconnect with linear backoff, give up at the ceiling.
async fn run_connection(
    config: RealtimeConfig,
    events: mpsc::Sender<AiEvent>,
    mut rx: mpsc::Receiver<ClientEvent>,
    open: Arc<AtomicBool>,
    disconnect_requested: Arc<AtomicBool>,
) {
    let policy = config.reconnect.clone();
    let mut link = LinkState::Connecting;

    'outer: loop {
        match dial(&config).await {
            Ok(ws) => {
                // Stale-connection guard: cleanup may have run while the
                // dial was in flight. Close immediately, process nothing.
                if disconnect_requested.load(Ordering::SeqCst) {
                    tracing::debug!("discarding realtime connection established after disconnect");
                    break 'outer;
                }

                link = link.on_opened();
                open.store(true, Ordering::SeqCst);
                tracing::info!("connected to realtime backend");

                let (mut sink, mut stream) = ws.split();

                // Configuration does not persist across reconnects; send the
                // full payload on every open. A send failure here surfaces as
                // a dropped connection on the next pump iteration.
                let session_update = ClientEvent::SessionUpdate {
                    session: build_session_config(&config),
                };
                match serde_json::to_string(&session_update) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            tracing::warn!("failed to send session configuration: {e}");
                        }
                    }
                    Err(e) => tracing::error!("failed to serialize session configuration: {e}"),
                }

                let end = pump(&mut sink, &mut stream, &mut rx, &events).await;
                open.store(false, Ordering::SeqCst);

                if matches!(end, PumpEnd::RelayGone) {
                    break 'outer;
                }
            }
            Err(e) => {
                tracing::warn!("realtime dial failed: {e}");
            }
        }

        if disconnect_requested.load(Ordering::SeqCst) {
            break 'outer;
        }

        link = link.on_closed(&policy);
        let LinkState::Reconnecting { attempt } = link else {
            tracing::warn!(
                max_attempts = policy.max_attempts,
                "realtime reconnect ceiling reached, giving up"
            );
            let _ = events.send(AiEvent::Closed).await;
            break 'outer;
        };

        let delay = policy.delay(attempt);
        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling realtime reconnect"
        );
        tokio::time::sleep(delay).await;

        // Cleanup during the backoff sleep cancels the pending attempt.
        if disconnect_requested.load(Ordering::SeqCst) {
            break 'outer;
        }
    }

    open.store(false, Ordering::SeqCst);
    tracing::debug!("realtime connection task ended");
}

/// Pump frames in both directions until the connection drops or the relay
/// hangs up.
async fn pump(
    sink: &mut WsSink,
    stream: &mut WsStream,
    rx: &mut mpsc::Receiver<ClientEvent>,
    events: &mpsc::Sender<AiEvent>,
) -> PumpEnd {
    // call_id -> function name, populated by output_item.added. Needed when
    // the backend omits the name on function_call_arguments.done.
    let mut pending_tool_names: HashMap<String, String> = HashMap::new();

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!("failed to serialize client event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        tracing::warn!("failed to send realtime event: {e}");
                        return PumpEnd::ConnectionLost;
                    }
                }
                None => return PumpEnd::RelayGone,
            },

            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if deliver(event, events, &mut pending_tool_names).await.is_err() {
                                return PumpEnd::RelayGone;
                            }
                        }
                        // One malformed frame must not kill the call.
                        Err(e) => tracing::warn!("unparseable realtime event: {e}"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        tracing::warn!("failed to send pong: {e}");
                        return PumpEnd::ConnectionLost;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("realtime backend closed the connection");
                    return PumpEnd::ConnectionLost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("realtime socket error: {e}");
                    return PumpEnd::ConnectionLost;
                }
                None => return PumpEnd::ConnectionLost,
            },
        }
    }
}

/// Translate one server event into an [`AiEvent`] and deliver it.
///
/// Returns `Err` only when the relay side of the channel is gone.
async fn deliver(
    event: ServerEvent,
    events: &mpsc::Sender<AiEvent>,
    pending_tool_names: &mut HashMap<String, String>,
) -> Result<(), mpsc::error::SendError<AiEvent>> {
    match event {
        ServerEvent::SessionCreated { session } => {
            tracing::info!(session_id = %session.id, "realtime session created");
        }

        ServerEvent::SessionUpdated { session } => {
            tracing::debug!(session_id = %session.id, "realtime session updated");
            events.send(AiEvent::SessionUpdated).await?;
        }

        ServerEvent::AudioDelta { delta, .. } => {
            events.send(AiEvent::AudioDelta { delta }).await?;
        }

        ServerEvent::OutputItemAdded { item } => {
            if item.item_type == "function_call"
                && let (Some(call_id), Some(name)) = (item.call_id, item.name)
            {
                tracing::debug!(%call_id, %name, "tracking tool call");
                pending_tool_names.insert(call_id, name);
            }
        }

        ServerEvent::FunctionCallArgumentsDone {
            call_id,
            arguments,
            name,
            ..
        } => {
            let name = name
                .or_else(|| pending_tool_names.remove(&call_id))
                .unwrap_or_else(|| {
                    tracing::warn!(%call_id, "tool call completed without a known name");
                    String::new()
                });
            events
                .send(AiEvent::ToolCallDone {
                    call_id,
                    name,
                    arguments,
                })
                .await?;
        }

        ServerEvent::ResponseDone { response } => {
            tracing::debug!(response_id = ?response.id, "realtime response done");
        }

        ServerEvent::Error { error } => {
            tracing::error!(
                error_type = %error.error_type,
                "realtime backend error: {}",
                error.message
            );
            events
                .send(AiEvent::Error {
                    message: error.message,
                })
                .await?;
        }

        ServerEvent::Unhandled => {
            tracing::trace!("unhandled realtime event");
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
