//! Per-call relay state machine.
//!
//! One [`CallRelay`] exists per accepted media stream connection. It is the
//! single writer of the call's state: the drive loop in `handler.rs` feeds
//! it frames from the telephony socket and events from the AI session, one
//! at a time, so stream SID binding, forwarding decisions and teardown all
//! happen without shared locks.
//!
//! Forwarding rules:
//! - caller audio goes to the AI backend only after the stream SID is bound
//!   and only while the AI link is open; otherwise the frame is dropped
//!   (bounded audio loss during reconnection instead of unbounded buffering)
//! - assistant audio goes to the telephony side only while a stream SID is
//!   bound, wrapped in the outbound media frame shape
//! - nothing is forwarded in either direction once the closing flag is set

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::messages::{TelephonyInbound, TelephonyOutbound};
use crate::core::leads::{LeadRecord, LeadSink, SAVE_LEAD_TOOL};
use crate::core::realtime::{AiEvent, AiSession};
use crate::prompts::Language;

/// Whether the drive loop should keep feeding this relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing
    Continue,
    /// The call is over; stop the drive loop
    Closed,
}

/// The per-call relay actor.
pub struct CallRelay {
    /// Correlation id for logs
    call_id: Uuid,
    /// Language selected at session creation; immutable afterwards
    language: Language,
    /// Stream SID, bound by the first `start` frame
    stream_sid: Option<String>,
    /// Set at most once; guards against double-cleanup
    closing: bool,
    /// The AI side of the call
    ai: Box<dyn AiSession>,
    /// Lead persistence
    sink: Arc<dyn LeadSink>,
    /// Outbound frames to the telephony socket
    out_tx: mpsc::Sender<TelephonyOutbound>,
}

impl CallRelay {
    /// Create the relay for one accepted connection.
    pub fn new(
        call_id: Uuid,
        language: Language,
        ai: Box<dyn AiSession>,
        sink: Arc<dyn LeadSink>,
        out_tx: mpsc::Sender<TelephonyOutbound>,
    ) -> Self {
        Self {
            call_id,
            language,
            stream_sid: None,
            closing: false,
            ai,
            sink,
            out_tx,
        }
    }

    /// Stream SID, once bound.
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Whether teardown has started.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Handle one raw text frame from the telephony connection.
    ///
    /// Malformed frames are logged and discarded; one bad frame must not
    /// kill the call.
    pub async fn on_telephony_text(&mut self, text: &str) -> Flow {
        match serde_json::from_str::<TelephonyInbound>(text) {
            Ok(frame) => self.on_telephony_frame(frame).await,
            Err(e) => {
                warn!(call_id = %self.call_id, "discarding unparseable telephony frame: {e}");
                Flow::Continue
            }
        }
    }

    /// Handle one parsed telephony frame.
    pub async fn on_telephony_frame(&mut self, frame: TelephonyInbound) -> Flow {
        if self.closing {
            return Flow::Continue;
        }

        match frame {
            TelephonyInbound::Connected {} => {
                debug!(call_id = %self.call_id, "telephony stream handshake");
                Flow::Continue
            }

            TelephonyInbound::Start { start } => {
                info!(
                    call_id = %self.call_id,
                    stream_sid = %start.stream_sid,
                    telephony_call_sid = ?start.call_sid,
                    language = %self.language,
                    "stream started"
                );
                self.stream_sid = Some(start.stream_sid);
                Flow::Continue
            }

            TelephonyInbound::Media { media } => {
                // Not addressable before `start`, and dropped rather than
                // buffered while the AI link is down.
                if self.stream_sid.is_none() {
                    trace!(call_id = %self.call_id, "dropping media frame before stream start");
                } else if !self.ai.is_open() {
                    trace!(call_id = %self.call_id, "AI link not open, dropping media frame");
                } else if let Err(e) = self.ai.send_audio(&media.payload).await {
                    // Best-effort; the link may have dropped mid-send.
                    debug!(call_id = %self.call_id, "failed to forward caller audio: {e}");
                }
                Flow::Continue
            }

            TelephonyInbound::Mark {} => Flow::Continue,

            TelephonyInbound::Stop {} => {
                info!(call_id = %self.call_id, "stream stopped");
                self.shutdown().await;
                Flow::Closed
            }
        }
    }

    /// Handle one event from the AI session.
    pub async fn on_ai_event(&mut self, event: AiEvent) -> Flow {
        if self.closing {
            return Flow::Continue;
        }

        match event {
            AiEvent::SessionUpdated => {
                debug!(call_id = %self.call_id, "AI session configuration acknowledged");
            }

            AiEvent::AudioDelta { delta } => match &self.stream_sid {
                Some(sid) => {
                    let frame = TelephonyOutbound::media(sid, delta);
                    if self.out_tx.send(frame).await.is_err() {
                        // The socket writer is gone; the drive loop will
                        // observe the closed connection shortly.
                        debug!(call_id = %self.call_id, "telephony writer gone, dropping AI audio");
                    }
                }
                None => {
                    trace!(call_id = %self.call_id, "no stream SID bound, dropping AI audio");
                }
            },

            AiEvent::ToolCallDone {
                call_id,
                name,
                arguments,
            } => {
                self.handle_tool_call(&call_id, &name, &arguments).await;
            }

            AiEvent::Error { message } => {
                warn!(call_id = %self.call_id, "AI backend error: {message}");
            }

            AiEvent::Closed => {
                // Retry ceiling reached. The call stays up; caller audio is
                // dropped from here on, until the telephony side hangs up.
                warn!(
                    call_id = %self.call_id,
                    "AI link permanently down, continuing call without AI audio"
                );
            }
        }
        Flow::Continue
    }

    /// Execute a completed tool call.
    ///
    /// The conversation turn blocks on the sink result: only a successful
    /// append is acknowledged, followed by a request for the next response.
    /// On parse or sink failure nothing is sent, intentionally stalling
    /// that tool turn rather than fabricating a success.
    async fn handle_tool_call(&mut self, tool_call_id: &str, name: &str, arguments: &str) {
        if name != SAVE_LEAD_TOOL {
            debug!(call_id = %self.call_id, tool = %name, "ignoring unknown tool call");
            return;
        }

        let record: LeadRecord = match serde_json::from_str(arguments) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    call_id = %self.call_id,
                    tool_call_id = %tool_call_id,
                    "save_lead arguments did not parse: {e}"
                );
                return;
            }
        };

        info!(call_id = %self.call_id, lead = %record.name, "executing save_lead");
        if let Err(e) = self.sink.append(&record).await {
            error!(
                call_id = %self.call_id,
                tool_call_id = %tool_call_id,
                "failed to persist lead: {e}"
            );
            return;
        }

        if let Err(e) = self
            .ai
            .submit_tool_result(tool_call_id, r#"{"success":true}"#)
            .await
        {
            warn!(call_id = %self.call_id, "failed to acknowledge tool call: {e}");
        } else if let Err(e) = self.ai.create_response().await {
            warn!(call_id = %self.call_id, "failed to request next response: {e}");
        }
    }

    /// Tear the call down. Idempotent; safe to call redundantly from the
    /// stop frame, a telephony close or a telephony error.
    pub async fn shutdown(&mut self) {
        if self.closing {
            debug!(call_id = %self.call_id, "cleanup already ran");
            return;
        }
        self.closing = true;
        self.ai.disconnect().await;
        info!(call_id = %self.call_id, "call torn down");
    }
}
