//! Call relay state machine tests.
//!
//! These drive the per-call relay exactly the way the socket drive loop
//! does - raw telephony frames in, AI events in - with in-process mocks on
//! both collaborator seams, so forwarding rules, tool-call handling and
//! teardown are exercised without any network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use leadline_gateway::core::leads::{LeadRecord, LeadSink, LeadSinkError};
use leadline_gateway::core::realtime::{AiEvent, AiSession, RealtimeError, RealtimeResult};
use leadline_gateway::handlers::media::{CallRelay, Flow, TelephonyOutbound};
use leadline_gateway::prompts::Language;

// =============================================================================
// Mocks
// =============================================================================

/// Everything the relay asked of the AI session, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AiCall {
    Audio(String),
    ToolResult { call_id: String, output: String },
    CreateResponse,
    Disconnect,
}

#[derive(Clone)]
struct MockAi {
    open: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<AiCall>>>,
}

impl MockAi {
    fn new(open: bool) -> Self {
        Self {
            open: Arc::new(AtomicBool::new(open)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<AiCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiSession for MockAi {
    async fn send_audio(&self, payload: &str) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.calls
            .lock()
            .unwrap()
            .push(AiCall::Audio(payload.to_string()));
        Ok(())
    }

    async fn submit_tool_result(&self, call_id: &str, output: &str) -> RealtimeResult<()> {
        self.calls.lock().unwrap().push(AiCall::ToolResult {
            call_id: call_id.to_string(),
            output: output.to_string(),
        });
        Ok(())
    }

    async fn create_response(&self) -> RealtimeResult<()> {
        self.calls.lock().unwrap().push(AiCall::CreateResponse);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.calls.lock().unwrap().push(AiCall::Disconnect);
        self.open.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct MockSink {
    records: Arc<Mutex<Vec<LeadRecord>>>,
    fail: Arc<AtomicBool>,
}

impl MockSink {
    fn records(&self) -> Vec<LeadRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl LeadSink for MockSink {
    async fn append(&self, record: &LeadRecord) -> Result<(), LeadSinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadSinkError::Io(std::io::Error::other("disk full")));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn relay_with(ai: &MockAi, sink: &MockSink) -> (CallRelay, mpsc::Receiver<TelephonyOutbound>) {
    let (out_tx, out_rx) = mpsc::channel(64);
    let relay = CallRelay::new(
        Uuid::new_v4(),
        Language::En,
        Box::new(ai.clone()),
        Arc::new(sink.clone()),
        out_tx,
    );
    (relay, out_rx)
}

const START_S1: &str = r#"{"event":"start","start":{"streamSid":"S1","callSid":"CA1"}}"#;

fn media_frame(payload: &str) -> String {
    format!(r#"{{"event":"media","media":{{"payload":"{payload}"}}}}"#)
}

// =============================================================================
// Forwarding rules
// =============================================================================

#[tokio::test]
async fn media_before_start_is_never_forwarded() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    for payload in ["AAAA", "BBBB", "CCCC"] {
        let flow = relay.on_telephony_text(&media_frame(payload)).await;
        assert_eq!(flow, Flow::Continue);
    }

    assert!(ai.calls().is_empty(), "no frame may reach the AI backend");
    assert!(relay.stream_sid().is_none());
}

#[tokio::test]
async fn media_after_start_is_forwarded() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    assert_eq!(relay.stream_sid(), Some("S1"));

    relay.on_telephony_text(&media_frame("AAAA")).await;
    assert_eq!(ai.calls(), vec![AiCall::Audio("AAAA".to_string())]);
}

#[tokio::test]
async fn media_is_dropped_while_ai_link_is_down() {
    let ai = MockAi::new(false);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    let flow = relay.on_telephony_text(&media_frame("AAAA")).await;

    // Dropped silently, no buffering and no error.
    assert_eq!(flow, Flow::Continue);
    assert!(ai.calls().is_empty());
}

#[tokio::test]
async fn ai_audio_is_wrapped_with_the_bound_stream_sid() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, mut out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    relay.on_telephony_text(&media_frame("AAAA")).await;
    relay
        .on_ai_event(AiEvent::AudioDelta {
            delta: "BBBB".to_string(),
        })
        .await;

    let frame = out.try_recv().expect("an outbound frame must be produced");
    assert_eq!(
        serde_json::to_string(&frame).unwrap(),
        r#"{"event":"media","streamSid":"S1","media":{"payload":"BBBB"}}"#
    );
}

#[tokio::test]
async fn ai_audio_before_start_is_dropped() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, mut out) = relay_with(&ai, &sink);

    relay
        .on_ai_event(AiEvent::AudioDelta {
            delta: "BBBB".to_string(),
        })
        .await;

    assert!(out.try_recv().is_err(), "no stream SID bound yet");
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_call() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    assert_eq!(relay.on_telephony_text("not json at all").await, Flow::Continue);
    assert_eq!(
        relay.on_telephony_text(r#"{"event":"dtmf","digit":"5"}"#).await,
        Flow::Continue
    );

    // The call keeps working afterwards.
    relay.on_telephony_text(START_S1).await;
    relay.on_telephony_text(&media_frame("AAAA")).await;
    assert_eq!(ai.calls(), vec![AiCall::Audio("AAAA".to_string())]);
}

// =============================================================================
// Tool calls
// =============================================================================

#[tokio::test]
async fn save_lead_appends_then_acks_then_requests_next_response() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "call_7".to_string(),
            name: "save_lead".to_string(),
            arguments: r#"{"name":"Jane","interest":"buying","budget":"$400k","language":"en"}"#
                .to_string(),
        })
        .await;

    let records = sink.records();
    assert_eq!(records.len(), 1, "exactly one record per tool invocation");
    assert_eq!(
        records[0],
        LeadRecord {
            name: "Jane".to_string(),
            phone: None,
            interest: "buying".to_string(),
            budget: "$400k".to_string(),
            language: "en".to_string(),
        }
    );

    // Acknowledgement referencing the same call id, then the next-response
    // directive, in that order.
    assert_eq!(
        ai.calls(),
        vec![
            AiCall::ToolResult {
                call_id: "call_7".to_string(),
                output: r#"{"success":true}"#.to_string(),
            },
            AiCall::CreateResponse,
        ]
    );
}

#[tokio::test]
async fn unparseable_tool_arguments_reach_neither_sink_nor_backend() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "call_8".to_string(),
            name: "save_lead".to_string(),
            arguments: "{broken".to_string(),
        })
        .await;

    assert!(sink.records().is_empty());
    assert!(ai.calls().is_empty(), "no acknowledgement may be sent");
}

#[tokio::test]
async fn missing_required_fields_are_a_parse_failure() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "call_9".to_string(),
            name: "save_lead".to_string(),
            arguments: r#"{"name":"Jane"}"#.to_string(),
        })
        .await;

    assert!(sink.records().is_empty());
    assert!(ai.calls().is_empty());
}

#[tokio::test]
async fn sink_failure_stalls_the_tool_turn() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    sink.fail.store(true, Ordering::SeqCst);
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "call_10".to_string(),
            name: "save_lead".to_string(),
            arguments: r#"{"name":"Jane","interest":"buying","budget":"$400k","language":"en"}"#
                .to_string(),
        })
        .await;

    // No acknowledgement and no fabricated success.
    assert!(ai.calls().is_empty());
}

#[tokio::test]
async fn unknown_tools_are_ignored() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "call_11".to_string(),
            name: "delete_everything".to_string(),
            arguments: "{}".to_string(),
        })
        .await;

    assert!(sink.records().is_empty());
    assert!(ai.calls().is_empty());
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn stop_frame_tears_down_exactly_once() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    let flow = relay.on_telephony_text(r#"{"event":"stop"}"#).await;
    assert_eq!(flow, Flow::Closed);
    assert!(relay.is_closing());

    // Simulated race: the drive loop's unconditional cleanup runs after the
    // stop frame already tore the call down.
    relay.shutdown().await;
    relay.shutdown().await;

    let disconnects = ai
        .calls()
        .iter()
        .filter(|c| matches!(c, AiCall::Disconnect))
        .count();
    assert_eq!(disconnects, 1, "connections must be closed exactly once");
}

#[tokio::test]
async fn nothing_is_forwarded_after_the_closing_flag_is_set() {
    let ai = MockAi::new(true);
    let sink = MockSink::default();
    let (mut relay, mut out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    relay.on_telephony_text(r#"{"event":"stop"}"#).await;
    let calls_at_close = ai.calls();

    // Late arrivals from both directions.
    relay.on_telephony_text(&media_frame("AAAA")).await;
    relay
        .on_ai_event(AiEvent::AudioDelta {
            delta: "BBBB".to_string(),
        })
        .await;
    relay
        .on_ai_event(AiEvent::ToolCallDone {
            call_id: "late".to_string(),
            name: "save_lead".to_string(),
            arguments: r#"{"name":"J","interest":"x","budget":"y","language":"en"}"#.to_string(),
        })
        .await;

    assert_eq!(ai.calls(), calls_at_close);
    assert!(out.try_recv().is_err());
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn ai_give_up_keeps_the_call_alive() {
    let ai = MockAi::new(false);
    let sink = MockSink::default();
    let (mut relay, _out) = relay_with(&ai, &sink);

    relay.on_telephony_text(START_S1).await;
    let flow = relay.on_ai_event(AiEvent::Closed).await;
    assert_eq!(flow, Flow::Continue, "the call outlives the AI link");
    assert!(!relay.is_closing());

    // Caller audio keeps draining, silently dropped.
    let flow = relay.on_telephony_text(&media_frame("AAAA")).await;
    assert_eq!(flow, Flow::Continue);
    assert!(ai.calls().is_empty());
}
