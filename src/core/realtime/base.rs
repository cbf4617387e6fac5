//! Base types for the realtime AI session layer.
//!
//! This module defines the provider-independent pieces of the AI side of a
//! call: the error taxonomy, the reconnect policy and link state machine,
//! the session configuration sent on every (re)open, and the `AiSession`
//! trait the call relay drives.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the realtime AI link.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend-reported error
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Policy for automatic reconnection after an unrequested connection loss.
///
/// Backoff is linear: the delay before attempt `n` is `base_delay × n`.
/// The attempt ceiling is a hard cap on consecutive failures; the counter
/// resets to zero whenever a connection opens successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Base delay between reconnection attempts (milliseconds).
    /// Default: 1000ms
    pub base_delay_ms: u64,

    /// Maximum number of consecutive reconnection attempts before giving up.
    /// Default: 5
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt number (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }

    /// Whether the given attempt number is still within the ceiling.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

// =============================================================================
// Link State
// =============================================================================

/// State of the AI-side link within one call session.
///
/// All transitions run through [`LinkState::on_opened`] and
/// [`LinkState::on_closed`] so the ceiling and backoff bookkeeping live in
/// one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Initial dial in progress
    #[default]
    Connecting,
    /// Connected; configuration has been sent
    Open,
    /// Lost the connection; a retry is scheduled
    Reconnecting {
        /// Consecutive attempt number (1-based)
        attempt: u32,
    },
    /// Retry ceiling reached; no further automatic reconnection
    GivenUp,
}

impl LinkState {
    /// Transition for a successful open. Resets the attempt counter.
    pub fn on_opened(self) -> LinkState {
        match self {
            LinkState::GivenUp => LinkState::GivenUp,
            _ => LinkState::Open,
        }
    }

    /// Transition for an unrequested close or failed dial.
    ///
    /// Increments the attempt counter and either schedules the next retry
    /// or gives up once the ceiling is exceeded.
    pub fn on_closed(self, policy: &ReconnectPolicy) -> LinkState {
        let next_attempt = match self {
            LinkState::Reconnecting { attempt } => attempt + 1,
            LinkState::GivenUp => return LinkState::GivenUp,
            _ => 1,
        };
        if policy.allows(next_attempt) {
            LinkState::Reconnecting {
                attempt: next_attempt,
            }
        } else {
            LinkState::GivenUp
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connecting => write!(f, "Connecting"),
            LinkState::Open => write!(f, "Open"),
            LinkState::Reconnecting { attempt } => write!(f, "Reconnecting(attempt {attempt})"),
            LinkState::GivenUp => write!(f, "GivenUp"),
        }
    }
}

// =============================================================================
// Configuration Types
// =============================================================================

/// Declared tool the model may call during the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Session configuration for the realtime AI backend.
///
/// Sent in full on every successful (re)open, since backend sessions do not
/// survive reconnection.
#[derive(Debug, Clone, Default)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Endpoint override. When unset the backend's production URL is used;
    /// set it to point the client at a proxy or a local test server.
    pub endpoint: Option<String>,

    /// Voice for audio output
    pub voice: Option<String>,

    /// Behavioral instructions for the assistant
    pub instructions: Option<String>,

    /// Audio format for both directions (negotiated once at setup)
    pub audio_format: Option<String>,

    /// Temperature for response generation
    pub temperature: Option<f32>,

    /// Tools declared to the model
    pub tools: Vec<ToolDefinition>,

    /// Reconnection policy for the link
    pub reconnect: ReconnectPolicy,
}

// =============================================================================
// Inbound Events
// =============================================================================

/// Typed events delivered from the AI backend to the call relay.
///
/// Delivered in the order received from the backend; no reordering or
/// coalescing.
#[derive(Debug, Clone)]
pub enum AiEvent {
    /// The backend acknowledged the session configuration
    SessionUpdated,
    /// A chunk of output audio (opaque base64 payload)
    AudioDelta {
        /// Base64 audio payload
        delta: String,
    },
    /// A tool call's arguments are complete
    ToolCallDone {
        /// Call id to reference when submitting the result
        call_id: String,
        /// Tool name
        name: String,
        /// Arguments as a JSON string
        arguments: String,
    },
    /// The backend reported an error
    Error {
        /// Error message
        message: String,
    },
    /// The link is permanently down (retry ceiling reached)
    Closed,
}

// =============================================================================
// Session Trait
// =============================================================================

/// One (re)connectable link to the realtime AI backend.
///
/// Owned exclusively by one call relay. Implementations deliver inbound
/// events through the channel supplied at construction, in arrival order.
#[async_trait]
pub trait AiSession: Send + Sync {
    /// Forward one opaque audio payload as an audio-append event.
    async fn send_audio(&self, payload: &str) -> RealtimeResult<()>;

    /// Submit a tool call result referencing the given call id.
    async fn submit_tool_result(&self, call_id: &str, output: &str) -> RealtimeResult<()>;

    /// Ask the model to produce the next response.
    async fn create_response(&self) -> RealtimeResult<()>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Close the link and cancel any pending reconnection. Idempotent.
    async fn disconnect(&self);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RealtimeError::ConnectionFailed("test".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let err = RealtimeError::NotConnected;
        assert_eq!(err.to_string(), "Not connected");
    }

    #[test]
    fn test_policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_policy_linear_delay() {
        let policy = ReconnectPolicy {
            base_delay_ms: 250,
            max_attempts: 5,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(2), Duration::from_millis(500));
        assert_eq!(policy.delay(5), Duration::from_millis(1250));
    }

    #[test]
    fn test_policy_delay_non_decreasing() {
        let policy = ReconnectPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn test_policy_ceiling() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(1));
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn test_link_state_display() {
        assert_eq!(LinkState::Connecting.to_string(), "Connecting");
        assert_eq!(LinkState::Open.to_string(), "Open");
        assert_eq!(
            LinkState::Reconnecting { attempt: 3 }.to_string(),
            "Reconnecting(attempt 3)"
        );
        assert_eq!(LinkState::GivenUp.to_string(), "GivenUp");
    }

    #[test]
    fn test_link_state_open_resets_attempts() {
        let policy = ReconnectPolicy::default();
        let state = LinkState::Open.on_closed(&policy);
        assert_eq!(state, LinkState::Reconnecting { attempt: 1 });

        let state = state.on_opened();
        assert_eq!(state, LinkState::Open);

        // A fresh loss after a successful open starts the count over.
        let state = state.on_closed(&policy);
        assert_eq!(state, LinkState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn test_link_state_counts_to_ceiling() {
        let policy = ReconnectPolicy {
            base_delay_ms: 1,
            max_attempts: 3,
        };
        let mut state = LinkState::Connecting;
        for expected in 1..=3u32 {
            state = state.on_closed(&policy);
            assert_eq!(state, LinkState::Reconnecting { attempt: expected });
        }
        state = state.on_closed(&policy);
        assert_eq!(state, LinkState::GivenUp);
    }

    #[test]
    fn test_link_state_given_up_is_terminal() {
        let policy = ReconnectPolicy::default();
        assert_eq!(LinkState::GivenUp.on_closed(&policy), LinkState::GivenUp);
        assert_eq!(LinkState::GivenUp.on_opened(), LinkState::GivenUp);
    }
}
