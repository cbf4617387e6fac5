//! OpenAI Realtime API WebSocket message types.
//!
//! Client and server events for the Realtime API, JSON-encoded over
//! WebSocket. Only the events this gateway actually exchanges are typed;
//! anything else the backend sends deserializes into `Unhandled` so one
//! unknown event never kills a call.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Send session configuration
//! - input_audio_buffer.append - Append caller audio to the input buffer
//! - conversation.item.create - Add item to conversation (tool results)
//! - response.create - Ask the model for the next response
//!
//! Server events (received from server):
//! - session.created / session.updated - Session lifecycle
//! - response.audio.delta - Output audio chunk
//! - response.output_item.added - Output item (tracks tool-call names)
//! - response.function_call_arguments.done - Tool call arguments complete
//! - response.done - Response complete
//! - error - Backend error

use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration payload for `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Temperature for response generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Silence duration before end of turn (ms)
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    /// No turn detection
    #[serde(rename = "none")]
    None {},
}

/// Tool definition in the wire shape the Realtime API expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item. The gateway only creates `function_call_output`
/// items, but inbound items carry the other fields too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Call ID for function call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function arguments for function call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Function output for function call result items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// Build a `function_call_output` item for a completed tool call.
    pub fn function_call_output(call_id: &str, output: &str) -> Self {
        Self {
            id: None,
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.to_string()),
            name: None,
            arguments: None,
            output: Some(output.to_string()),
        }
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio payload, relayed opaquely
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Ask the model for the next response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the OpenAI Realtime API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: Session,
    },

    /// Session configuration acknowledged
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Session information
        session: Session,
    },

    /// Output audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio delta, relayed opaquely
        delta: String,
        /// Response ID
        #[serde(default)]
        response_id: Option<String>,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Output item added to the response (carries tool-call names)
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Item
        item: ConversationItem,
    },

    /// Tool call arguments complete
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Call ID
        call_id: String,
        /// Full arguments as a JSON string
        arguments: String,
        /// Function name; not all backend versions include it here
        #[serde(default)]
        name: Option<String>,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response summary
        response: ResponseSummary,
    },

    /// Any event type this gateway does not act on
    #[serde(other)]
    Unhandled,
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

/// Session information.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// Session ID
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
}

/// Response summary from `response.done`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSummary {
    /// Response ID
    #[serde(default)]
    pub id: Option<String>,
    /// Response status
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
