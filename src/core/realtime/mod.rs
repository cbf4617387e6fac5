//! Realtime AI session module.
//!
//! One outbound, reconnectable link to the conversational AI backend per
//! call. The [`AiSession`] trait is the seam the call relay drives;
//! [`OpenAiSession`] is the production implementation.
//!
//! # Guarantees
//!
//! - The full session configuration (language instructions plus the
//!   declared tool schema) is re-sent on every successful (re)open.
//! - Inbound events are delivered in the order received from the backend.
//! - Reconnection uses linear backoff with a hard attempt ceiling; cleanup
//!   cancels any pending attempt, and a dial that completes after cleanup
//!   is discarded without processing a single event.

mod base;
pub mod openai;

pub use base::{
    AiEvent, AiSession, LinkState, RealtimeConfig, RealtimeError, RealtimeResult, ReconnectPolicy,
    ToolDefinition,
};
pub use openai::{OPENAI_REALTIME_URL, OpenAiModel, OpenAiSession, OpenAiVoice};
