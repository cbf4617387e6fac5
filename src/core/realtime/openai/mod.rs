//! OpenAI Realtime API backend.
//!
//! WebSocket-based full-duplex audio session against OpenAI's Realtime API.
//!
//! # Audio Format
//!
//! The telephony stream negotiates G.711 µ-law at 8kHz once at setup, and
//! payloads are relayed as opaque base64 strings in both directions; this
//! layer never decodes audio.

mod client;
mod config;
mod messages;

pub use client::OpenAiSession;
pub use config::{OPENAI_REALTIME_URL, OpenAiAudioFormat, OpenAiModel, OpenAiVoice};
pub use messages::{
    ClientEvent, ConversationItem, ServerEvent, SessionConfig, ToolDef, TurnDetection,
};
