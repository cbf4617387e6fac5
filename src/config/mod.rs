//! Configuration module for the Leadline Gateway.
//!
//! Configuration comes from environment variables (with `.env` loaded by
//! `main` before this runs). Every knob has a default except the OpenAI
//! API key, which is required.
//!
//! # Environment variables
//!
//! - `HOST` / `PORT` - listen address (default `0.0.0.0:3000`)
//! - `PUBLIC_HOST` - host used in media stream URLs; falls back to the
//!   webhook request's Host header when unset
//! - `OPENAI_API_KEY` - required
//! - `OPENAI_REALTIME_MODEL` / `OPENAI_REALTIME_VOICE` - model and voice
//! - `LEADS_CSV_PATH` - lead sink file (default `leads.csv`)
//! - `AI_RECONNECT_BASE_DELAY_MS` / `AI_RECONNECT_MAX_ATTEMPTS` - linear
//!   backoff tuning for the AI link

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::core::realtime::ReconnectPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is missing
    #[error("Missing required environment variable: {0}")]
    MissingVariable(&'static str),

    /// A variable has an unusable value
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Public host for media stream URLs, when behind a tunnel or proxy
    pub public_host: Option<String>,

    /// OpenAI API key
    pub openai_api_key: String,
    /// Realtime model identifier
    pub openai_model: String,
    /// Voice for audio output
    pub openai_voice: String,

    /// Path of the lead CSV file
    pub leads_path: PathBuf,

    /// Reconnect policy for the AI link
    pub reconnect: ReconnectPolicy,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Split out of [`from_env`]
    /// so validation is testable without mutating the process environment.
    fn build(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVariable("OPENAI_API_KEY"))?;

        let defaults = ReconnectPolicy::default();
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", lookup("PORT"), 3000)?,
            public_host: lookup("PUBLIC_HOST").filter(|v| !v.is_empty()),
            openai_api_key,
            openai_model: lookup("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| "gpt-4o-realtime-preview".to_string()),
            openai_voice: lookup("OPENAI_REALTIME_VOICE").unwrap_or_else(|| "alloy".to_string()),
            leads_path: lookup("LEADS_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("leads.csv")),
            reconnect: ReconnectPolicy {
                base_delay_ms: parse_or(
                    "AI_RECONNECT_BASE_DELAY_MS",
                    lookup("AI_RECONNECT_BASE_DELAY_MS"),
                    defaults.base_delay_ms,
                )?,
                max_attempts: parse_or(
                    "AI_RECONNECT_MAX_ATTEMPTS",
                    lookup("AI_RECONNECT_MAX_ATTEMPTS"),
                    defaults.max_attempts,
                )?,
            },
        })
    }

    /// Listen address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an optional variable, falling back to a default when unset.
fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        _ => Ok(default),
    }
}
