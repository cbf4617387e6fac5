//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::leads::{CsvLeadSink, LeadSink, save_lead_tool};
use crate::core::realtime::RealtimeConfig;
use crate::prompts::Language;

/// State shared by all handlers. One instance per process; per-call state
/// lives in each call's relay.
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Lead persistence, shared across concurrent calls
    pub lead_sink: Arc<dyn LeadSink>,
}

impl AppState {
    /// Create the application state, wiring the CSV lead sink.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let lead_sink = Arc::new(CsvLeadSink::new(&config.leads_path));
        Arc::new(Self { config, lead_sink })
    }

    /// Build the AI session configuration for one call in the given
    /// language. Sent in full on every (re)open of the AI link.
    pub fn realtime_config(&self, language: Language) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.config.openai_api_key.clone(),
            model: self.config.openai_model.clone(),
            endpoint: None,
            voice: Some(self.config.openai_voice.clone()),
            instructions: Some(language.instructions().to_string()),
            audio_format: Some("g711_ulaw".to_string()),
            temperature: Some(0.8),
            tools: vec![save_lead_tool()],
            reconnect: self.config.reconnect.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::ReconnectPolicy;

    fn test_state() -> Arc<AppState> {
        AppState::new(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_host: None,
            openai_api_key: "sk-test".to_string(),
            openai_model: "gpt-4o-realtime-preview".to_string(),
            openai_voice: "alloy".to_string(),
            leads_path: "leads.csv".into(),
            reconnect: ReconnectPolicy::default(),
        })
    }

    #[test]
    fn test_realtime_config_per_language() {
        let state = test_state();

        let en = state.realtime_config(Language::En);
        assert!(en.instructions.unwrap().contains("Miami real estate"));

        let es = state.realtime_config(Language::Es);
        assert!(es.instructions.unwrap().contains("inmobiliario"));
        assert_eq!(es.audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(es.temperature, Some(0.8));
        assert_eq!(es.tools.len(), 1);
        assert_eq!(es.tools[0].name, "save_lead");
    }
}
