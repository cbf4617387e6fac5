//! Incoming call webhooks.
//!
//! The telephony platform hits `/incoming-call` when a call arrives; the
//! returned call-control markup gathers a one-digit language selection and
//! posts it to `/gather-language`, which either connects the media stream
//! against this service with the chosen `lang` or re-prompts.

use std::sync::Arc;

use axum::Form;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use crate::prompts::Language;
use crate::state::AppState;

/// Form fields posted by the telephony platform after a gather completes.
#[derive(Debug, Default, Deserialize)]
pub struct GatherParams {
    /// The digit(s) pressed by the caller
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
    /// The unique identifier for this call
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    /// The phone number of the caller
    #[serde(rename = "From", default)]
    pub from: Option<String>,
}

/// `GET|POST /incoming-call` - prompt for a language selection.
pub async fn incoming_call() -> Response {
    twiml_response(gather_twiml())
}

/// `GET|POST /gather-language` - resolve the digit into a language and
/// connect the media stream, or re-prompt on anything else.
pub async fn gather_language(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<GatherParams>,
) -> Response {
    let host = stream_host(&state, &headers);
    let digits = params.digits.as_deref().unwrap_or("");

    let markup = match digits {
        "1" => {
            info!(call_sid = ?params.call_sid, "caller selected English");
            connect_twiml(
                &host,
                Language::En,
                "Connecting you to the English assistant...",
            )
        }
        "2" => {
            info!(call_sid = ?params.call_sid, "caller selected Spanish");
            connect_twiml(
                &host,
                Language::Es,
                "Conectando con el asistente en Español...",
            )
        }
        other => {
            warn!(call_sid = ?params.call_sid, digits = %other, "invalid language selection");
            reject_twiml()
        }
    };

    twiml_response(markup)
}

/// Host used in the media stream URL: the configured public host when set,
/// otherwise the Host header of the incoming webhook.
fn stream_host(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(host) = &state.config.public_host {
        return host.clone();
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

fn twiml_response(markup: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], markup).into_response()
}

/// Markup gathering a one-digit language selection, looping back on no input.
fn gather_twiml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Gather numDigits="1" action="/gather-language" method="POST">
    <Say>Hello. For English, press 1. Para Español, presione el número 2.</Say>
  </Gather>
  <Redirect>/incoming-call</Redirect>
</Response>"#
        .to_string()
}

/// Markup connecting the media stream for the selected language.
fn connect_twiml(host: &str, language: Language, greeting: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{greeting}</Say>
  <Connect>
    <Stream url="wss://{host}/media-stream?lang={lang}"/>
  </Connect>
</Response>"#,
        lang = language.as_str(),
    )
}

/// Markup for an invalid selection: spoken rejection, then re-prompt.
fn reject_twiml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>Invalid selection. Please try again.</Say>
  <Redirect>/incoming-call</Redirect>
</Response>"#
        .to_string()
}
