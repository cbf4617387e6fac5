//! Incoming-call webhook route configuration.

use std::sync::Arc;

use axum::{Router, routing::any};
use tower_http::trace::TraceLayer;

use crate::handlers::call::{gather_language, incoming_call};
use crate::state::AppState;

/// Create the webhook router.
///
/// # Endpoints
///
/// - `GET|POST /incoming-call` - call-control markup gathering a one-digit
///   language selection
/// - `GET|POST /gather-language` - resolves the digit and connects the
///   media stream, or re-prompts
///
/// The telephony platform may use either method depending on webhook
/// configuration, so both are accepted.
pub fn create_call_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/incoming-call", any(incoming_call))
        .route("/gather-language", any(gather_language))
        .layer(TraceLayer::new_for_http())
}
