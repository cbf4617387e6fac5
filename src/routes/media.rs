//! Media stream WebSocket route configuration.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media::media_stream_handler;
use crate::state::AppState;

/// Create the media stream router.
///
/// # Endpoint
///
/// `GET /media-stream?lang={en|es}` - WebSocket upgrade for one call's
/// media stream.
///
/// # Protocol
///
/// After the upgrade the telephony platform sends JSON frames:
/// 1. `connected`, then `start` carrying the stream SID
/// 2. `media` frames with base64 caller audio
/// 3. `stop` when the call ends
///
/// The gateway responds with `media` frames carrying assistant audio,
/// addressed with the bound stream SID.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
