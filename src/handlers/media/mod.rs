//! Media stream handling: the per-call relay between the telephony
//! WebSocket and the realtime AI session.
//!
//! `handler` owns the sockets and the drive loop, `relay` owns the per-call
//! state machine, `messages` types the telephony wire frames.

mod handler;
mod messages;
mod relay;

pub use handler::{MediaStreamParams, media_stream_handler};
pub use messages::{MediaFrame, StartFrame, TelephonyInbound, TelephonyOutbound};
pub use relay::{CallRelay, Flow};
