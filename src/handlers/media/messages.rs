//! Telephony media stream frame types.
//!
//! The telephony platform frames everything as JSON with an `event`
//! discriminator. Inbound we care about `start` (binds the stream SID),
//! `media` (caller audio) and `stop`; `connected` and `mark` are part of
//! the protocol and are accepted but ignored. Outbound the only frame is
//! `media`, addressed with the bound stream SID.
//!
//! Audio payloads are opaque base64 strings and are never decoded here.

use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound Frames (telephony -> gateway)
// =============================================================================

/// Inbound control/media frames from the telephony connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyInbound {
    /// Socket-level handshake notification
    Connected {},

    /// Stream start; carries the stream SID needed to address outbound audio
    Start {
        /// Start metadata
        start: StartFrame,
    },

    /// One chunk of caller audio
    Media {
        /// Media payload wrapper
        media: MediaFrame,
    },

    /// Playback checkpoint echo
    Mark {},

    /// Stream stop; the call is over
    Stop {},
}

/// Metadata carried by the `start` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StartFrame {
    /// Stream identifier assigned by the telephony platform
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    /// Call identifier, when provided
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// Media payload wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFrame {
    /// Opaque base64 audio payload
    pub payload: String,
}

// =============================================================================
// Outbound Frames (gateway -> telephony)
// =============================================================================

/// Outbound frames to the telephony connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    /// One chunk of assistant audio, addressed to the bound stream
    Media {
        /// Stream identifier bound by the `start` frame
        #[serde(rename = "streamSid")]
        stream_sid: String,
        /// Media payload wrapper
        media: MediaFrame,
    },
}

impl TelephonyOutbound {
    /// Wrap an audio payload in the outbound media frame shape.
    pub fn media(stream_sid: &str, payload: String) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.to_string(),
            media: MediaFrame { payload },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_frame_deserialization() {
        let json = r#"{"event":"start","sequenceNumber":"1",
            "start":{"streamSid":"S1","callSid":"CA1","tracks":["inbound"]}}"#;
        let frame: TelephonyInbound = serde_json::from_str(json).unwrap();
        match frame {
            TelephonyInbound::Start { start } => {
                assert_eq!(start.stream_sid, "S1");
                assert_eq!(start.call_sid.as_deref(), Some("CA1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_media_frame_deserialization() {
        let json = r#"{"event":"media","media":{"track":"inbound","payload":"AAAA"}}"#;
        let frame: TelephonyInbound = serde_json::from_str(json).unwrap();
        match frame {
            TelephonyInbound::Media { media } => assert_eq!(media.payload, "AAAA"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_stop_and_protocol_frames_tolerate_extra_fields() {
        let stop: TelephonyInbound =
            serde_json::from_str(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap();
        assert!(matches!(stop, TelephonyInbound::Stop {}));

        let connected: TelephonyInbound =
            serde_json::from_str(r#"{"event":"connected","protocol":"Call"}"#).unwrap();
        assert!(matches!(connected, TelephonyInbound::Connected {}));

        let mark: TelephonyInbound =
            serde_json::from_str(r#"{"event":"mark","mark":{"name":"m1"}}"#).unwrap();
        assert!(matches!(mark, TelephonyInbound::Mark {}));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        // Unknown frames are rejected by the parser and discarded by the
        // relay without ending the call.
        assert!(serde_json::from_str::<TelephonyInbound>(r#"{"event":"dtmf"}"#).is_err());
    }

    #[test]
    fn test_outbound_media_wire_shape() {
        let frame = TelephonyOutbound::media("S1", "BBBB".to_string());
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"event":"media","streamSid":"S1","media":{"payload":"BBBB"}}"#
        );
    }
}
