//! Tunnel wire frames exchanged with the relay.
//!
//! One JSON-encoded `Envelope` per WebSocket text message, in both
//! directions. The envelope's `request_id` correlates a `request` frame
//! with its eventual `response`; the MCP payload it carries is opaque at
//! this layer.

use serde::{Deserialize, Serialize};

use crate::error::HatchResult;

/// Frame discriminator for tunnel envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Relay confirms registration; carries the public tunnel URL.
    Registered,
    /// A caller request forwarded by the relay; payload is an MCP request.
    Request,
    /// Our reply to a `Request`; payload is an MCP response.
    Response,
    /// Relay-initiated liveness probe, answered inline with `Pong`.
    Ping,
    Pong,
    /// Observability notice: a caller connected to the public URL.
    ClientConnected,
    /// Any frame type this client version does not understand.
    #[serde(other)]
    Unknown,
}

/// A tunnel wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: FrameKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

impl Envelope {
    fn bare(kind: FrameKind) -> Self {
        Self {
            kind,
            tunnel_id: None,
            tunnel_url: None,
            request_id: None,
            payload: None,
            error: None,
            client_ip: None,
        }
    }

    /// A `registered` frame carrying the public tunnel URL.
    pub fn registered(tunnel_url: impl Into<String>) -> Self {
        Self {
            tunnel_url: Some(tunnel_url.into()),
            ..Self::bare(FrameKind::Registered)
        }
    }

    /// A `request` frame carrying an MCP request payload.
    pub fn request(request_id: &str, payload: serde_json::Value) -> Self {
        Self {
            request_id: (!request_id.is_empty()).then(|| request_id.to_string()),
            payload: Some(payload),
            ..Self::bare(FrameKind::Request)
        }
    }

    /// A `response` frame correlated to the originating request.
    pub fn response(request_id: &str, payload: serde_json::Value) -> Self {
        Self {
            request_id: (!request_id.is_empty()).then(|| request_id.to_string()),
            payload: Some(payload),
            ..Self::bare(FrameKind::Response)
        }
    }

    /// A `pong` reply to a relay liveness probe.
    pub fn pong() -> Self {
        Self::bare(FrameKind::Pong)
    }

    /// Serialize to the JSON text carried in one WebSocket message.
    pub fn encode(&self) -> HatchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the JSON text of one WebSocket message.
    pub fn decode(text: &str) -> HatchResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_uses_snake_case_tags() {
        let text = Envelope::bare(FrameKind::ClientConnected).encode().unwrap();
        assert_eq!(text, r#"{"type":"client_connected"}"#);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let text = Envelope::pong().encode().unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);
    }

    #[test]
    fn response_round_trip() {
        let env = Envelope::response("req-7", json!({"jsonrpc": "2.0", "id": 1}));
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind, FrameKind::Response);
        assert_eq!(decoded.request_id.as_deref(), Some("req-7"));
        assert_eq!(decoded.payload, env.payload);
    }

    #[test]
    fn empty_request_id_is_omitted() {
        let text = Envelope::response("", json!({})).encode().unwrap();
        assert!(!text.contains("request_id"));
    }

    #[test]
    fn decodes_registered_frame() {
        let env = Envelope::decode(
            r#"{"type":"registered","tunnel_id":"t1","tunnel_url":"https://t1.relay.hatch.sh"}"#,
        )
        .unwrap();
        assert_eq!(env.kind, FrameKind::Registered);
        assert_eq!(env.tunnel_url.as_deref(), Some("https://t1.relay.hatch.sh"));
    }

    #[test]
    fn unknown_kind_still_decodes() {
        let env = Envelope::decode(r#"{"type":"shiny_new_frame"}"#).unwrap();
        assert_eq!(env.kind, FrameKind::Unknown);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Envelope::decode("{not json").is_err());
    }
}
