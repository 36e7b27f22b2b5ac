//! Events published to consumers of a signaling session.

use crate::IceCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something a consumer of the session may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SignalEvent {
    /// The connection is open and the identity has been announced.
    Connected,
    /// The connection closed, voluntarily or not.
    Disconnected { code: u16, reason: String },
    /// Transport failure. `fatal` marks retry exhaustion.
    Error { message: String, fatal: bool },
    /// Diagnostic only; nothing changed.
    Log { message: String },
    /// The remote peer offered a session description.
    Offer { sdp: String },
    /// The remote peer sent an ICE candidate.
    RemoteIce(IceCandidate),
}

impl SignalEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn disconnected(code: u16, reason: impl Into<String>) -> Self {
        Self::Disconnected {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected { code, reason } => write!(f, "disconnected ({code}): {reason}"),
            Self::Error { message, fatal: true } => write!(f, "fatal error: {message}"),
            Self::Error { message, .. } => write!(f, "error: {message}"),
            Self::Log { message } => write!(f, "log: {message}"),
            Self::Offer { sdp } => write!(f, "offer ({} bytes)", sdp.len()),
            Self::RemoteIce(c) => write!(f, "remote ice: {}", c.candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_event_tag() {
        let v = serde_json::to_value(SignalEvent::Offer { sdp: "v=0".into() }).unwrap();
        assert_eq!(v, json!({"event": "offer", "sdp": "v=0"}));

        let v = serde_json::to_value(SignalEvent::RemoteIce(IceCandidate {
            candidate: "c".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }))
        .unwrap();
        assert_eq!(
            v,
            json!({"event": "remote-ice", "candidate": "c", "sdpMid": "0", "sdpMLineIndex": 0})
        );
    }
}
