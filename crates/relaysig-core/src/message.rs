//! Envelope messages.
//!
//! The envelope is relay framing only. The negotiation content lives in
//! `PeerMessage::msg` as a JSON string and is handled by `payload`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Outer frame exchanged with the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Acknowledgment requested under this id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ackid: Option<u64>,
    /// Acknowledges a previously received `ackid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    /// Application heartbeat marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hb: Option<u32>,
    /// Presence block. Read leniently: see [`PeerInfo::from_value`].
    #[serde(
        default,
        deserialize_with = "lenient_peer_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub peer_info: Option<PeerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_msg: Option<PeerMessage>,
}

impl Envelope {
    pub fn heartbeat() -> Self {
        Self {
            hb: Some(1),
            ..Self::default()
        }
    }

    pub fn ack(id: u64) -> Self {
        Self {
            ack: Some(id),
            ..Self::default()
        }
    }

    /// Presence announcement sent right after the connection opens.
    pub fn announce(info: PeerInfo, ackid: u64) -> Self {
        Self {
            ackid: Some(ackid),
            peer_info: Some(info),
            ..Self::default()
        }
    }

    /// Relay a negotiation payload to another peer.
    pub fn relay(msg: PeerMessage, ackid: u64) -> Self {
        Self {
            ackid: Some(ackid),
            peer_msg: Some(msg),
            ..Self::default()
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.hb.is_some_and(|hb| hb != 0)
    }

    /// Whether the embedded presence block names `peer_id`.
    pub fn is_from(&self, peer_id: u64) -> bool {
        self.peer_info.as_ref().is_some_and(|info| info.id == peer_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Presence block: identifier, display metadata, capability flags.
///
/// Everything except `id` is optional on the way in; the relay echoes
/// partial blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Peer identifier; the only field acknowledgment decisions use.
    pub id: u64,
    /// Human-readable routing name.
    pub name: String,
    /// Client software name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Client software version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    /// Display resolution, `WIDTHxHEIGHT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Whether the peer considers itself online.
    pub connected: bool,
    /// Role flag; 0 for a regular client.
    pub peer_role: u32,
    /// Protocol version the peer speaks.
    pub version: u32,
}

impl PeerInfo {
    /// Presence block for the local client.
    pub fn local(id: u64, name: impl Into<String>, browser: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            browser: Some(browser.into()),
            browser_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            resolution: Some("1920x1080".to_string()),
            connected: true,
            peer_role: 0,
            version: 2,
        }
    }

    /// Read a presence block sent by the relay.
    ///
    /// Only a numeric `id` is required. Metadata of an unexpected type is
    /// treated as absent so the rest of the frame still gets processed.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(Value::as_u64)?;
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };
        Some(Self {
            id,
            name: text("name").unwrap_or_default(),
            browser: text("browser"),
            browser_version: text("browserVersion"),
            resolution: text("resolution"),
            connected: value
                .get("connected")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            peer_role: number("peerRole").unwrap_or(0),
            version: number("version").unwrap_or(0),
        })
    }
}

fn lenient_peer_info<'de, D>(deserializer: D) -> Result<Option<PeerInfo>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(PeerInfo::from_value))
}

/// Negotiation payload routed between two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub from: u64,
    pub to: u64,
    /// JSON-encoded negotiation object.
    #[serde(default)]
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heartbeat_wire_shape() {
        assert_eq!(Envelope::heartbeat().to_json().unwrap(), r#"{"hb":1}"#);
        assert_eq!(Envelope::ack(7).to_json().unwrap(), r#"{"ack":7}"#);
    }

    #[test]
    fn announce_wire_shape() {
        let env = Envelope::announce(PeerInfo::local(2, "peer-9", "relaysig"), 1);
        let v: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(v["ackid"], json!(1));
        assert_eq!(v["peer_info"]["id"], json!(2));
        assert_eq!(v["peer_info"]["name"], json!("peer-9"));
        assert_eq!(v["peer_info"]["connected"], json!(true));
        assert_eq!(v["peer_info"]["peerRole"], json!(0));
        assert!(v.get("hb").is_none());
    }

    #[test]
    fn odd_peer_info_metadata_is_tolerated() {
        let env: Envelope = serde_json::from_str(
            r#"{"ackid":5,"peer_info":{"id":1,"name":7,"version":"2.0","connected":"yes","peerRole":-1}}"#,
        )
        .unwrap();
        let info = env.peer_info.unwrap();
        assert_eq!(info.id, 1);
        assert_eq!(info.name, "");
        assert_eq!(info.version, 0);
        assert!(!info.connected);
        assert_eq!(env.ackid, Some(5));
    }

    #[test]
    fn peer_info_without_numeric_id_is_dropped() {
        let env: Envelope =
            serde_json::from_str(r#"{"ackid":6,"peer_info":{"id":"1","name":"srv"}}"#).unwrap();
        assert!(env.peer_info.is_none());
        assert!(!env.is_from(1));
    }

    #[test]
    fn partial_peer_info_parses() {
        let env: Envelope = serde_json::from_str(r#"{"ackid":3,"peer_info":{"id":1}}"#).unwrap();
        assert!(env.is_from(1));
        assert!(!env.is_from(2));
        assert!(!env.is_heartbeat());
    }
}
