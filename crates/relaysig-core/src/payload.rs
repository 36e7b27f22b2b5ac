//! Negotiation payloads carried inside `PeerMessage::msg`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ICE candidate fields as exchanged with the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u32>,
}

/// Payloads this client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Answer(Answer),
    Candidate(IceCandidate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "answer")]
pub struct Answer {
    pub sdp: String,
    #[serde(rename = "nvstSdp", skip_serializing_if = "Option::is_none")]
    pub nvst_sdp: Option<String>,
}

impl OutboundPayload {
    pub fn answer(sdp: impl Into<String>, nvst_sdp: Option<String>) -> Self {
        Self::Answer(Answer {
            sdp: sdp.into(),
            nvst_sdp,
        })
    }

    pub fn candidate(
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    ) -> Self {
        Self::Candidate(IceCandidate {
            candidate: candidate.into(),
            sdp_mid,
            sdp_m_line_index,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What an inbound payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    Offer { sdp: String },
    Candidate(IceCandidate),
    /// Neither an offer nor a candidate; carries the object's field names.
    Unrecognized { fields: Vec<String> },
}

impl Negotiation {
    /// Classify a parsed payload. Fields of an unexpected type are treated
    /// as absent rather than rejected.
    pub fn classify(value: &Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str);
        if kind == Some("offer") {
            if let Some(sdp) = value.get("sdp").and_then(Value::as_str) {
                return Self::Offer {
                    sdp: sdp.to_string(),
                };
            }
        }
        if let Some(candidate) = value.get("candidate").and_then(Value::as_str) {
            return Self::Candidate(IceCandidate {
                candidate: candidate.to_string(),
                sdp_mid: value
                    .get("sdpMid")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                sdp_m_line_index: value
                    .get("sdpMLineIndex")
                    .and_then(Value::as_u64)
                    .and_then(|i| u32::try_from(i).ok()),
            });
        }
        let fields = value
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        Self::Unrecognized { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_shape() {
        let v: Value =
            serde_json::from_str(&OutboundPayload::answer("v=0", None).to_json().unwrap()).unwrap();
        assert_eq!(v, json!({"type": "answer", "sdp": "v=0"}));

        let v: Value = serde_json::from_str(
            &OutboundPayload::answer("v=0", Some("a=x".into()))
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(v, json!({"type": "answer", "sdp": "v=0", "nvstSdp": "a=x"}));
    }

    #[test]
    fn candidate_keeps_nulls() {
        let v: Value = serde_json::from_str(
            &OutboundPayload::candidate("candidate:1", None, None)
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            v,
            json!({"candidate": "candidate:1", "sdpMid": null, "sdpMLineIndex": null})
        );
    }

    #[test]
    fn classify_offer_and_candidate() {
        assert_eq!(
            Negotiation::classify(&json!({"type": "offer", "sdp": "v=0"})),
            Negotiation::Offer { sdp: "v=0".into() }
        );
        assert_eq!(
            Negotiation::classify(&json!({"candidate": "c", "sdpMid": "0", "sdpMLineIndex": 0})),
            Negotiation::Candidate(IceCandidate {
                candidate: "c".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            })
        );
    }

    #[test]
    fn classify_tolerates_odd_types() {
        assert_eq!(
            Negotiation::classify(&json!({"candidate": "c", "sdpMid": 5, "sdpMLineIndex": "x"})),
            Negotiation::Candidate(IceCandidate {
                candidate: "c".into(),
                sdp_mid: None,
                sdp_m_line_index: None,
            })
        );
        // Offer without a string sdp is not an offer.
        assert_eq!(
            Negotiation::classify(&json!({"type": "offer", "sdp": 1})),
            Negotiation::Unrecognized {
                fields: vec!["sdp".into(), "type".into()]
            }
        );
        assert_eq!(
            Negotiation::classify(&json!(12)),
            Negotiation::Unrecognized { fields: vec![] }
        );
    }
}
