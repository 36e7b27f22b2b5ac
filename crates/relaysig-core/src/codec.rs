//! Inbound frame handling and acknowledgment ids.
//!
//! `decode_frame` is pure: it turns one text frame into the replies the
//! client must send and at most one event to publish. The caller owns the
//! socket and the event fan-out.

use crate::{Envelope, Negotiation, ProtocolError, SignalEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of characters of a raw frame quoted in diagnostics.
const PREVIEW_CHARS: usize = 120;

/// Source of acknowledgment-request ids. Starts at 1, never repeats.
#[derive(Debug)]
pub struct AckCounter {
    next: AtomicU64,
}

impl AckCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next_id` will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for AckCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of decoding one inbound frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Envelopes to send back immediately, in order.
    pub replies: Vec<Envelope>,
    pub event: Option<SignalEvent>,
}

impl Decoded {
    fn event(event: SignalEvent) -> Self {
        Self {
            replies: Vec::new(),
            event: Some(event),
        }
    }
}

/// Decode one inbound text frame on behalf of `local_peer_id`.
///
/// Malformed input never fails: it becomes a `Log` event and the frame is
/// dropped.
pub fn decode_frame(text: &str, local_peer_id: u64) -> Decoded {
    let envelope = match parse_envelope(text) {
        Ok(env) => env,
        Err(e) => return Decoded::event(SignalEvent::log(e.to_string())),
    };

    let mut out = Decoded::default();

    // The relay echoes our own announcement back; never ack ourselves.
    if let Some(ackid) = envelope.ackid {
        if !envelope.is_from(local_peer_id) {
            out.replies.push(Envelope::ack(ackid));
        }
    }

    if envelope.is_heartbeat() {
        out.replies.push(Envelope::heartbeat());
        return out;
    }

    let Some(peer_msg) = envelope.peer_msg else {
        return out;
    };
    if peer_msg.msg.is_empty() {
        return out;
    }

    out.event = Some(match parse_payload(&peer_msg.msg) {
        Ok(Negotiation::Offer { sdp }) => SignalEvent::Offer { sdp },
        Ok(Negotiation::Candidate(candidate)) => SignalEvent::RemoteIce(candidate),
        Ok(Negotiation::Unrecognized { fields }) => SignalEvent::log(format!(
            "unrecognized peer payload from {} with fields [{}]",
            peer_msg.from,
            fields.join(", ")
        )),
        Err(e) => SignalEvent::log(e.to_string()),
    });
    out
}

fn parse_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(text).map_err(|source| ProtocolError::Envelope {
        source,
        preview: preview(text),
    })
}

fn parse_payload(msg: &str) -> Result<Negotiation, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(msg).map_err(|source| ProtocolError::Payload {
            source,
            preview: preview(msg),
        })?;
    Ok(Negotiation::classify(&value))
}

/// First `PREVIEW_CHARS` characters of `text`, marked when truncated.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
