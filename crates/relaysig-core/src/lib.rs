//! Core types for relaysig.
//!
//! This crate provides the protocol primitives: who we are, where we connect,
//! what goes over the wire and how an inbound frame is turned into replies and
//! events. It performs no I/O; the client crate drives it.

mod codec;
mod endpoint;
mod event;
mod identity;
mod message;
mod payload;

pub use codec::{AckCounter, Decoded, decode_frame, preview};
pub use endpoint::{AddressError, DEFAULT_PATH, DEFAULT_PORT, Endpoint, resolve};
pub use event::SignalEvent;
pub use identity::SessionIdentity;
pub use message::{Envelope, PeerInfo, PeerMessage};
pub use payload::{Answer, IceCandidate, Negotiation, OutboundPayload};

use serde::{Deserialize, Serialize};

/// Peer identifier this client announces itself with.
pub const LOCAL_PEER_ID: u64 = 2;

/// Peer identifier of the remote party every relay message is addressed to.
pub const REMOTE_PEER_ID: u64 = 1;

/// Close codes after which no reconnection is attempted.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when the transport vanished without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Idle, either never connected or closed by the caller.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Open and announced.
    Connected,
    /// Closed involuntarily with a retry scheduled.
    Reconnecting,
}

/// Error decoding a frame or a negotiation payload.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {source} (raw: {preview})")]
    Envelope {
        source: serde_json::Error,
        preview: String,
    },
    #[error("malformed peer payload: {source} (raw: {preview})")]
    Payload {
        source: serde_json::Error,
        preview: String,
    },
}
