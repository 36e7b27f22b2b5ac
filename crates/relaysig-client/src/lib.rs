//! Reconnecting signaling client.
//!
//! [`SignalingClient`] owns a single WebSocket connection to a relay,
//! announces the local peer, keeps the link alive, relays negotiation
//! payloads to and from one remote peer, and reconnects with exponential
//! backoff after involuntary closes. Everything it observes is published to
//! subscribers of its [`EventPublisher`].

mod client;
mod config;
mod error;
mod events;
mod liveness;
mod reconnect;
mod transport;

pub use client::SignalingClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{EventPublisher, Subscription};
pub use reconnect::{ReconnectController, ReconnectPolicy, RetryDecision};
pub use transport::{Connector, WsConnector, build_request};

pub use relaysig_core::{ConnectionState, IceCandidate, SessionIdentity, SignalEvent};
