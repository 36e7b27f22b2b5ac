use std::time::Duration;
use tokio_tungstenite::tungstenite;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors surfaced by [`SignalingClient`](crate::SignalingClient) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The handshake request could not be built from the configuration.
    #[error("invalid handshake request: {0}")]
    InvalidRequest(String),
    /// Neither the signaling URL nor the server address names a usable host.
    #[error(transparent)]
    Address(#[from] relaysig_core::AddressError),
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    /// The attempt was superseded by `disconnect()` or a newer attempt.
    #[error("connection attempt cancelled")]
    Cancelled,
    #[error("not connected")]
    NotConnected,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
