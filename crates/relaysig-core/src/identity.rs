//! Session identity.
//!
//! Fixed for the lifetime of a client instance:
//! - `peer_id` - numeric identifier announced to the relay
//! - `peer_name` - random routing name used in the sign-in URL
//! - `session_token` - caller-supplied token carried in the subprotocol

use crate::LOCAL_PEER_ID;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the WebSocket subprotocol that carries the session token.
const SUBPROTOCOL_PREFIX: &str = "x-nv-sessionid.";

/// Who this client is for the duration of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    peer_id: u64,
    peer_name: String,
    session_token: String,
}

impl SessionIdentity {
    /// Create an identity with a freshly generated peer name.
    pub fn generate(session_token: impl Into<String>) -> Self {
        Self::new(LOCAL_PEER_ID, random_peer_name(), session_token)
    }

    /// Create an identity from explicit parts.
    pub fn new(
        peer_id: u64,
        peer_name: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            peer_id,
            peer_name: peer_name.into(),
            session_token: session_token.into(),
        }
    }

    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Subprotocol string offered during the WebSocket handshake.
    pub fn subprotocol(&self) -> String {
        format!("{SUBPROTOCOL_PREFIX}{}", self.session_token)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.peer_name, self.peer_id)
    }
}

/// `peer-` followed by ten random digits. Not a secret, only a routing hint.
fn random_peer_name() -> String {
    let n: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
    format!("peer-{n}")
}
