//! Client configuration.

use crate::ReconnectPolicy;
use relaysig_core::DEFAULT_PATH;
use std::time::Duration;

/// Origin presented during the handshake.
pub const DEFAULT_ORIGIN: &str = "https://play.relaysig.dev";

/// Client identity presented as `User-Agent` and as the browser name in the
/// presence announcement.
pub const DEFAULT_USER_AGENT: &str = concat!("relaysig/", env!("CARGO_PKG_VERSION"));

/// Everything a [`SignalingClient`](crate::SignalingClient) needs to reach a
/// relay.
///
/// # Examples
///
/// ```rust
/// use relaysig_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("relay.example.com", "session-token")
///     .signaling_url("wss://edge.example.com:8443/nvst/sign_in")
///     .heartbeat_interval(Duration::from_secs(5));
/// assert_eq!(config.server, "relay.example.com");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Configured server address, `host[:port]`.
    pub server: String,
    /// Previously observed signaling URL; authoritative when present.
    pub signaling_url: Option<String>,
    /// Opaque token carried in the WebSocket subprotocol.
    pub session_token: String,
    /// Sign-in path on the relay.
    pub path: String,
    pub origin: String,
    pub user_agent: String,
    /// Application heartbeat period. Default: 5 seconds
    pub heartbeat_interval: Duration,
    /// Transport-level ping period. Default: 15 seconds
    pub ping_interval: Duration,
    /// Bound on TCP + TLS + WebSocket handshake. Default: 10 seconds
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            signaling_url: None,
            session_token: session_token.into(),
            path: DEFAULT_PATH.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            heartbeat_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = Some(url.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ClientConfig::new("relay.example.com", "tok");
        assert_eq!(c.path, "nvst/sign_in");
        assert_eq!(c.heartbeat_interval, Duration::from_millis(5000));
        assert_eq!(c.ping_interval, Duration::from_millis(15000));
        assert_eq!(c.reconnect.max_attempts, 6);
        assert!(c.signaling_url.is_none());
        assert!(c.user_agent.starts_with("relaysig/"));
    }
}
