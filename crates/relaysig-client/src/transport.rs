//! Transport seam: how a handshake request becomes a WebSocket.
//!
//! Connection setup is kept behind [`Connector`] so the supervisor can be
//! driven over any byte stream. [`WsConnector`] is the production path
//! (TCP + rustls); tests plug in an in-memory duplex.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use relaysig_core::{Endpoint, SessionIdentity};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, generate_key};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    HOST, ORIGIN, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, USER_AGENT,
};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Work queued for a connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Message),
    /// Close the socket and stop.
    Close(Option<CloseFrame>),
}

/// The supervisor's send primitive for one connection.
pub(crate) type OutboundTx = mpsc::UnboundedSender<Outbound>;

/// Opens a WebSocket for a prepared handshake request.
pub trait Connector: Send + Sync + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<WebSocketStream<Self::Io>, tungstenite::Error>> + Send;
}

/// TCP + rustls connector used outside of tests.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    _priv: (),
}

impl WsConnector {
    pub fn new() -> Self {
        // Another component may already have installed a provider; either way
        // one is in place afterwards.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self { _priv: () }
    }
}

impl Connector for WsConnector {
    type Io = MaybeTlsStream<tokio::net::TcpStream>;

    async fn connect(
        &self,
        request: Request,
    ) -> Result<WebSocketStream<Self::Io>, tungstenite::Error> {
        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(stream)
    }
}

/// Build the handshake request: subprotocol carrying the session token,
/// resolved `Host`, fixed `Origin` and `User-Agent`, fresh key.
pub fn build_request(
    endpoint: &Endpoint,
    identity: &SessionIdentity,
    config: &ClientConfig,
) -> Result<Request> {
    let mut request = endpoint.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(HOST, header_value("host", &endpoint.host)?);
    headers.insert(ORIGIN, header_value("origin", &config.origin)?);
    headers.insert(USER_AGENT, header_value("user agent", &config.user_agent)?);
    headers.insert(
        SEC_WEBSOCKET_PROTOCOL,
        header_value("session token", &identity.subprotocol())?,
    );
    headers.insert(SEC_WEBSOCKET_KEY, header_value("key", &generate_key())?);
    Ok(request)
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidRequest(format!("{what} is not a valid header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaysig_core::resolve;

    fn request_for(config: &ClientConfig) -> Request {
        let identity = SessionIdentity::new(2, "peer-7", config.session_token.clone());
        let endpoint = resolve(
            &config.server,
            config.signaling_url.as_deref(),
            &config.path,
            identity.peer_name(),
        )
        .unwrap();
        build_request(&endpoint, &identity, config).unwrap()
    }

    #[test]
    fn handshake_headers() {
        let config = ClientConfig::new("relay.example.com", "tok-1").origin("https://app.example");
        let req = request_for(&config);
        assert_eq!(
            req.uri().to_string(),
            "wss://relay.example.com/nvst/sign_in?peer_id=peer-7&version=2"
        );
        let h = req.headers();
        assert_eq!(h[HOST], "relay.example.com:443");
        assert_eq!(h[ORIGIN], "https://app.example");
        assert_eq!(h[SEC_WEBSOCKET_PROTOCOL], "x-nv-sessionid.tok-1");
        assert!(h[USER_AGENT].to_str().unwrap().starts_with("relaysig/"));
        assert!(!h[SEC_WEBSOCKET_KEY].is_empty());
    }

    #[test]
    fn fresh_key_per_request() {
        let config = ClientConfig::new("relay.example.com", "tok");
        let a = request_for(&config);
        let b = request_for(&config);
        assert_ne!(a.headers()[SEC_WEBSOCKET_KEY], b.headers()[SEC_WEBSOCKET_KEY]);
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let config = ClientConfig::new("relay.example.com", "bad\ntoken");
        let identity = SessionIdentity::new(2, "p", "bad\ntoken");
        let endpoint = resolve(&config.server, None, &config.path, "p").unwrap();
        let err = build_request(&endpoint, &identity, &config).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }
}
