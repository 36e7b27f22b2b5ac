//! Sign-in endpoint resolution.
//!
//! The server the caller was told to use may not be the one terminating TLS.
//! When a previously observed signaling URL is available it wins; otherwise
//! the configured server address is used. A missing port means 443.

use serde::{Deserialize, Serialize};
use url::Url;

/// Port assumed when neither source names one.
pub const DEFAULT_PORT: u16 = 443;

/// Sign-in path on the relay.
pub const DEFAULT_PATH: &str = "nvst/sign_in";

/// Protocol version advertised in the query string.
const PROTOCOL_VERSION: &str = "2";

/// Where to connect and what to put in the `Host` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Full `wss://` sign-in URL, query included.
    pub url: String,
    /// `host:port`, always with an explicit port.
    pub host: String,
}

/// The configured server address is not a usable host.
#[derive(Debug, thiserror::Error)]
#[error("unusable server address {address:?}: {source}")]
pub struct AddressError {
    /// The address as configured.
    pub address: String,
    pub source: url::ParseError,
}

/// Resolve the connection URL and host header.
///
/// A signaling URL that is empty or unparsable degrades to the configured
/// server. Only a server address that is itself unusable is an error.
pub fn resolve(
    server: &str,
    signaling_url: Option<&str>,
    path: &str,
    peer_name: &str,
) -> Result<Endpoint, AddressError> {
    let authority = match signaling_url.and_then(|raw| authority(raw).ok()) {
        Some(found) => found,
        None => authority(server).map_err(|source| AddressError {
            address: server.to_string(),
            source,
        })?,
    };

    let mut url = Url::parse(&format!("wss://{authority}/")).map_err(|source| AddressError {
        address: authority.clone(),
        source,
    })?;
    url.set_path(path.trim_start_matches('/'));
    url.query_pairs_mut()
        .append_pair("peer_id", peer_name)
        .append_pair("version", PROTOCOL_VERSION);

    Ok(Endpoint {
        url: url.to_string(),
        host: authority,
    })
}

/// `host:port` named by a URL or a bare `host[:port]` address.
fn authority(raw: &str) -> Result<String, url::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(url::ParseError::EmptyHost);
    }
    // Bare addresses get a scheme so the same parser handles ports and IPv6.
    let url = if raw.contains("://") {
        Url::parse(raw)?
    } else {
        Url::parse(&format!("wss://{raw}"))?
    };
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Err(url::ParseError::EmptyHost),
    };
    // `port()` hides a scheme's default port; 443 is the default either way.
    Ok(format!("{host}:{}", url.port().unwrap_or(DEFAULT_PORT)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_url_wins() {
        let ep = resolve(
            "relay.example.com",
            Some("wss://relay.example.com:8443/nvst/sign_in"),
            DEFAULT_PATH,
            "peer-42",
        )
        .unwrap();
        assert_eq!(ep.host, "relay.example.com:8443");
        assert_eq!(
            ep.url,
            "wss://relay.example.com:8443/nvst/sign_in?peer_id=peer-42&version=2"
        );
    }

    #[test]
    fn server_fallback_defaults_port() {
        let ep = resolve("relay.example.com", None, DEFAULT_PATH, "peer-1").unwrap();
        assert_eq!(ep.host, "relay.example.com:443");
        assert_eq!(
            ep.url,
            "wss://relay.example.com/nvst/sign_in?peer_id=peer-1&version=2"
        );
    }

    #[test]
    fn signaling_url_without_port() {
        let ep = resolve(
            "other.example.com:9000",
            Some("rtsps://edge.example.com/"),
            DEFAULT_PATH,
            "p",
        )
        .unwrap();
        assert_eq!(ep.host, "edge.example.com:443");

        let ep = resolve("x", Some("rtsps://edge.example.com:48322"), DEFAULT_PATH, "p").unwrap();
        assert_eq!(ep.host, "edge.example.com:48322");
    }

    #[test]
    fn unusable_signaling_url_falls_back() {
        let ep = resolve("relay.example.com:9000", Some("wss://"), DEFAULT_PATH, "p").unwrap();
        assert_eq!(ep.host, "relay.example.com:9000");
        let ep = resolve("relay.example.com", Some(""), DEFAULT_PATH, "p").unwrap();
        assert_eq!(ep.host, "relay.example.com:443");
        let ep = resolve("relay.example.com", Some("wss://bad host/"), DEFAULT_PATH, "p").unwrap();
        assert_eq!(ep.host, "relay.example.com:443");
    }

    #[test]
    fn bare_signaling_host() {
        let ep = resolve("x", Some("edge.example.com:1234/path?q=1"), DEFAULT_PATH, "p").unwrap();
        assert_eq!(ep.host, "edge.example.com:1234");
    }

    #[test]
    fn ipv6_literals() {
        assert_eq!(resolve("[::1]", None, DEFAULT_PATH, "p").unwrap().host, "[::1]:443");
        assert_eq!(
            resolve("[::1]:8443", None, DEFAULT_PATH, "p").unwrap().host,
            "[::1]:8443"
        );
    }

    #[test]
    fn peer_name_is_query_encoded() {
        let ep = resolve("relay.example.com", None, DEFAULT_PATH, "peer 1&x=y").unwrap();
        assert_eq!(
            ep.url,
            "wss://relay.example.com/nvst/sign_in?peer_id=peer+1%26x%3Dy&version=2"
        );
    }

    #[test]
    fn unusable_server_is_an_error() {
        let err = resolve("", None, DEFAULT_PATH, "p").unwrap_err();
        assert_eq!(err.address, "");
        assert!(resolve("bad host", None, DEFAULT_PATH, "p").is_err());
    }
}
