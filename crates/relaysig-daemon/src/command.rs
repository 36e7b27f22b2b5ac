//! Commands accepted on stdin, one JSON object per line.

use relaysig_client::{Connector, SignalingClient};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// `{"type":"answer","sdp":"...","nvstSdp":"..."}`
    Answer {
        sdp: String,
        #[serde(rename = "nvstSdp", default)]
        nvst_sdp: Option<String>,
    },
    /// `{"type":"candidate","candidate":"...","sdpMid":"0","sdpMLineIndex":0}`
    Candidate {
        candidate: String,
        #[serde(rename = "sdpMid", default)]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex", default)]
        sdp_m_line_index: Option<u32>,
    },
    /// Close the session and exit.
    Disconnect,
}

impl Command {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// What the main loop should do after a command ran.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Run one command line against `client`. Failures are logged, never fatal.
pub fn handle_line<C: Connector>(client: &SignalingClient<C>, line: &str) -> Flow {
    let line = line.trim();
    if line.is_empty() {
        return Flow::Continue;
    }
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("ignoring command: {}", e);
            return Flow::Continue;
        }
    };

    let sent = match command {
        Command::Answer { sdp, nvst_sdp } => client.send_answer(&sdp, nvst_sdp.as_deref()),
        Command::Candidate {
            candidate,
            sdp_mid,
            sdp_m_line_index,
        } => client.send_ice_candidate(&candidate, sdp_mid.as_deref(), sdp_m_line_index),
        Command::Disconnect => {
            client.disconnect();
            return Flow::Exit;
        }
    };
    match sent {
        Ok(ackid) => tracing::debug!("queued with ackid {}", ackid),
        Err(e) => tracing::warn!("send failed: {}", e),
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaysig_client::ClientConfig;

    #[test]
    fn parses_answer() {
        let c = Command::parse(r#"{"type":"answer","sdp":"v=0","nvstSdp":"a=x"}"#).unwrap();
        assert_eq!(
            c,
            Command::Answer {
                sdp: "v=0".into(),
                nvst_sdp: Some("a=x".into())
            }
        );
        let c = Command::parse(r#"{"type":"answer","sdp":"v=0"}"#).unwrap();
        assert!(matches!(c, Command::Answer { nvst_sdp: None, .. }));
    }

    #[test]
    fn parses_candidate() {
        let c = Command::parse(
            r#"{"type":"candidate","candidate":"candidate:1","sdpMid":"0","sdpMLineIndex":0}"#,
        )
        .unwrap();
        assert_eq!(
            c,
            Command::Candidate {
                candidate: "candidate:1".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }
        );
    }

    #[test]
    fn parses_disconnect_and_rejects_unknown() {
        assert_eq!(Command::parse(r#"{"type":"disconnect"}"#).unwrap(), Command::Disconnect);
        assert!(Command::parse(r#"{"type":"reboot"}"#).is_err());
        assert!(Command::parse("answer").is_err());
    }

    #[tokio::test]
    async fn handle_line_without_connection() {
        let client = SignalingClient::new(ClientConfig::new("relay.example.com", "tok"));
        assert_eq!(handle_line(&client, ""), Flow::Continue);
        assert_eq!(handle_line(&client, "garbage"), Flow::Continue);
        assert_eq!(
            handle_line(&client, r#"{"type":"answer","sdp":"v=0"}"#),
            Flow::Continue
        );
        assert_eq!(handle_line(&client, r#"{"type":"disconnect"}"#), Flow::Exit);
    }
}
