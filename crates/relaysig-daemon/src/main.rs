//! relaysig: run one signaling session from the command line.
//!
//! Events are written to stdout as JSON lines; commands are read from stdin
//! (see `command`). Logs go to stderr.
//!
//!   RELAYSIG_TOKEN=... relaysig --server relay.example.com
//!   echo '{"type":"disconnect"}' | relaysig --config ./relaysig.toml

mod command;
mod config;

use anyhow::Context;
use clap::Parser;
use command::Flow;
use relaysig_client::{SignalEvent, SignalingClient};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relaysig", version, about = "Resilient signaling session over a relay")]
struct Cli {
    /// TOML config file (default: ~/.config/relaysig/config.toml, then /etc/relaysig/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay server, host[:port]
    #[arg(long, env = "RELAYSIG_SERVER")]
    server: Option<String>,

    /// Previously observed signaling URL; wins over --server
    #[arg(long, env = "RELAYSIG_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Session token
    #[arg(long, env = "RELAYSIG_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relaysig=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = config::load(cli.config.as_deref())?;
    let config = file.into_client_config(config::Overrides {
        server: cli.server,
        signaling_url: cli.signaling_url,
        session_token: cli.token,
    })?;

    let client = SignalingClient::new(config);
    let (subscription, mut events) = client.events().subscribe_channel();
    tracing::info!("starting session as {}", client.identity());

    // A failed first attempt is already reported as events and retried.
    if let Err(e) = client.connect().await {
        tracing::warn!("initial connect failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                emit(&event)?;
                if let SignalEvent::Error { fatal: true, .. } = event {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        if command::handle_line(&client, &line) == Flow::Exit {
                            break;
                        }
                    }
                    None => stdin_open = false,
                }
            }
            res = &mut shutdown => {
                res.context("waiting for ctrl-c")?;
                tracing::info!("interrupted");
                break;
            }
        }
    }

    client.disconnect();
    // Flush what the disconnect produced.
    while let Ok(event) = events.try_recv() {
        emit(&event)?;
    }
    subscription.unsubscribe();
    Ok(())
}

fn emit(event: &SignalEvent) -> anyhow::Result<()> {
    let line = serde_json::to_string(event)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}").context("writing event to stdout")?;
    out.flush()?;
    Ok(())
}
