//! Application heartbeat and transport ping timers.
//!
//! Both timers only ever push onto the connection's outbound queue; once
//! the connection task is gone the queue is closed and the push is a no-op.
//! A zero interval disables that timer.

use crate::transport::{Outbound, OutboundTx};
use relaysig_core::Envelope;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Default)]
pub(crate) struct Liveness {
    tasks: Vec<JoinHandle<()>>,
}

impl Liveness {
    /// Start both timers, replacing any that are running.
    pub(crate) fn start(&mut self, outbound: &OutboundTx, heartbeat: Duration, ping: Duration) {
        self.stop();
        if !heartbeat.is_zero() {
            self.tasks.push(tokio::spawn(heartbeat_loop(outbound.clone(), heartbeat)));
        }
        if !ping.is_zero() {
            self.tasks.push(tokio::spawn(ping_loop(outbound.clone(), ping)));
        }
    }

    pub(crate) fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn heartbeat_loop(outbound: OutboundTx, period: Duration) {
    let frame = match Envelope::heartbeat().to_json() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("heartbeat frame could not be encoded: {}", e);
            return;
        }
    };
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        tracing::trace!("sending heartbeat");
        if outbound
            .send(Outbound::Frame(Message::Text(frame.clone().into())))
            .is_err()
        {
            return;
        }
    }
}

async fn ping_loop(outbound: OutboundTx, period: Duration) {
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        tracing::trace!("sending transport ping");
        if outbound
            .send(Outbound::Frame(Message::Ping(Vec::new().into())))
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_every_five_ping_every_fifteen() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut liveness = Liveness::default();
        let start = Instant::now();
        liveness.start(&tx, Duration::from_millis(5000), Duration::from_millis(15000));

        let mut seen = Vec::new();
        while seen.len() < 4 {
            match rx.recv().await {
                Some(Outbound::Frame(Message::Text(t))) => {
                    assert_eq!(t.as_str(), r#"{"hb":1}"#);
                    seen.push(("hb", start.elapsed().as_millis()));
                }
                Some(Outbound::Frame(Message::Ping(_))) => {
                    seen.push(("ping", start.elapsed().as_millis()));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(&seen[..2], &[("hb", 5000), ("hb", 10000)]);
        assert!(seen[2..].contains(&("hb", 15000)));
        assert!(seen[2..].contains(&("ping", 15000)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_both_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut liveness = Liveness::default();
        liveness.start(&tx, Duration::from_secs(5), Duration::from_secs(15));
        assert!(liveness.is_running());
        liveness.stop();
        assert!(!liveness.is_running());

        time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut liveness = Liveness::default();
        liveness.start(&tx, Duration::ZERO, Duration::from_secs(15));

        let frame = rx.recv().await;
        assert!(matches!(frame, Some(Outbound::Frame(Message::Ping(_)))));
    }
}
