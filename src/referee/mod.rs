//! # Referee Link Module
//!
//! Owns the MQTT session toward the referee system.
//!
//! This module handles:
//! - Connecting to the configured broker with bounded retry
//! - Subscribing to the referee broadcast topic and decoding its JSON
//! - Publishing this client's status on a color-scoped topic at a bounded
//!   rate
//! - Measuring inbound message frequency over a sliding window, which
//!   doubles as the staleness path: a silent broker degrades the stored
//!   message back to its all-absent default
//!
//! The worker task is the sole writer of the stored [`RefereeMessage`],
//! with one deliberate exception: [`RefereeLink::frequency`] resets the
//! message to default when the freshness window empties, so staleness
//! propagates to readers without a dedicated timer.

pub mod message;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::device::frame::Color;
use crate::error::{HudError, Result};
use message::{ClientStatus, RefereeMessage};

/// Topic carrying the referee broadcast.
pub const REFEREE_TOPIC: &str = "/referee";

/// Default MQTT port when the broker URL does not name one.
const DEFAULT_BROKER_PORT: u16 = 1883;

/// State shared between the worker task and the handle.
struct Shared {
    message_tx: watch::Sender<RefereeMessage>,
    arrivals: Mutex<VecDeque<Instant>>,
    freshness: Duration,
}

impl Shared {
    /// Record one inbound broadcast arrival and prune the window so
    /// timestamps never accumulate unboundedly.
    fn record_arrival(&self) {
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.push_back(Instant::now());
        Self::prune(&mut arrivals, self.freshness);
    }

    fn prune(arrivals: &mut VecDeque<Instant>, freshness: Duration) {
        let now = Instant::now();
        while arrivals
            .front()
            .is_some_and(|at| now.duration_since(*at) > freshness)
        {
            arrivals.pop_front();
        }
    }

    /// Messages per freshness window, or `None` when the broker is silent.
    /// Silence also reverts the stored message to its default.
    fn frequency(&self) -> Option<usize> {
        let mut arrivals = self.arrivals.lock().unwrap();
        Self::prune(&mut arrivals, self.freshness);
        if arrivals.is_empty() {
            self.message_tx.send_replace(RefereeMessage::default());
            None
        } else {
            Some(arrivals.len())
        }
    }

    /// Session teardown: forget the inbound message and the window.
    fn reset(&self) {
        self.message_tx.send_replace(RefereeMessage::default());
        self.arrivals.lock().unwrap().clear();
    }
}

/// Handle to the referee-link worker task.
pub struct RefereeLink {
    shared: Arc<Shared>,
    message_rx: watch::Receiver<RefereeMessage>,
    url_tx: watch::Sender<Option<String>>,
    color_tx: watch::Sender<Option<Color>>,
    status_tx: watch::Sender<ClientStatus>,
}

impl RefereeLink {
    /// Spawn the connection worker and return its handle.
    pub fn spawn(config: BrokerConfig) -> Self {
        let (message_tx, message_rx) = watch::channel(RefereeMessage::default());
        let (url_tx, url_rx) = watch::channel(None);
        let (color_tx, color_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());

        let shared = Arc::new(Shared {
            message_tx,
            arrivals: Mutex::new(VecDeque::new()),
            freshness: Duration::from_millis(config.freshness_ms),
        });

        tokio::spawn(run_worker(
            config,
            Arc::clone(&shared),
            url_rx,
            color_rx,
            status_rx,
        ));

        Self {
            shared,
            message_rx,
            url_tx,
            color_tx,
            status_tx,
        }
    }

    /// Point the link at a broker (e.g. `mqtt://127.0.0.1:1883`).
    ///
    /// No-op if unchanged; otherwise the current session tears down, the
    /// stored message and frequency window clear, and the worker retries
    /// against the new target.
    pub fn set_broker_url(&self, url: Option<String>) {
        self.url_tx.send_if_modified(|current| {
            if *current == url {
                false
            } else {
                info!("broker url changed: {:?} -> {:?}", current, url);
                *current = url;
                true
            }
        });
    }

    /// Route the outbound status topic by current color. Publishing idles
    /// while no color is assigned.
    pub fn set_color(&self, color: Option<Color>) {
        self.color_tx.send_replace(color);
    }

    /// Replace the status payload published at the next cadence tick.
    pub fn set_status(&self, status: ClientStatus) {
        self.status_tx.send_replace(status);
    }

    /// Copy of the latest referee broadcast (or the default when stale).
    pub fn message(&self) -> RefereeMessage {
        self.message_rx.borrow().clone()
    }

    /// Inbound broadcasts during the last freshness window, or `None` when
    /// the broker is silent. Reading this is what degrades a stale stored
    /// message back to absent.
    pub fn frequency(&self) -> Option<usize> {
        self.shared.frequency()
    }
}

/// Why a broker session ended.
enum SessionEnd {
    /// The broker URL was reconfigured; reconnect immediately.
    Reconfigured,
    /// The session faulted; back off before reconnecting.
    Fault,
}

/// Status publish period for a configured rate. A zero rate (possible when
/// a [`BrokerConfig`] is built by hand, skipping validation) is treated as
/// 1 Hz rather than dividing by zero.
fn publish_period(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(hz.max(1)))
}

/// Build client options from a broker URL of the form
/// `mqtt://host[:port]` (the scheme is optional).
fn broker_options(url: &str, config: &BrokerConfig) -> Result<MqttOptions> {
    let trimmed = url.strip_prefix("mqtt://").unwrap_or(url);
    let (host, port) = match trimmed.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|e| HudError::Broker(format!("bad broker port in {:?}: {}", url, e)))?,
        ),
        None => (trimmed, DEFAULT_BROKER_PORT),
    };
    if host.is_empty() {
        return Err(HudError::Broker(format!("bad broker url: {:?}", url)));
    }

    let mut options = MqttOptions::new(&config.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(5));
    Ok(options)
}

/// Handle one inbound publish: decode failures are logged and dropped,
/// never fatal to the session.
fn handle_publish(shared: &Shared, topic: &str, payload: &[u8]) {
    if topic != REFEREE_TOPIC {
        debug!("ignoring publish on {:?}", topic);
        return;
    }
    match serde_json::from_slice::<RefereeMessage>(payload) {
        Ok(msg) => {
            debug!(?msg, "referee broadcast");
            shared.message_tx.send_replace(msg);
            shared.record_arrival();
        }
        Err(e) => warn!("referee message decode failed: {}", e),
    }
}

/// Connection loop: idle until a broker is configured, then run sessions
/// until they fault, backing off a fixed interval between attempts.
async fn run_worker(
    config: BrokerConfig,
    shared: Arc<Shared>,
    mut url_rx: watch::Receiver<Option<String>>,
    color_rx: watch::Receiver<Option<Color>>,
    status_rx: watch::Receiver<ClientStatus>,
) {
    info!("referee link worker started");
    let retry = Duration::from_millis(config.retry_interval_ms);

    loop {
        let url = url_rx.borrow_and_update().clone();
        let Some(url) = url else {
            tokio::select! {
                _ = url_rx.changed() => {}
                _ = tokio::time::sleep(retry) => {}
            }
            continue;
        };

        let end = match broker_options(&url, &config) {
            Ok(options) => {
                run_session(&config, &shared, options, &mut url_rx, &color_rx, &status_rx).await
            }
            Err(e) => {
                warn!("{}", e);
                SessionEnd::Fault
            }
        };

        shared.reset();
        if let SessionEnd::Fault = end {
            tokio::select! {
                _ = url_rx.changed() => {}
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }
}

/// One broker session: drive the event loop, decode inbound broadcasts,
/// and publish status at the configured cadence, until something fails or
/// the URL changes.
async fn run_session(
    config: &BrokerConfig,
    shared: &Shared,
    options: MqttOptions,
    url_rx: &mut watch::Receiver<Option<String>>,
    color_rx: &watch::Receiver<Option<Color>>,
    status_rx: &watch::Receiver<ClientStatus>,
) -> SessionEnd {
    let (client, mut event_loop) = AsyncClient::new(options, 16);
    if let Err(e) = client.subscribe(REFEREE_TOPIC, QoS::AtLeastOnce).await {
        warn!("broker subscribe failed: {}", e);
        return SessionEnd::Fault;
    }

    let mut publish_tick = tokio::time::interval(publish_period(config.publish_hz));
    publish_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = url_rx.changed() => {
                info!("broker reconfigured, closing session");
                return SessionEnd::Reconfigured;
            }

            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("broker connected");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_publish(shared, &publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("broker session failed: {}", e);
                    return SessionEnd::Fault;
                }
            },

            _ = publish_tick.tick() => {
                // Publishing idles until the device reports a color; the
                // topic is scoped by side
                let Some(color) = *color_rx.borrow() else { continue };
                let payload = match serde_json::to_vec(&*status_rx.borrow()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("status serialize failed: {}", e);
                        continue;
                    }
                };
                let topic = format!("/{}", color.topic_name());
                if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
                    warn!("status publish failed: {}", e);
                    return SessionEnd::Fault;
                }
            }
        }
    }
}
