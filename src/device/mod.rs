//! # Device Link Module
//!
//! Owns the serial connection to the wireless armor sensor.
//!
//! This module handles:
//! - Opening the configured serial endpoint with bounded retry
//! - Reading the line-oriented telemetry protocol (see [`frame`])
//! - Smoothing RSSI through [`filter::SignalFilter`]
//! - Writing the outbound 10-byte command packet at a bounded rate
//! - Deriving connectivity classification from the air-latency sample
//!
//! The worker task is the sole writer of the [`TelemetrySnapshot`]; every
//! other component reads it through [`DeviceLink::snapshot`]. Endpoint
//! changes and outbound packet bytes reach the worker over `watch`
//! channels, and the worker `select!`s on the endpoint channel so a
//! reconfiguration unblocks a pending read.

pub mod filter;
pub mod frame;

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

use crate::config::SerialConfig;
use crate::error::{HudError, Result};
use crate::packet::PACKET_LEN;
use filter::SignalFilter;
use frame::{Color, LinkStatus, RawFrame};

/// Latest complete view of the armor sensor, published whole by the worker.
///
/// Superseded by the next parsed frame; cleared to all-absent on link reset
/// or air timeout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub color: Option<Color>,
    pub hit_count: Option<u32>,
    pub tx_rssi: Option<f64>,
    pub rx_rssi: Option<f64>,
    pub air_latency_ms: Option<u32>,
    pub status: LinkStatus,
}

/// Handle to the device-link worker task.
///
/// The worker runs until the runtime shuts down.
#[derive(Debug)]
pub struct DeviceLink {
    snapshot_rx: watch::Receiver<TelemetrySnapshot>,
    endpoint_tx: watch::Sender<Option<String>>,
    packet_tx: watch::Sender<[u8; PACKET_LEN]>,
}

impl DeviceLink {
    /// Spawn the connection worker and return its handle.
    pub fn spawn(config: SerialConfig) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(TelemetrySnapshot::default());
        let (endpoint_tx, endpoint_rx) = watch::channel(None);
        let (packet_tx, packet_rx) = watch::channel([0u8; PACKET_LEN]);

        tokio::spawn(run_worker(config, snapshot_tx, endpoint_rx, packet_rx));

        Self {
            snapshot_rx,
            endpoint_tx,
            packet_tx,
        }
    }

    /// Point the link at a serial endpoint (e.g. `/dev/ttyUSB0`).
    ///
    /// No-op if unchanged. Otherwise the open connection is forced closed,
    /// telemetry clears to absent, and the worker retries against the new
    /// target. Safe to call at any time from any task.
    pub fn set_endpoint(&self, endpoint: Option<String>) {
        self.endpoint_tx.send_if_modified(|current| {
            if *current == endpoint {
                false
            } else {
                info!("serial endpoint changed: {:?} -> {:?}", current, endpoint);
                *current = endpoint;
                true
            }
        });
    }

    /// Replace the outbound command packet. The worker re-sends the current
    /// packet at its own cadence whether or not it changed.
    pub fn set_packet(&self, packet: [u8; PACKET_LEN]) {
        self.packet_tx.send_replace(packet);
    }

    /// Copy of the latest telemetry snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.snapshot_rx.borrow()
    }
}

/// Open a serial endpoint with the configured baud rate.
fn open_endpoint(endpoint: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    tokio_serial::new(endpoint, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| HudError::Serial(format!("failed to open {}: {}", endpoint, e)))
}

/// Connection loop: idle until an endpoint is configured, open it with
/// bounded retry, then run the read/write session until it faults.
async fn run_worker(
    config: SerialConfig,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    mut endpoint_rx: watch::Receiver<Option<String>>,
    packet_rx: watch::Receiver<[u8; PACKET_LEN]>,
) {
    info!("device link worker started");
    let retry = Duration::from_millis(config.retry_interval_ms);

    loop {
        let endpoint = endpoint_rx.borrow_and_update().clone();
        let Some(endpoint) = endpoint else {
            tokio::select! {
                _ = endpoint_rx.changed() => {}
                _ = tokio::time::sleep(retry) => {}
            }
            continue;
        };

        let stream = match open_endpoint(&endpoint, config.baud_rate) {
            Ok(stream) => stream,
            Err(e) => {
                info!("{}", e);
                tokio::select! {
                    _ = endpoint_rx.changed() => {}
                    _ = tokio::time::sleep(retry) => {}
                }
                continue;
            }
        };
        info!("serial endpoint open: {}", endpoint);

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        run_session(
            &config,
            &mut reader,
            &mut write_half,
            &snapshot_tx,
            &mut endpoint_rx,
            &packet_rx,
        )
        .await;

        // Session faulted or was cancelled: drop the port and publish the
        // disconnected default before reconnecting.
        snapshot_tx.send_replace(TelemetrySnapshot::default());
    }
}

/// One open-connection session: alternate one read step and one write step
/// per iteration until an error, EOF, or endpoint change ends it.
///
/// Generic over the transport so tests can drive it with in-memory pipes.
async fn run_session<R, W>(
    config: &SerialConfig,
    reader: &mut R,
    writer: &mut W,
    snapshot_tx: &watch::Sender<TelemetrySnapshot>,
    endpoint_rx: &mut watch::Receiver<Option<String>>,
    packet_rx: &watch::Receiver<[u8; PACKET_LEN]>,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tx_filter = SignalFilter::new();
    let mut rx_filter = SignalFilter::new();
    let mut last_send: Option<Instant> = None;
    let send_spacing = Duration::from_millis(config.send_interval_ms);
    let mut line = Vec::new();

    loop {
        // Read step: one newline-terminated line, cancellable by an
        // endpoint change. Reads are never starved by writes; the write
        // cadence degrades under slow reads.
        line.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut line) => read,
            _ = endpoint_rx.changed() => {
                info!("serial endpoint reconfigured, closing session");
                return;
            }
        };
        match read {
            Ok(0) => {
                warn!("serial endpoint returned EOF");
                return;
            }
            Ok(_) => match std::str::from_utf8(&line) {
                Ok(text) => match frame::parse_line(text) {
                    Ok(raw) => {
                        apply_frame(config, raw, &mut tx_filter, &mut rx_filter, snapshot_tx)
                    }
                    // Malformed line: discard, telemetry unchanged.
                    Err(e) => warn!("{}", e),
                },
                Err(e) => warn!("serial line is not valid text: {}", e),
            },
            Err(e) => {
                error!("serial read failed: {}", e);
                return;
            }
        }

        // Write step: re-send the current packet, at most once per spacing
        // interval. The firmware expects periodic refresh, so the packet
        // goes out even when unchanged.
        let due = last_send.map_or(true, |at| at.elapsed() >= send_spacing);
        if due {
            let packet = *packet_rx.borrow();
            if let Err(e) = writer.write_all(&packet).await {
                error!("serial write failed: {}", e);
                return;
            }
            if let Err(e) = writer.flush().await {
                error!("serial flush failed: {}", e);
                return;
            }
            debug!("sent command packet ({} bytes)", packet.len());
            last_send = Some(Instant::now());
        }
    }
}

/// Fold one parsed frame into the published snapshot.
///
/// A fresh air sample populates the full frame and classifies the link as
/// `AirOk`. A stale sample means the wireless hop is down even though the
/// serial side still delivers: the value fields degrade to absent, the
/// filters re-arm, and the link classifies as `NoAir`.
fn apply_frame(
    config: &SerialConfig,
    raw: RawFrame,
    tx_filter: &mut SignalFilter,
    rx_filter: &mut SignalFilter,
    snapshot_tx: &watch::Sender<TelemetrySnapshot>,
) {
    let snapshot = if u64::from(raw.air_latency_ms) <= config.air_timeout_ms {
        TelemetrySnapshot {
            color: raw.color,
            hit_count: Some(raw.hit_count),
            tx_rssi: tx_filter.apply(Some(f64::from(raw.tx_rssi))),
            rx_rssi: rx_filter.apply(Some(f64::from(raw.rx_rssi))),
            air_latency_ms: Some(raw.air_latency_ms),
            status: LinkStatus::AirOk,
        }
    } else {
        tx_filter.reset();
        rx_filter.reset();
        TelemetrySnapshot {
            status: LinkStatus::NoAir,
            ..Default::default()
        }
    };
    debug!(?snapshot, "telemetry frame");
    snapshot_tx.send_replace(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn test_config() -> SerialConfig {
        SerialConfig {
            baud_rate: 115_200,
            retry_interval_ms: 100,
            send_interval_ms: 10,
            air_timeout_ms: 100,
        }
    }

    struct SessionHarness {
        snapshot_tx: watch::Sender<TelemetrySnapshot>,
        endpoint_tx: watch::Sender<Option<String>>,
        endpoint_rx: watch::Receiver<Option<String>>,
        packet_rx: watch::Receiver<[u8; PACKET_LEN]>,
        _packet_tx: watch::Sender<[u8; PACKET_LEN]>,
    }

    impl SessionHarness {
        fn new(packet: [u8; PACKET_LEN]) -> Self {
            let (snapshot_tx, _) = watch::channel(TelemetrySnapshot::default());
            let (endpoint_tx, endpoint_rx) = watch::channel(Some("test".to_string()));
            let (packet_tx, packet_rx) = watch::channel(packet);
            Self {
                snapshot_tx,
                endpoint_tx,
                endpoint_rx,
                packet_rx,
                _packet_tx: packet_tx,
            }
        }

        fn snapshot(&self) -> TelemetrySnapshot {
            *self.snapshot_tx.subscribe().borrow()
        }
    }

    #[tokio::test]
    async fn test_session_parses_frame_and_ends_on_eof() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        let mut harness = SessionHarness::new([0xAB; PACKET_LEN]);

        client
            .write_all(b"16711680,7,-60,-62,40\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        run_session(
            &test_config(),
            &mut reader,
            &mut write_half,
            &harness.snapshot_tx,
            &mut harness.endpoint_rx,
            &harness.packet_rx,
        )
        .await;

        let snap = harness.snapshot();
        assert_eq!(snap.color, Some(Color::Red));
        assert_eq!(snap.hit_count, Some(7));
        assert_eq!(snap.tx_rssi, Some(-60.0));
        assert_eq!(snap.status, LinkStatus::AirOk);

        // The write step ran once: the current packet went out verbatim
        let mut sent = [0u8; PACKET_LEN];
        client.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, [0xAB; PACKET_LEN]);
    }

    #[tokio::test]
    async fn test_malformed_line_leaves_telemetry_unchanged() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        let mut harness = SessionHarness::new([0u8; PACKET_LEN]);

        client
            .write_all(b"255,3,-55,-58,20\nnot,a,frame\n\xFF\xFE\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        run_session(
            &test_config(),
            &mut reader,
            &mut write_half,
            &harness.snapshot_tx,
            &mut harness.endpoint_rx,
            &harness.packet_rx,
        )
        .await;

        // Neither the malformed line nor the undecodable bytes touched the
        // snapshot from the valid frame before them
        let snap = harness.snapshot();
        assert_eq!(snap.color, Some(Color::Blue));
        assert_eq!(snap.hit_count, Some(3));
        assert_eq!(snap.status, LinkStatus::AirOk);
    }

    #[tokio::test]
    async fn test_stale_air_latency_degrades_to_no_air() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        let mut harness = SessionHarness::new([0u8; PACKET_LEN]);

        client
            .write_all(b"16711680,7,-60,-62,40\n16711680,7,-60,-62,250\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        run_session(
            &test_config(),
            &mut reader,
            &mut write_half,
            &harness.snapshot_tx,
            &mut harness.endpoint_rx,
            &harness.packet_rx,
        )
        .await;

        let snap = harness.snapshot();
        assert_eq!(snap.status, LinkStatus::NoAir);
        assert_eq!(snap.color, None);
        assert_eq!(snap.hit_count, None);
        assert_eq!(snap.tx_rssi, None);
    }

    #[tokio::test]
    async fn test_endpoint_change_cancels_blocked_read() {
        let (client, server) = tokio::io::duplex(1024);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        let mut harness = SessionHarness::new([0u8; PACKET_LEN]);

        let config = test_config();
        let session = run_session(
            &config,
            &mut reader,
            &mut write_half,
            &harness.snapshot_tx,
            &mut harness.endpoint_rx,
            &harness.packet_rx,
        );

        let endpoint_tx = &harness.endpoint_tx;
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            endpoint_tx.send_replace(Some("other".to_string()));
        };

        // The session must return promptly once the endpoint changes, even
        // though no line ever arrives
        tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(session, cancel);
        })
        .await
        .expect("session did not unblock on endpoint change");

        drop(client);
    }

    #[tokio::test]
    async fn test_write_step_is_rate_limited() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        let mut harness = SessionHarness::new([0x55; PACKET_LEN]);

        // Many lines in one burst, far faster than the 10ms send spacing
        let mut input = Vec::new();
        for _ in 0..20 {
            input.extend_from_slice(b"255,1,-55,-58,20\n");
        }
        client.write_all(&input).await.unwrap();
        client.shutdown().await.unwrap();

        run_session(
            &test_config(),
            &mut reader,
            &mut write_half,
            &harness.snapshot_tx,
            &mut harness.endpoint_rx,
            &harness.packet_rx,
        )
        .await;
        // Drop both server halves so the client side reads EOF
        drop(write_half);
        drop(reader);

        let mut sent = Vec::new();
        client.read_to_end(&mut sent).await.unwrap();
        // One immediate send, and the burst completes well inside one
        // spacing interval, so at most a couple of packets went out
        assert!(!sent.is_empty());
        assert_eq!(sent.len() % PACKET_LEN, 0);
        assert!(sent.len() / PACKET_LEN < 20);
    }

    #[tokio::test]
    async fn test_set_endpoint_is_noop_when_unchanged() {
        let link = DeviceLink::spawn(test_config());
        link.set_endpoint(Some("/dev/ttyHUD0".to_string()));
        let mut rx = link.endpoint_tx.subscribe();
        rx.borrow_and_update();
        link.set_endpoint(Some("/dev/ttyHUD0".to_string()));
        assert!(!rx.has_changed().unwrap());
        link.set_endpoint(Some("/dev/ttyHUD1".to_string()));
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_spawned_link_starts_disconnected() {
        let link = DeviceLink::spawn(test_config());
        let snap = link.snapshot();
        assert_eq!(snap.status, LinkStatus::Disconnected);
        assert_eq!(snap.color, None);
        assert_eq!(snap.hit_count, None);
    }
}
