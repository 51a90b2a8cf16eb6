//! # Arena HUD
//!
//! Spectator HUD core for small combat-robot matches.
//!
//! Reads live telemetry from a wireless armor sensor over a serial link,
//! authoritative match state from the referee system over MQTT, and
//! reconciles both into monotonic health and one-shot match events. The
//! renderer (external to this core) drives the reconciliation tick; this
//! binary stands in for it with a fixed 100 Hz loop and logs derived state.

use anyhow::Result;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use arena_hud::config::Config;
use arena_hud::device::frame::LinkStatus;
use arena_hud::device::DeviceLink;
use arena_hud::packet::{encode_packet, AxisLimits, ControlIntent};
use arena_hud::reconcile::MatchState;
use arena_hud::referee::message::ClientStatus;
use arena_hud::referee::RefereeLink;

/// Reconciliation tick rate (nominal; correctness only needs "frequent").
const TICK_RATE_HZ: u64 = 100;

/// Number of ticks between status log messages (~10 seconds at 100 Hz)
const LOG_INTERVAL_TICKS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Arena HUD v{} starting...", env!("CARGO_PKG_VERSION"));

    // Usage: arena-hud [serial_endpoint] [broker_url] [config.toml]
    let mut args = std::env::args().skip(1);
    let endpoint = args.next();
    let broker_url = args.next();
    let config = match args.next() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let limits = AxisLimits {
        max_x: config.input.max_axis_x,
        max_y: config.input.max_axis_y,
        max_wheel: config.input.max_wheel,
    };

    let device = DeviceLink::spawn(config.serial.clone());
    let referee = RefereeLink::spawn(config.broker.clone());
    device.set_endpoint(endpoint);
    referee.set_broker_url(broker_url);

    let mut state = MatchState::new();
    let mut tick = interval(Duration::from_millis(1000 / TICK_RATE_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick_count: u64 = 0;

    info!("reconciliation loop running at {}Hz", TICK_RATE_HZ);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let frame = device.snapshot();
                // Reading the frequency is what degrades a stale referee
                // message back to absent
                let referee_freq = referee.frequency();
                let message = referee.message();

                let events = state.tick(&frame, &message);
                if events.hit {
                    info!("hit registered, hp now {}", state.hp());
                }
                if events.hp_reset {
                    info!("referee reset hp to {}", state.hp());
                }
                if events.yellow_card {
                    info!("yellow card, hp now {}", state.hp());
                }

                // Republish derived state toward both links. The control
                // intent would come from the renderer's input sampler; a
                // neutral packet keeps the firmware refresh alive here.
                referee.set_color(state.color());
                referee.set_status(ClientStatus {
                    hp: state.hp(),
                    com_is_connected: frame.status != LinkStatus::Disconnected,
                    video_fps: None,
                    tx_rssi: frame.tx_rssi,
                    rx_rssi: frame.rx_rssi,
                });
                device.set_packet(encode_packet(&ControlIntent::default(), &limits));

                tick_count += 1;
                if tick_count % LOG_INTERVAL_TICKS == 0 {
                    debug!(
                        "tick {}: hp={} color={:?} link={:?} referee_freq={:?}",
                        tick_count,
                        state.hp(),
                        state.color(),
                        frame.status,
                        referee_freq,
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    Ok(())
}
