//! # Arena HUD Library
//!
//! Spectator HUD core for small combat-robot matches.
//!
//! Two asynchronous, individually lossy sources, a wireless armor sensor
//! over a serial link ([`device`]) and the referee system over MQTT
//! ([`referee`]), are reconciled by [`reconcile::MatchState`] into one
//! consistent view of the robot's health, connectivity, and match events,
//! consumed by an external fixed-rate renderer.

pub mod config;
pub mod device;
pub mod error;
pub mod packet;
pub mod reconcile;
pub mod referee;
pub mod watch;
