//! # Referee Wire Types
//!
//! JSON payloads exchanged with the referee system over MQTT.
//!
//! The broadcast on `/referee` is authoritative match state. The
//! `yellow_card_ms` and `reset_hp_ms` fields are opaque monotone tokens: a
//! *change* in value signals "event occurred", their magnitude means
//! nothing to this client.

use serde::{Deserialize, Serialize};

use crate::device::frame::Color;

/// Per-side information inside the referee broadcast.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hp: Option<i64>,
    #[serde(default)]
    pub yellow_card_ms: Option<i64>,
    #[serde(default)]
    pub reset_hp_ms: Option<i64>,
}

/// One referee broadcast message.
///
/// Reverts to the all-absent [`Default`] when the broker has been silent
/// past the freshness window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefereeMessage {
    #[serde(default)]
    pub countdown: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub txt: Option<String>,
    #[serde(default)]
    pub red: TeamInfo,
    #[serde(default)]
    pub blue: TeamInfo,
}

impl RefereeMessage {
    /// The [`TeamInfo`] for the given side.
    pub fn side(&self, color: Color) -> &TeamInfo {
        match color {
            Color::Red => &self.red,
            Color::Blue => &self.blue,
        }
    }
}

/// This client's own status, published on `/red` or `/blue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub hp: i32,
    pub com_is_connected: bool,
    pub video_fps: Option<u32>,
    pub tx_rssi: Option<f64>,
    pub rx_rssi: Option<f64>,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            hp: 100,
            com_is_connected: false,
            video_fps: None,
            tx_rssi: None,
            rx_rssi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_referee_message() {
        let json = r#"{
            "countdown": 178000,
            "state": "running",
            "txt": "FIGHT",
            "red": {"name": "Crusher", "hp": 87, "yellow_card_ms": 120034, "reset_hp_ms": null},
            "blue": {"name": "Saw", "hp": 100, "yellow_card_ms": null, "reset_hp_ms": 4000}
        }"#;
        let msg: RefereeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.countdown, Some(178_000));
        assert_eq!(msg.red.hp, Some(87));
        assert_eq!(msg.red.yellow_card_ms, Some(120_034));
        assert_eq!(msg.blue.reset_hp_ms, Some(4000));
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let msg: RefereeMessage = serde_json::from_str(r#"{"red": {"hp": 50}}"#).unwrap();
        assert_eq!(msg.red.hp, Some(50));
        assert_eq!(msg.red.yellow_card_ms, None);
        assert_eq!(msg.blue, TeamInfo::default());
        assert_eq!(msg.countdown, None);
    }

    #[test]
    fn test_default_message_is_all_absent() {
        let msg = RefereeMessage::default();
        assert_eq!(msg.countdown, None);
        assert_eq!(msg.state, None);
        assert_eq!(msg.red.reset_hp_ms, None);
        assert_eq!(msg.blue.yellow_card_ms, None);
    }

    #[test]
    fn test_side_lookup() {
        let msg = RefereeMessage {
            red: TeamInfo {
                hp: Some(1),
                ..Default::default()
            },
            blue: TeamInfo {
                hp: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(msg.side(Color::Red).hp, Some(1));
        assert_eq!(msg.side(Color::Blue).hp, Some(2));
    }

    #[test]
    fn test_client_status_wire_names() {
        let status = ClientStatus {
            hp: 93,
            com_is_connected: true,
            video_fps: Some(30),
            tx_rssi: Some(-60.5),
            rx_rssi: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["hp"], 93);
        assert_eq!(json["com_is_connected"], true);
        assert_eq!(json["video_fps"], 30);
        assert_eq!(json["tx_rssi"], -60.5);
        assert!(json["rx_rssi"].is_null());
    }
}
