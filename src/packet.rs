//! # Outbound Packet Encoder
//!
//! Encodes a normalized control intent into the fixed 10-byte device
//! command packet.
//!
//! The receiving firmware expects this packet at a periodic refresh rate,
//! not edge-triggered, so the encoder is a pure mapping with no state and
//! no failure modes: all inputs are pre-validated by the caller.
//!
//! ## Packet layout (little-endian)
//!
//! | Offset | Bytes | Meaning |
//! |--------|-------|-------------------------------------|
//! | 0-1    | 2     | X-axis velocity, signed 16-bit      |
//! | 2-3    | 2     | Y-axis velocity, signed 16-bit      |
//! | 4-5    | 2     | Wheel velocity, signed 16-bit       |
//! | 6      | 1     | Left-button flag (0/1)              |
//! | 7      | 1     | Right-button flag (0/1)             |
//! | 8      | 1     | Key-state bitmask                   |
//! | 9      | 1     | Constant `0x01` frame marker        |

/// Outbound packet size in bytes.
pub const PACKET_LEN: usize = 10;

/// Constant trailing frame marker.
pub const PACKET_MARKER: u8 = 0x01;

/// Key-state bitmask positions (byte 8).
pub const KEY_W: u8 = 1 << 0;
pub const KEY_S: u8 = 1 << 1;
pub const KEY_A: u8 = 1 << 2;
pub const KEY_D: u8 = 1 << 3;
pub const KEY_Q: u8 = 1 << 4;
pub const KEY_E: u8 = 1 << 5;
pub const KEY_SHIFT: u8 = 1 << 6;
pub const KEY_CTRL: u8 = 1 << 7;

/// Maximum magnitude for each velocity axis. Values at the limit map to
/// i16 full scale; values beyond it saturate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    pub max_x: f64,
    pub max_y: f64,
    pub max_wheel: f64,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            max_x: 32768.0,
            max_y: 32768.0,
            max_wheel: 32768.0,
        }
    }
}

/// Normalized control intent: three signed velocity magnitudes, two button
/// flags, and an 8-bit key-state mask.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlIntent {
    /// X-axis velocity (units per second, caller-defined).
    pub vx: f64,
    /// Y-axis velocity.
    pub vy: f64,
    /// Wheel velocity.
    pub wheel: f64,
    /// Left button pressed.
    pub left: bool,
    /// Right button pressed.
    pub right: bool,
    /// Key-state mask, see the `KEY_*` constants.
    pub keys: u8,
}

/// Map a velocity onto the signed 16-bit range, saturating at the limits.
///
/// A magnitude exactly at `max` maps to `32767`; anything beyond saturates
/// (clamped, never wrapped).
fn map_to_i16(value: f64, max: f64) -> i16 {
    if value > max {
        return i16::MAX;
    }
    if value < -max {
        return i16::MIN;
    }
    (value / max * f64::from(i16::MAX)).round() as i16
}

/// Encode a control intent into the 10-byte device packet.
///
/// # Examples
///
/// ```
/// use arena_hud::packet::{encode_packet, AxisLimits, ControlIntent};
///
/// let packet = encode_packet(&ControlIntent::default(), &AxisLimits::default());
/// assert_eq!(packet.len(), 10);
/// assert_eq!(packet[9], 0x01);
/// ```
pub fn encode_packet(intent: &ControlIntent, limits: &AxisLimits) -> [u8; PACKET_LEN] {
    let x = map_to_i16(intent.vx, limits.max_x).to_le_bytes();
    let y = map_to_i16(intent.vy, limits.max_y).to_le_bytes();
    let w = map_to_i16(intent.wheel, limits.max_wheel).to_le_bytes();

    [
        x[0],
        x[1],
        y[0],
        y[1],
        w[0],
        w[1],
        intent.left as u8,
        intent.right as u8,
        intent.keys,
        PACKET_MARKER,
    ]
}
