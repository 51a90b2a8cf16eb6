//! # Telemetry Line Protocol
//!
//! Parsing and classification for the armor sensor's line-oriented
//! protocol: one ASCII line per frame, five comma-separated integers,
//! newline-terminated:
//!
//! ```text
//! <colorCode>,<hitCount>,<txRssi>,<rxRssi>,<airLatencyMs>
//! ```

use crate::error::{HudError, Result};

/// Wire code for the red side (0xFF0000).
pub const COLOR_CODE_RED: i64 = 0xFF0000;

/// Wire code for the blue side (0x0000FF).
pub const COLOR_CODE_BLUE: i64 = 0x0000FF;

/// Expected field count per telemetry line.
pub const FRAME_FIELDS: usize = 5;

/// Match-assigned team side of the connected armor sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    /// Decode the wire color code. Any value other than the two known
    /// codes means the device has no side assigned yet.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            COLOR_CODE_RED => Some(Color::Red),
            COLOR_CODE_BLUE => Some(Color::Blue),
            _ => None,
        }
    }

    /// Topic segment used when publishing this client's status.
    pub fn topic_name(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
        }
    }
}

/// Device connectivity, derived from the link lifecycle and the latest
/// air-latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    /// No serial port open.
    #[default]
    Disconnected,
    /// Serial open, but the wireless hop is stale (latency above threshold).
    NoAir,
    /// Serial open and the latest air sample is fresh.
    AirOk,
}

/// One successfully parsed telemetry line, before smoothing and
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub color: Option<Color>,
    pub hit_count: u32,
    pub tx_rssi: i32,
    pub rx_rssi: i32,
    pub air_latency_ms: u32,
}

/// Parse one telemetry line into a [`RawFrame`].
///
/// A field count other than five, a field that is not an integer, or an
/// integer outside its field's range is a malformed frame: the caller logs
/// it and discards the line without touching the connection or the current
/// telemetry.
pub fn parse_line(line: &str) -> Result<RawFrame> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FRAME_FIELDS {
        return Err(HudError::MalformedFrame(format!(
            "expected {} fields, got {}: {:?}",
            FRAME_FIELDS,
            fields.len(),
            line
        )));
    }

    let int = |index: usize| -> Result<i64> {
        fields[index].trim().parse::<i64>().map_err(|e| {
            HudError::MalformedFrame(format!("field {}: {} ({:?})", index, e, fields[index]))
        })
    };
    // Counters and latencies are non-negative on the wire; a negative value
    // is corruption, never wrapped into a huge count.
    fn ranged<T: TryFrom<i64>>(index: usize, value: i64) -> Result<T> {
        T::try_from(value)
            .map_err(|_| HudError::MalformedFrame(format!("field {} out of range: {}", index, value)))
    }

    Ok(RawFrame {
        color: Color::from_code(int(0)?),
        hit_count: ranged(1, int(1)?)?,
        tx_rssi: ranged(2, int(2)?)?,
        rx_rssi: ranged(3, int(3)?)?,
        air_latency_ms: ranged(4, int(4)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_red_line() {
        let frame = parse_line("16711680,7,-60,-62,40").unwrap();
        assert_eq!(frame.color, Some(Color::Red));
        assert_eq!(frame.hit_count, 7);
        assert_eq!(frame.tx_rssi, -60);
        assert_eq!(frame.rx_rssi, -62);
        assert_eq!(frame.air_latency_ms, 40);
    }

    #[test]
    fn test_parse_valid_blue_line() {
        let frame = parse_line("255,0,-55,-58,12\n").unwrap();
        assert_eq!(frame.color, Some(Color::Blue));
        assert_eq!(frame.hit_count, 0);
    }

    #[test]
    fn test_unknown_color_code_is_unassigned() {
        let frame = parse_line("0,3,-60,-60,10").unwrap();
        assert_eq!(frame.color, None);
        let frame = parse_line("65280,3,-60,-60,10").unwrap(); // green
        assert_eq!(frame.color, None);
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        assert!(matches!(
            parse_line("255,0,-55,-58"),
            Err(HudError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_line("255,0,-55,-58,12,99"),
            Err(HudError::MalformedFrame(_))
        ));
        assert!(matches!(parse_line(""), Err(HudError::MalformedFrame(_))));
    }

    #[test]
    fn test_non_integer_field_is_malformed() {
        assert!(matches!(
            parse_line("255,zero,-55,-58,12"),
            Err(HudError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_line("255,0,-55,-58,12.5"),
            Err(HudError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_out_of_range_field_is_malformed() {
        // A negative counter must not wrap into a huge unsigned value
        assert!(matches!(
            parse_line("255,-1,-55,-58,12"),
            Err(HudError::MalformedFrame(_))
        ));
        // Negative air latency must not wrap and classify as stale
        assert!(matches!(
            parse_line("255,0,-55,-58,-5"),
            Err(HudError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_line("255,4294967296,-55,-58,12"),
            Err(HudError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_whitespace_tolerant_fields() {
        let frame = parse_line(" 16711680, 7, -60, -62, 40 \r\n").unwrap();
        assert_eq!(frame.color, Some(Color::Red));
        assert_eq!(frame.air_latency_ms, 40);
    }

    #[test]
    fn test_color_topic_names() {
        assert_eq!(Color::Red.topic_name(), "red");
        assert_eq!(Color::Blue.topic_name(), "blue");
    }

    #[test]
    fn test_color_codes() {
        assert_eq!(COLOR_CODE_RED, 16711680);
        assert_eq!(COLOR_CODE_BLUE, 255);
        assert_eq!(Color::from_code(16711680), Some(Color::Red));
        assert_eq!(Color::from_code(255), Some(Color::Blue));
        assert_eq!(Color::from_code(-1), None);
    }
}
