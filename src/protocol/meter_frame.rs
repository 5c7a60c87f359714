//! Multimeter measurement frame parsing.
//!
//! The meter notifies a 6-byte frame for every display update. Fields
//! are bitpacked; every reserved bit is validated on decode, since a
//! violation means the firmware speaks a different protocol revision
//! and the numbers cannot be trusted.

use crate::codec::{Codec, Value};
use crate::error::{Error, Result};

/// The measurement function selected on the meter's dial.
///
/// Raw values 0-12; anything else is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeterMode {
    /// DC voltage.
    VoltsDc = 0,
    /// AC voltage.
    VoltsAc = 1,
    /// DC current.
    AmpsDc = 2,
    /// AC current.
    AmpsAc = 3,
    /// Resistance.
    Ohms = 4,
    /// Capacitance.
    Farads = 5,
    /// Frequency.
    Hertz = 6,
    /// Duty cycle.
    Percent = 7,
    /// Temperature, Celsius probe.
    Celsius = 8,
    /// Temperature, Fahrenheit probe.
    Fahrenheit = 9,
    /// Diode test voltage.
    Diode = 10,
    /// Continuity beeper resistance.
    Continuity = 11,
    /// Transistor gain.
    TransistorHfe = 12,
}

impl MeterMode {
    /// Map a raw mode number to a mode, `None` when out of range.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => MeterMode::VoltsDc,
            1 => MeterMode::VoltsAc,
            2 => MeterMode::AmpsDc,
            3 => MeterMode::AmpsAc,
            4 => MeterMode::Ohms,
            5 => MeterMode::Farads,
            6 => MeterMode::Hertz,
            7 => MeterMode::Percent,
            8 => MeterMode::Celsius,
            9 => MeterMode::Fahrenheit,
            10 => MeterMode::Diode,
            11 => MeterMode::Continuity,
            12 => MeterMode::TransistorHfe,
            _ => return None,
        })
    }

    /// Display unit name for this mode.
    pub fn unit(&self) -> &'static str {
        match self {
            MeterMode::VoltsDc => "Volts DC",
            MeterMode::VoltsAc => "Volts AC",
            MeterMode::AmpsDc => "Amps DC",
            MeterMode::AmpsAc => "Amps AC",
            MeterMode::Ohms => "Ohms",
            MeterMode::Farads => "Farads",
            MeterMode::Hertz => "Hz",
            MeterMode::Percent => "%",
            MeterMode::Celsius => "Celsius",
            MeterMode::Fahrenheit => "Fahrenheit",
            MeterMode::Diode => "Volts (diode)",
            MeterMode::Continuity => "Ohms (continuity)",
            MeterMode::TransistorHfe => "hFE",
        }
    }
}

/// Status flags from the meter's display annunciators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterFlags {
    /// HOLD is active.
    pub hold: bool,
    /// Relative (delta) mode is active.
    pub delta: bool,
    /// Auto-ranging is active.
    pub auto_range: bool,
    /// The meter battery is low.
    pub battery_low: bool,
    /// MIN capture is shown.
    pub min: bool,
    /// MAX capture is shown.
    pub max: bool,
}

/// One decoded multimeter frame. Immutable once decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterMeasurement {
    /// Selected measurement function.
    pub mode: MeterMode,
    /// SI exponent class, 1-6 (nano through mega). 0 and 7 are reserved.
    pub scale1: u8,
    /// Decimal-point position, 0-3, or 7 for an overloaded display.
    pub scale2: u8,
    /// Display annunciator flags.
    pub flags: MeterFlags,
    /// Signed display count before any scaling.
    pub raw_value: i32,
}

impl MeterMeasurement {
    /// Exact frame size; anything else fails to decode.
    pub const FRAME_LEN: usize = 6;

    /// Parse a 6-byte notification frame.
    ///
    /// Frame layout:
    /// - Byte 0: bits 6-7: mode low bits; bits 3-5: SI scale; bits 0-2: decimal scale
    /// - Byte 1: bits 0-1: mode high bits; bits 2-7 must read as the 0xF0 marker
    /// - Byte 2: annunciator flags (bit 0 hold, 1 delta, 2 auto-range,
    ///   3 battery-low, 4 min, 5 max); bits 6-7 reserved, must be zero
    /// - Byte 3: reserved, must be zero
    /// - Bytes 4-5: display count, little-endian; bit 6 of byte 5 reserved,
    ///   bit 7 of byte 5 is the sign
    ///
    /// Every gate is hard: a reserved-bit violation or out-of-range field
    /// fails the whole decode rather than producing a partial frame.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != Self::FRAME_LEN {
            return Err(Error::Decode {
                context: format!(
                    "meter frame: expected {} bytes, got {}",
                    Self::FRAME_LEN,
                    raw.len()
                ),
            });
        }

        let mode_raw = (raw[0] & 0xC0) >> 6 | (raw[1] & 0x03) << 2;
        let mode = MeterMode::from_raw(mode_raw).ok_or_else(|| Error::Decode {
            context: format!("meter frame: mode {mode_raw} out of range"),
        })?;

        let scale1 = (raw[0] & 0x38) >> 3;
        if scale1 == 0 || scale1 == 7 {
            return Err(Error::Decode {
                context: format!("meter frame: reserved SI scale {scale1}"),
            });
        }

        let scale2 = raw[0] & 0x07;
        if (4..=6).contains(&scale2) {
            return Err(Error::Decode {
                context: format!("meter frame: reserved decimal scale {scale2}"),
            });
        }

        if raw[1] & 0xFC != 0xF0 {
            return Err(Error::Decode {
                context: format!("meter frame: bad mode marker {:#04x}", raw[1]),
            });
        }

        if raw[2] & 0xC0 != 0 {
            return Err(Error::Decode {
                context: format!("meter frame: reserved flag bits set in {:#04x}", raw[2]),
            });
        }
        let flags = MeterFlags {
            hold: raw[2] & 0x01 != 0,
            delta: raw[2] & 0x02 != 0,
            auto_range: raw[2] & 0x04 != 0,
            battery_low: raw[2] & 0x08 != 0,
            min: raw[2] & 0x10 != 0,
            max: raw[2] & 0x20 != 0,
        };

        if raw[3] != 0 {
            return Err(Error::Decode {
                context: format!("meter frame: reserved byte 3 is {:#04x}", raw[3]),
            });
        }

        if raw[5] & 0x40 != 0 {
            return Err(Error::Decode {
                context: "meter frame: reserved bit 6 set in byte 5".to_string(),
            });
        }
        let mut raw_value = i32::from(raw[4]) | i32::from(raw[5] & 0x3F) << 8;
        if raw[5] & 0x80 != 0 {
            raw_value = -raw_value;
        }

        Ok(Self {
            mode,
            scale1,
            scale2,
            flags,
            raw_value,
        })
    }

    /// Multiplier for the decimal-point position. NaN when the display
    /// is overloaded (scale 7).
    pub fn decimal_adjust(&self) -> f64 {
        match self.scale2 {
            0 => 1.0,
            1 => 0.1,
            2 => 0.01,
            3 => 0.001,
            _ => f64::NAN,
        }
    }

    /// Multiplier for the SI exponent class.
    pub fn si_adjust(&self) -> f64 {
        match self.scale1 {
            1 => 1e-9,
            2 => 1e-6,
            3 => 1e-3,
            4 => 1.0,
            5 => 1e3,
            6 => 1e6,
            _ => f64::NAN,
        }
    }

    /// The displayed quantity in base units. NaN for an overloaded
    /// display.
    pub fn value(&self) -> f64 {
        self.raw_value as f64 * self.decimal_adjust() * self.si_adjust()
    }

    /// Display unit name for the selected mode.
    pub fn unit(&self) -> &'static str {
        self.mode.unit()
    }
}

impl std::fmt::Display for MeterMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value(), self.unit())
    }
}

/// Registry codec for the meter's measurement characteristic.
///
/// Notify-only on the device, so decode-only here.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeterFrame;

impl Codec for MeterFrame {
    fn name(&self) -> &'static str {
        "MeterFrame"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        Ok(Value::Meter(MeterMeasurement::parse(raw)?))
    }
}
