//! Humidity/temperature logger frame parsing.
//!
//! The logger's humidity and temperature characteristics share one wire
//! format with two shapes, disambiguated by length:
//!
//! - 4 bytes: a single live float32 reading
//! - 8 bytes or more: a history run - a u32 starting log index followed
//!   by consecutive float32 samples
//!
//! Each characteristic carries only its own attribute; records are
//! completed later by merging the two streams.

use crate::codec::{Codec, Value};
use crate::data::Measurement;
use crate::error::{Error, Result};

/// Which attribute a gadget characteristic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GadgetAttribute {
    /// Relative humidity.
    Humidity,
    /// Temperature.
    Temperature,
}

impl GadgetAttribute {
    fn measurement(&self, value: f32) -> Measurement {
        match self {
            GadgetAttribute::Humidity => Measurement::with_humidity(value),
            GadgetAttribute::Temperature => Measurement::with_temperature(value),
        }
    }
}

/// Parse one frame for the given attribute.
///
/// A 4-byte payload yields a single [`Value::Reading`] with no index.
/// Longer payloads yield a [`Value::Batch`]: the first 4 bytes are the
/// little-endian starting index, the rest are consumed in 4-byte float
/// groups with the index incrementing per sample; trailing bytes that
/// do not fill a group are discarded.
pub fn parse(attribute: GadgetAttribute, raw: &[u8]) -> Result<Value> {
    if raw.len() == 4 {
        let value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        return Ok(Value::Reading(attribute.measurement(value)));
    }

    if raw.len() < 4 {
        return Err(Error::Decode {
            context: format!("gadget frame: {} bytes is too short", raw.len()),
        });
    }

    let mut index = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let mut batch = Vec::with_capacity((raw.len() - 4) / 4);
    for group in raw[4..].chunks_exact(4) {
        let value = f32::from_le_bytes([group[0], group[1], group[2], group[3]]);
        let mut m = attribute.measurement(value);
        m.index = Some(index);
        batch.push(m);
        index = index.wrapping_add(1);
    }
    Ok(Value::Batch(batch))
}

/// Registry codec for the humidity characteristic. Notify/read only.
#[derive(Debug, Clone, Copy, Default)]
pub struct HumidityFrame;

impl Codec for HumidityFrame {
    fn name(&self) -> &'static str {
        "HumidityFrame"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        parse(GadgetAttribute::Humidity, raw)
    }
}

/// Registry codec for the temperature characteristic. Notify/read only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemperatureFrame;

impl Codec for TemperatureFrame {
    fn name(&self) -> &'static str {
        "TemperatureFrame"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        parse(GadgetAttribute::Temperature, raw)
    }
}
