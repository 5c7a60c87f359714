//! Typed values and the codec trait.
//!
//! Every characteristic payload crossing the bus boundary is decoded
//! into (or encoded from) a [`Value`] by the codec resolved for its
//! UUID. Codecs are stateless; the registry hands them out as shared
//! trait objects.

pub mod scalar;

pub use scalar::{
    Float32, HexDigits, HexDump, PercentUint8, ScaledInterval32, Sint8, Timestamp64, Uint32,
    Uint64, Uint8, Utf8String,
};

use bytes::Bytes;

use crate::data::Measurement;
use crate::error::{Error, Result};
use crate::protocol::meter_frame::MeterMeasurement;

/// A decoded characteristic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The device omitted the value entirely on this read.
    ///
    /// Only produced by the 1-byte codecs for a zero-length payload; a
    /// documented protocol convention, not error suppression.
    Absent,
    /// A signed integer.
    Signed(i64),
    /// An unsigned integer.
    Unsigned(u64),
    /// A floating-point quantity (scaled timestamps, intervals, ratios).
    Float(f64),
    /// Text: UTF-8 strings, hex digests, hex dumps.
    Text(String),
    /// One live humidity/temperature reading.
    Reading(Measurement),
    /// A run of indexed historical measurements from a log download.
    Batch(Vec<Measurement>),
    /// One decoded multimeter frame.
    Meter(MeterMeasurement),
}

impl Value {
    /// Numeric projection of integer and float variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Signed(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The text payload, for `Text` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Binary encode/decode rules for one characteristic type.
///
/// `encode` is optional; read-only codecs keep the default, which fails
/// with [`Error::UnsupportedOperation`].
pub trait Codec {
    /// Short codec name used in error reports.
    fn name(&self) -> &'static str;

    /// Decode a raw payload into a typed value.
    fn decode(&self, raw: &[u8]) -> Result<Value>;

    /// Encode a typed value into the raw wire form.
    fn encode(&self, value: &Value) -> Result<Bytes> {
        let _ = value;
        Err(Error::UnsupportedOperation {
            codec: self.name(),
            operation: "encode",
        })
    }
}
