//! Fixed-width scalar codecs and their scaled derivatives.
//!
//! All multi-byte integers and floats are little-endian on the wire.

use bytes::Bytes;

use crate::codec::{Codec, Value};
use crate::error::{Error, Result};

fn check_len(codec: &'static str, raw: &[u8], want: usize) -> Result<()> {
    if raw.len() != want {
        return Err(Error::Decode {
            context: format!("{codec}: expected {want} bytes, got {}", raw.len()),
        });
    }
    Ok(())
}

fn numeric(codec: &'static str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| Error::Encode {
        codec,
        context: format!("expected a numeric value, got {value:?}"),
    })
}

/// Two's-complement signed byte.
///
/// A zero-length payload decodes to [`Value::Absent`]: some devices omit
/// the value entirely on reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sint8;

impl Codec for Sint8 {
    fn name(&self) -> &'static str {
        "Sint8"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        if raw.is_empty() {
            return Ok(Value::Absent);
        }
        check_len(self.name(), raw, 1)?;
        Ok(Value::Signed(i64::from(raw[0] as i8)))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::Signed(v) if i8::try_from(*v).is_ok() => {
                Ok(Bytes::copy_from_slice(&(*v as i8).to_le_bytes()))
            }
            _ => Err(Error::Encode {
                codec: self.name(),
                context: format!("expected a signed value in i8 range, got {value:?}"),
            }),
        }
    }
}

/// Unsigned byte. Zero-length payloads decode to [`Value::Absent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Uint8;

impl Codec for Uint8 {
    fn name(&self) -> &'static str {
        "Uint8"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        if raw.is_empty() {
            return Ok(Value::Absent);
        }
        check_len(self.name(), raw, 1)?;
        Ok(Value::Unsigned(u64::from(raw[0])))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::Unsigned(v) if u8::try_from(*v).is_ok() => {
                Ok(Bytes::copy_from_slice(&[*v as u8]))
            }
            _ => Err(Error::Encode {
                codec: self.name(),
                context: format!("expected an unsigned value in u8 range, got {value:?}"),
            }),
        }
    }
}

/// Little-endian unsigned 32-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uint32;

impl Codec for Uint32 {
    fn name(&self) -> &'static str {
        "Uint32"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        check_len(self.name(), raw, 4)?;
        let v = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(Value::Unsigned(u64::from(v)))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::Unsigned(v) if u32::try_from(*v).is_ok() => {
                Ok(Bytes::copy_from_slice(&(*v as u32).to_le_bytes()))
            }
            _ => Err(Error::Encode {
                codec: self.name(),
                context: format!("expected an unsigned value in u32 range, got {value:?}"),
            }),
        }
    }
}

/// Little-endian unsigned 64-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uint64;

impl Codec for Uint64 {
    fn name(&self) -> &'static str {
        "Uint64"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        check_len(self.name(), raw, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(Value::Unsigned(u64::from_le_bytes(bytes)))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::Unsigned(v) => Ok(Bytes::copy_from_slice(&v.to_le_bytes())),
            _ => Err(Error::Encode {
                codec: self.name(),
                context: format!("expected an unsigned value, got {value:?}"),
            }),
        }
    }
}

/// Little-endian IEEE-754 single-precision float.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float32;

impl Codec for Float32 {
    fn name(&self) -> &'static str {
        "Float32"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        check_len(self.name(), raw, 4)?;
        let v = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(Value::Float(f64::from(v)))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        let v = numeric(self.name(), value)?;
        Ok(Bytes::copy_from_slice(&(v as f32).to_le_bytes()))
    }
}

/// UTF-8 string of the whole payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8String;

impl Codec for Utf8String {
    fn name(&self) -> &'static str {
        "Utf8String"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        let s = std::str::from_utf8(raw).map_err(|e| Error::Decode {
            context: format!("{}: invalid UTF-8: {e}", self.name()),
        })?;
        Ok(Value::Text(s.to_owned()))
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            _ => Err(Error::Encode {
                codec: self.name(),
                context: format!("expected a text value, got {value:?}"),
            }),
        }
    }
}

/// Hex digits of the payload bytes in reverse order, no separators.
///
/// Used for digests like the System ID, which the device stores
/// least-significant byte first. Read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexDigits;

impl Codec for HexDigits {
    fn name(&self) -> &'static str {
        "HexDigits"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        let mut s = String::with_capacity(raw.len() * 2);
        for byte in raw.iter().rev() {
            s.push_str(&format!("{byte:02x}"));
        }
        Ok(Value::Text(s))
    }
}

/// Two-column diagnostic dump: comma-joined hex pairs, then a
/// printable-ASCII projection with non-printable bytes as spaces.
///
/// The fallback codec for unknown UUIDs, so unknown data is always at
/// least visible. Read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexDump;

impl Codec for HexDump {
    fn name(&self) -> &'static str {
        "HexDump"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        let mut hex = String::with_capacity(raw.len() * 3);
        let mut ascii = String::with_capacity(raw.len());
        for byte in raw {
            hex.push_str(&format!("{byte:02x},"));
            if (0x20..0x7e).contains(byte) {
                ascii.push(char::from(*byte));
            } else {
                ascii.push(' ');
            }
        }
        Ok(Value::Text(format!("{hex} {ascii}")))
    }
}

/// Percentage stored as an integer 0-100, decoded to a 0.0-1.0 ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentUint8;

impl Codec for PercentUint8 {
    fn name(&self) -> &'static str {
        "PercentUint8"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        match Uint8.decode(raw)? {
            Value::Absent => Ok(Value::Absent),
            Value::Unsigned(v) => Ok(Value::Float(v as f64 / 100.0)),
            other => unreachable!("Uint8 decoded to {other:?}"),
        }
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        let ratio = numeric(self.name(), value)?;
        let scaled = (ratio * 100.0).round();
        if !(0.0..=255.0).contains(&scaled) {
            return Err(Error::Encode {
                codec: self.name(),
                context: format!("ratio {ratio} out of range"),
            });
        }
        Uint8.encode(&Value::Unsigned(scaled as u64))
    }
}

/// 64-bit sub-second timestamp decoded to epoch seconds.
///
/// The wire unit is milliseconds or microseconds depending on the
/// characteristic; construct with [`Timestamp64::millis`] or
/// [`Timestamp64::micros`].
#[derive(Debug, Clone, Copy)]
pub struct Timestamp64 {
    scale: f64,
}

impl Timestamp64 {
    /// Wire unit of milliseconds.
    pub const fn millis() -> Self {
        Self { scale: 1e3 }
    }

    /// Wire unit of microseconds.
    pub const fn micros() -> Self {
        Self { scale: 1e6 }
    }
}

impl Codec for Timestamp64 {
    fn name(&self) -> &'static str {
        "Timestamp64"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        match Uint64.decode(raw)? {
            Value::Unsigned(v) => Ok(Value::Float(v as f64 / self.scale)),
            other => unreachable!("Uint64 decoded to {other:?}"),
        }
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        let seconds = numeric(self.name(), value)?;
        let scaled = (seconds * self.scale).round();
        if scaled < 0.0 {
            return Err(Error::Encode {
                codec: self.name(),
                context: format!("timestamp {seconds} is before the epoch"),
            });
        }
        Uint64.encode(&Value::Unsigned(scaled as u64))
    }
}

/// Logging interval stored as milliseconds in a u32, decoded to seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaledInterval32;

impl Codec for ScaledInterval32 {
    fn name(&self) -> &'static str {
        "ScaledInterval32"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        match Uint32.decode(raw)? {
            Value::Unsigned(v) => Ok(Value::Float(v as f64 / 1e3)),
            other => unreachable!("Uint32 decoded to {other:?}"),
        }
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        let seconds = numeric(self.name(), value)?;
        let scaled = (seconds * 1e3).round();
        if !(0.0..=u32::MAX as f64).contains(&scaled) {
            return Err(Error::Encode {
                codec: self.name(),
                context: format!("interval {seconds}s does not fit a u32 of milliseconds"),
            });
        }
        Uint32.encode(&Value::Unsigned(scaled as u64))
    }
}
