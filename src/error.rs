//! Error types for the gatt-sensors crate.

use crate::bus::ObjectPath;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A bus call failed. Never retried automatically; the caller decides.
    #[error("bus transport error: {context}")]
    Transport {
        /// Description of the failed call.
        context: String,
    },

    /// A payload could not be decoded: wrong length, invalid UTF-8,
    /// reserved-bit violation or out-of-range enumerant.
    #[error("decode error: {context}")]
    Decode {
        /// Description of what was malformed.
        context: String,
    },

    /// The value handed to `encode` is not one the codec accepts.
    #[error("cannot encode with {codec} codec: {context}")]
    Encode {
        /// Name of the codec that rejected the value.
        codec: &'static str,
        /// Description of the mismatch.
        context: String,
    },

    /// The codec does not implement the requested direction.
    #[error("codec {codec} does not support {operation}")]
    UnsupportedOperation {
        /// Name of the codec.
        codec: &'static str,
        /// The missing operation, e.g. "encode".
        operation: &'static str,
    },

    /// A second notification handler was registered on a characteristic
    /// that already has one.
    #[error("characteristic {uuid} already has a notification handler")]
    AlreadySubscribed {
        /// UUID of the characteristic.
        uuid: Uuid,
    },

    /// Device assembly found a required characteristic role missing.
    ///
    /// The affected device is excluded from discovery results; this is
    /// not a global failure.
    #[error("device {device} is missing required characteristic role '{role}'")]
    MissingRole {
        /// Path of the incomplete device.
        device: ObjectPath,
        /// The role that was not found.
        role: &'static str,
    },

    /// An object-property lookup missed during characteristic resolution.
    #[error("property {property} not found on {path} ({interface})")]
    PropertyNotFound {
        /// Path of the object that was queried.
        path: ObjectPath,
        /// Interface the property belongs to.
        interface: &'static str,
        /// Name of the missing property.
        property: &'static str,
    },

    /// The device's log time base moved between download passes.
    ///
    /// The pass is aborted and the accumulated history left untouched;
    /// the caller may retry.
    #[error("device time base shifted between passes: {field} was {previous}, now {current}")]
    TimeBaseShifted {
        /// Which boundary moved ("min_time" or "max_time").
        field: &'static str,
        /// The value seen on the previous pass.
        previous: f64,
        /// The value read this pass.
        current: f64,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
