//! Domain data types decoded from device payloads.

pub mod measurement;

pub use measurement::Measurement;
