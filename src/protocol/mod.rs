//! Device frame decoders.
//!
//! This module contains the implementations for:
//! - the multimeter's 6-byte bitpacked measurement frame
//! - the humidity/temperature logger's float-array frames

pub mod gadget_frame;
pub mod meter_frame;

pub use gadget_frame::{GadgetAttribute, HumidityFrame, TemperatureFrame};
pub use meter_frame::{MeterFlags, MeterFrame, MeterMeasurement, MeterMode};
