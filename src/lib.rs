// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # gatt-sensors
//!
//! A device-integration layer for BLE GATT sensors exposed through a
//! BlueZ-style object bus: a hygrometer/thermometer logger (Sensirion
//! SmartGadget) and an OWON-style BLE multimeter.
//!
//! The crate is built around three pieces:
//!
//! - **Codec registry**: maps characteristic UUIDs to semantic names,
//!   categories and typed codecs, with a hex-dump fallback so unknown
//!   data always renders legibly
//! - **Characteristics**: typed handles over live GATT characteristics
//!   with reads, writes, caching and notification subscription
//! - **Device drivers**: role-based discovery that assembles typed
//!   device structs, live-reading callbacks and the logger's bulk
//!   history download
//!
//! Everything runs on a single thread; the [`Bus`] and [`Scheduler`]
//! traits are the seams where a real event loop and bus connection
//! plug in.
//!
//! ## Quick Start
//!
//! ```rust
//! use gatt_sensors::{Registry, Value};
//!
//! // Compose a registry from the device tables.
//! let registry = Registry::builder()
//!     .register(gatt_sensors::devices::sensirion::gatt_entries())
//!     .register(gatt_sensors::devices::owon::gatt_entries())
//!     .build();
//!
//! // Resolve a UUID and decode a payload through its codec.
//! let entry = registry.resolve(&gatt_sensors::devices::sensirion::HUMIDITY_UUID);
//! assert_eq!(entry.name, "Humidity");
//!
//! let value = entry.codec.decode(&45.5f32.to_le_bytes()).unwrap();
//! match value {
//!     Value::Reading(reading) => assert_eq!(reading.humidity, Some(45.5)),
//!     other => panic!("unexpected value {other:?}"),
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

pub mod bus;
pub mod characteristic;
pub mod codec;
pub mod data;
pub mod devices;
pub mod discovery;
pub mod download;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use bus::{Bus, ObjectPath, PropertyCache};
pub use characteristic::Characteristic;
pub use codec::{Codec, Value};
pub use data::Measurement;
pub use devices::{Multimeter, SmartGadget};
pub use discovery::{discover_devices, DiscoveredDevice};
pub use download::{DownloadProgress, DownloadSession, History, SessionState};
pub use error::{Error, Result};
pub use protocol::{MeterFlags, MeterMeasurement, MeterMode};
pub use registry::{Category, CodecEntry, Registry};
pub use scheduler::{Clock, Scheduler, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Registry>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Measurement>();
        let _ = std::any::TypeId::of::<MeterMeasurement>();
        let _ = std::any::TypeId::of::<DownloadSession>();
        let _ = std::any::TypeId::of::<SmartGadget>();
        let _ = std::any::TypeId::of::<Multimeter>();
    }

    #[test]
    fn test_combined_registry_composes() {
        let registry = Registry::builder()
            .register(devices::sensirion::gatt_entries())
            .register(devices::owon::gatt_entries())
            .build();

        assert!(registry.contains(&devices::sensirion::TEMPERATURE_UUID));
        assert!(registry.contains(&devices::owon::MEASUREMENT_UUID));
        assert!(registry.contains(&registry::BATTERY_LEVEL_UUID));
    }
}
