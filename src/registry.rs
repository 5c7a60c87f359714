//! The UUID-to-codec registry.
//!
//! Maps each characteristic UUID to a semantic name, a category tag and
//! a codec. The base table covers the standard device-information
//! characteristics; device modules contribute their own entries through
//! the builder before discovery begins. Later registrations for the same
//! UUID win, so a device table may shadow a standard entry.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::codec::{Codec, HexDigits, HexDump, PercentUint8, Sint8, Utf8String};

/// Standard Device Name characteristic UUID.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb);
/// Standard Service Changed characteristic UUID.
pub const SERVICE_CHANGED_UUID: Uuid = Uuid::from_u128(0x0000_2a05_0000_1000_8000_00805f9b34fb);
/// Standard Tx Power Level characteristic UUID.
pub const TX_POWER_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a07_0000_1000_8000_00805f9b34fb);
/// Standard Battery Level characteristic UUID.
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);
/// Standard System ID characteristic UUID.
pub const SYSTEM_ID_UUID: Uuid = Uuid::from_u128(0x0000_2a23_0000_1000_8000_00805f9b34fb);
/// Standard Model Number characteristic UUID.
pub const MODEL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a24_0000_1000_8000_00805f9b34fb);
/// Standard Serial Number characteristic UUID.
pub const SERIAL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a25_0000_1000_8000_00805f9b34fb);
/// Standard Firmware Revision characteristic UUID.
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);
/// Standard Hardware Revision characteristic UUID.
pub const HARDWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a27_0000_1000_8000_00805f9b34fb);
/// Standard Software Revision characteristic UUID.
pub const SOFTWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a28_0000_1000_8000_00805f9b34fb);
/// Standard Manufacturer Name characteristic UUID.
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);

/// Coarse classification of a characteristic's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Human-readable text (device name, revisions).
    String,
    /// A live sensor quantity.
    Normal,
    /// Configuration and bookkeeping values.
    Misc,
    /// Device identity digests.
    Id,
    /// Not in the registry; resolved to the hex-dump fallback.
    Unknown,
}

/// One registry entry: a UUID's semantic name, category and codec.
///
/// Immutable once registered.
#[derive(Clone)]
pub struct CodecEntry {
    /// The characteristic UUID this entry describes.
    pub uuid: Uuid,
    /// Semantic name, e.g. `"log_Max_Time"`.
    pub name: String,
    /// Payload classification.
    pub category: Category,
    /// Encode/decode rules for the payload.
    pub codec: Rc<dyn Codec>,
}

impl CodecEntry {
    /// Create an entry.
    pub fn new(
        uuid: Uuid,
        name: impl Into<String>,
        category: Category,
        codec: Rc<dyn Codec>,
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            category,
            codec,
        }
    }
}

impl fmt::Debug for CodecEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecEntry")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("codec", &self.codec.name())
            .finish()
    }
}

/// Builder composing the registry from per-module entry tables.
pub struct RegistryBuilder {
    entries: HashMap<Uuid, CodecEntry>,
}

impl RegistryBuilder {
    /// Add entries; a later entry for an already-registered UUID
    /// replaces the earlier one.
    pub fn register(mut self, entries: impl IntoIterator<Item = CodecEntry>) -> Self {
        for entry in entries {
            self.entries.insert(entry.uuid, entry);
        }
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// The frozen UUID-to-codec mapping used during discovery.
pub struct Registry {
    entries: HashMap<Uuid, CodecEntry>,
}

impl Registry {
    /// Start a builder seeded with the standard-characteristic table.
    pub fn builder() -> RegistryBuilder {
        let mut entries = HashMap::new();
        for entry in standard_entries() {
            entries.insert(entry.uuid, entry);
        }
        RegistryBuilder { entries }
    }

    /// Resolve a UUID to its entry.
    ///
    /// Unknown UUIDs get a synthesized entry named `UUID:<uuid>` with
    /// category [`Category::Unknown`] and the hex-dump codec, so no
    /// characteristic is ever un-decodable.
    pub fn resolve(&self, uuid: &Uuid) -> CodecEntry {
        match self.entries.get(uuid) {
            Some(entry) => entry.clone(),
            None => CodecEntry::new(
                *uuid,
                format!("UUID:{uuid}"),
                Category::Unknown,
                Rc::new(HexDump),
            ),
        }
    }

    /// Whether a UUID has a registered entry.
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.entries.contains_key(uuid)
    }
}

fn standard_entries() -> Vec<CodecEntry> {
    vec![
        CodecEntry::new(
            DEVICE_NAME_UUID,
            "device_name",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            SERVICE_CHANGED_UUID,
            "service_changed",
            Category::Misc,
            Rc::new(HexDump),
        ),
        CodecEntry::new(
            TX_POWER_LEVEL_UUID,
            "tx_power_level",
            Category::Normal,
            Rc::new(Sint8),
        ),
        CodecEntry::new(
            BATTERY_LEVEL_UUID,
            "Battery",
            Category::Normal,
            Rc::new(PercentUint8),
        ),
        CodecEntry::new(SYSTEM_ID_UUID, "system_id", Category::Id, Rc::new(HexDigits)),
        CodecEntry::new(
            MODEL_NUMBER_UUID,
            "model_number",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            SERIAL_NUMBER_UUID,
            "serial_number",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            FIRMWARE_REVISION_UUID,
            "firmware_revision",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            HARDWARE_REVISION_UUID,
            "hardware_revision",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            SOFTWARE_REVISION_UUID,
            "software_revision",
            Category::String,
            Rc::new(Utf8String),
        ),
        CodecEntry::new(
            MANUFACTURER_NAME_UUID,
            "manufacturer_name",
            Category::String,
            Rc::new(Utf8String),
        ),
    ]
}
