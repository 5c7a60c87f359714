//! The inter-process bus boundary.
//!
//! The Bluetooth daemon exposes GATT objects (devices, services,
//! characteristics) over a system bus. This module defines the small set
//! of primitives the rest of the crate needs from that bus, without
//! binding to any particular transport implementation.

pub mod properties;

pub use properties::PropertyCache;

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Bus interface name for a GATT characteristic object.
pub const GATT_CHARACTERISTIC_INTERFACE: &str = "org.bluez.GattCharacteristic1";
/// Bus interface name for a GATT service object.
pub const GATT_SERVICE_INTERFACE: &str = "org.bluez.GattService1";

/// Property holding a characteristic's 128-bit UUID.
pub const PROP_UUID: &str = "UUID";
/// Property pointing from a characteristic to its owning service.
pub const PROP_SERVICE: &str = "Service";
/// Property pointing from a service to its owning device.
pub const PROP_DEVICE: &str = "Device";

/// An opaque handle identifying one object on the bus.
///
/// Paths are assigned by the daemon; the crate never interprets their
/// structure, only follows the `Service`/`Device` pointer properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Create a path from its bus string form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// One property value from the daemon's object tree.
///
/// Only the shapes the crate actually reads are modelled: UUID strings
/// and object-path pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// A string property, e.g. a characteristic UUID.
    Text(String),
    /// An object-path property, e.g. a `Service` pointer.
    Path(ObjectPath),
}

impl PropertyValue {
    /// The value as text, if it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Path(_) => None,
        }
    }

    /// The value as an object path, if it is one.
    pub fn as_path(&self) -> Option<&ObjectPath> {
        match self {
            PropertyValue::Path(p) => Some(p),
            PropertyValue::Text(_) => None,
        }
    }
}

/// Bulk snapshot of the daemon's object tree:
/// path -> interface name -> property name -> value.
pub type ObjectSnapshot = HashMap<ObjectPath, HashMap<String, HashMap<String, PropertyValue>>>;

/// A properties-changed signal delivered for one object.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Interface the change was reported on.
    pub interface: String,
    /// The new `Value` payload, when the change carries one.
    ///
    /// Signals that only toggle bookkeeping properties (`Notifying` and
    /// friends) arrive with `None` here and are ignored downstream.
    pub value: Option<Bytes>,
}

/// Callback invoked for each properties-changed signal on a subscribed path.
pub type PropertyHandler = Box<dyn FnMut(PropertyChange)>;

/// The raw bus primitives this crate consumes.
///
/// Implementations wrap a live bus connection to the Bluetooth daemon.
/// All calls are synchronous RPCs on the single event-loop thread; each
/// may fail with [`Error::Transport`](crate::Error::Transport), which the
/// core treats as terminal for that call (caches invalidated, error
/// propagated, no automatic retry).
pub trait Bus {
    /// Fetch a bulk snapshot of every managed object and its properties.
    fn managed_objects(&self) -> Result<ObjectSnapshot>;

    /// Read the current value of a characteristic.
    fn read_value(&self, path: &ObjectPath) -> Result<Bytes>;

    /// Write a raw value to a characteristic.
    fn write_value(&self, path: &ObjectPath, data: &[u8]) -> Result<()>;

    /// Ask the device to start sending value notifications for a path.
    fn start_notify(&self, path: &ObjectPath) -> Result<()>;

    /// Stop value notifications for a path.
    fn stop_notify(&self, path: &ObjectPath) -> Result<()>;

    /// Register a handler for properties-changed signals on a path.
    ///
    /// A handler already queued for delivery may still fire once after
    /// [`unsubscribe_property_changes`](Bus::unsubscribe_property_changes);
    /// handlers must tolerate that.
    fn subscribe_property_changes(&self, path: &ObjectPath, handler: PropertyHandler)
        -> Result<()>;

    /// Remove the properties-changed handler for a path, if any.
    fn unsubscribe_property_changes(&self, path: &ObjectPath) -> Result<()>;
}
