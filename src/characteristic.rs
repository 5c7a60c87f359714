//! The typed handle over one live GATT characteristic.
//!
//! A `Characteristic` binds a bus path to the codec resolved for its
//! UUID and exposes typed reads, writes and notification subscription.
//! Instances are created during discovery and shared as `Rc` handles by
//! the device drivers that own them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bus::{
    Bus, ObjectPath, PropertyChange, PropertyCache, GATT_CHARACTERISTIC_INTERFACE,
    GATT_SERVICE_INTERFACE, PROP_DEVICE, PROP_SERVICE, PROP_UUID,
};
use crate::codec::Value;
use crate::error::{Error, Result};
use crate::registry::{Category, CodecEntry, Registry};

/// Handler invoked with each decoded notification payload.
pub type NotifyHandler = Box<dyn FnMut(&Characteristic, Value)>;

/// One live GATT characteristic.
pub struct Characteristic {
    bus: Rc<dyn Bus>,
    props: Rc<PropertyCache>,
    path: ObjectPath,
    uuid: Uuid,
    entry: CodecEntry,
    cache: RefCell<Option<Value>>,
    subscribed: Cell<bool>,
}

impl Characteristic {
    /// Bind a handle to the characteristic at `path`.
    ///
    /// The UUID is read from the property cache and resolved through the
    /// registry; an unregistered UUID falls back to the hex-dump entry.
    pub fn new(
        bus: Rc<dyn Bus>,
        props: Rc<PropertyCache>,
        registry: &Registry,
        path: ObjectPath,
    ) -> Result<Rc<Self>> {
        let uuid_prop = props.require(&path, GATT_CHARACTERISTIC_INTERFACE, PROP_UUID)?;
        let uuid_text = uuid_prop.as_text().ok_or_else(|| Error::Decode {
            context: format!("{path}: UUID property is not a string"),
        })?;
        let uuid = Uuid::parse_str(uuid_text).map_err(|e| Error::Decode {
            context: format!("{path}: bad UUID '{uuid_text}': {e}"),
        })?;

        let entry = registry.resolve(&uuid);
        debug!("characteristic {path}: {uuid} -> {}", entry.name);

        Ok(Rc::new(Self {
            bus,
            props,
            path,
            uuid,
            entry,
            cache: RefCell::new(None),
            subscribed: Cell::new(false),
        }))
    }

    /// The bus path of this characteristic.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// The characteristic's 128-bit UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Semantic name from the registry entry.
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Category tag from the registry entry.
    pub fn category(&self) -> Category {
        self.entry.category
    }

    /// Whether the UUID was found in the registry, as opposed to the
    /// synthesized hex-dump fallback.
    pub fn is_known(&self) -> bool {
        self.entry.category != Category::Unknown
    }

    /// Read and decode the current value.
    ///
    /// A transport failure invalidates the upstream property cache and
    /// surfaces as an error without retry.
    pub fn read(&self) -> Result<Value> {
        let raw = self.read_raw()?;
        self.entry.codec.decode(&raw)
    }

    /// Read the raw payload without decoding.
    pub fn read_raw(&self) -> Result<Bytes> {
        let raw = self.bus.read_value(&self.path).map_err(|e| {
            self.props.invalidate();
            e
        })?;
        trace!("read {} bytes from {} ({})", raw.len(), self.path, self.entry.name);
        Ok(raw)
    }

    /// Return the cached value, reading (and caching) it if absent.
    ///
    /// Use this where repeated reads within one logical operation must
    /// observe the same value.
    pub fn cached_read(&self) -> Result<Value> {
        if let Some(value) = self.cache.borrow().clone() {
            return Ok(value);
        }
        let value = self.read()?;
        *self.cache.borrow_mut() = Some(value.clone());
        Ok(value)
    }

    /// Drop the cached value; the next `cached_read` refetches it.
    pub fn invalidate_cache(&self) {
        *self.cache.borrow_mut() = None;
    }

    /// Encode and write a value.
    ///
    /// The local cache is invalidated before the write is attempted, so
    /// a failed write can never leave a stale cache believed valid.
    pub fn write(&self, value: &Value) -> Result<()> {
        self.invalidate_cache();
        let raw = self.entry.codec.encode(value)?;
        trace!("write {} bytes to {} ({})", raw.len(), self.path, self.entry.name);
        self.bus.write_value(&self.path, &raw).map_err(|e| {
            self.props.invalidate();
            e
        })
    }

    /// Register the notification handler and enable device notifications.
    ///
    /// At most one handler per characteristic; a second registration
    /// fails with [`Error::AlreadySubscribed`]. Incoming payloads are
    /// decoded through this characteristic's codec before dispatch;
    /// property noise that carries no value is dropped without a call.
    pub fn subscribe(self: &Rc<Self>, mut handler: NotifyHandler) -> Result<()> {
        if self.subscribed.get() {
            return Err(Error::AlreadySubscribed { uuid: self.uuid });
        }

        let weak = Rc::downgrade(self);
        self.bus.subscribe_property_changes(
            &self.path,
            Box::new(move |change: PropertyChange| {
                let Some(chr) = weak.upgrade() else {
                    return;
                };
                if change.interface != GATT_CHARACTERISTIC_INTERFACE {
                    trace!(
                        "{}: ignoring change on interface {}",
                        chr.path,
                        change.interface
                    );
                    return;
                }
                // Notifying toggles and friends arrive with no value.
                let Some(raw) = change.value else {
                    return;
                };
                match chr.entry.codec.decode(&raw) {
                    Ok(value) => handler(&chr, value),
                    Err(e) => warn!("{} ({}): dropping notification: {e}", chr.path, chr.entry.name),
                }
            }),
        )?;
        if let Err(e) = self.bus.start_notify(&self.path) {
            // Do not leave the handler half-registered on the bus.
            if let Err(e2) = self.bus.unsubscribe_property_changes(&self.path) {
                warn!("{}: unsubscribe after failed start_notify failed: {e2}", self.path);
            }
            return Err(e);
        }
        self.subscribed.set(true);
        debug!("subscribed to {} ({})", self.path, self.entry.name);
        Ok(())
    }

    /// Clear the handler and the underlying bus subscription.
    ///
    /// Idempotent. A notification already queued for delivery may still
    /// invoke the old handler once.
    pub fn unsubscribe(&self) {
        if !self.subscribed.get() {
            return;
        }
        if let Err(e) = self.bus.stop_notify(&self.path) {
            warn!("{}: stop_notify failed: {e}", self.path);
        }
        if let Err(e) = self.bus.unsubscribe_property_changes(&self.path) {
            warn!("{}: unsubscribe failed: {e}", self.path);
        }
        self.subscribed.set(false);
        debug!("unsubscribed from {} ({})", self.path, self.entry.name);
    }

    /// Follow the object pointers to this characteristic's owning device.
    pub fn device_path(&self) -> Result<ObjectPath> {
        let service = self
            .props
            .require(&self.path, GATT_CHARACTERISTIC_INTERFACE, PROP_SERVICE)?;
        let service = service.as_path().ok_or_else(|| Error::Decode {
            context: format!("{}: Service property is not a path", self.path),
        })?;
        let device = self
            .props
            .require(service, GATT_SERVICE_INTERFACE, PROP_DEVICE)?;
        let device = device.as_path().ok_or_else(|| Error::Decode {
            context: format!("{service}: Device property is not a path"),
        })?;
        Ok(device.clone())
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("path", &self.path)
            .field("uuid", &self.uuid)
            .field("name", &self.entry.name)
            .finish()
    }
}

impl Drop for Characteristic {
    fn drop(&mut self) {
        if self.subscribed.get() {
            self.unsubscribe();
        }
    }
}
