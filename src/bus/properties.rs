//! Cached access to the daemon's object properties.
//!
//! Individual property reads over the bus are expensive, so the daemon's
//! whole object tree is fetched as one bulk snapshot and served from
//! memory until someone invalidates it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bus::{Bus, ObjectPath, ObjectSnapshot, PropertyValue};
use crate::error::{Error, Result};

/// Lazily-populated, explicitly invalidatable cache over the bus
/// object snapshot.
///
/// The snapshot is fetched on the first lookup after construction or
/// [`invalidate`](PropertyCache::invalidate) and reused for every lookup
/// until the next invalidation. Transport failures invalidate it from the
/// outside (see [`Characteristic`](crate::Characteristic)), since a failed
/// call usually means objects appeared or vanished.
pub struct PropertyCache {
    bus: Rc<dyn Bus>,
    snapshot: RefCell<Option<ObjectSnapshot>>,
}

impl PropertyCache {
    /// Create an empty cache over a bus connection.
    pub fn new(bus: Rc<dyn Bus>) -> Self {
        Self {
            bus,
            snapshot: RefCell::new(None),
        }
    }

    /// Throw the snapshot away; the next lookup refetches it.
    pub fn invalidate(&self) {
        debug!("property cache invalidated");
        *self.snapshot.borrow_mut() = None;
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot.borrow().is_none() {
            let snapshot = self.bus.managed_objects()?;
            debug!("property cache refreshed: {} objects", snapshot.len());
            *self.snapshot.borrow_mut() = Some(snapshot);
        }
        Ok(())
    }

    /// Look up one property, refreshing the snapshot first if needed.
    ///
    /// Returns `Ok(None)` when the path, interface or property is not in
    /// the snapshot.
    pub fn get(
        &self,
        path: &ObjectPath,
        interface: &str,
        property: &str,
    ) -> Result<Option<PropertyValue>> {
        self.validate()?;
        let snapshot = self.snapshot.borrow();
        let value = snapshot
            .as_ref()
            .and_then(|objects| objects.get(path))
            .and_then(|interfaces| interfaces.get(interface))
            .and_then(|properties| properties.get(property))
            .cloned();
        trace!("property {path} {interface}.{property}: {value:?}");
        Ok(value)
    }

    /// Like [`get`](PropertyCache::get), but a missing property is an error.
    pub fn require(
        &self,
        path: &ObjectPath,
        interface: &'static str,
        property: &'static str,
    ) -> Result<PropertyValue> {
        self.get(path, interface, property)?
            .ok_or_else(|| Error::PropertyNotFound {
                path: path.clone(),
                interface,
                property,
            })
    }

    /// All paths whose objects implement the given interface, sorted for
    /// deterministic iteration.
    pub fn paths_with_interface(&self, interface: &str) -> Result<Vec<ObjectPath>> {
        self.validate()?;
        let snapshot = self.snapshot.borrow();
        let mut paths: Vec<ObjectPath> = snapshot
            .as_ref()
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(_, interfaces)| interfaces.contains_key(interface))
                    .map(|(path, _)| path.clone())
                    .collect()
            })
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::GATT_CHARACTERISTIC_INTERFACE;
    use crate::testing::FakeBus;

    #[test]
    fn test_lookup_hits_and_misses() {
        let bus = Rc::new(FakeBus::new());
        bus.add_characteristic(
            "/dev_AA/service01/char01",
            uuid::Uuid::from_u128(0x2a19),
            "/dev_AA/service01",
            "/dev_AA",
        );
        let props = PropertyCache::new(bus);

        let path = ObjectPath::new("/dev_AA/service01/char01");
        let uuid = props
            .get(&path, GATT_CHARACTERISTIC_INTERFACE, "UUID")
            .unwrap();
        assert!(uuid.is_some());

        let missing = props
            .get(&path, GATT_CHARACTERISTIC_INTERFACE, "Flags")
            .unwrap();
        assert!(missing.is_none());

        let err = props
            .require(&path, GATT_CHARACTERISTIC_INTERFACE, "Flags")
            .unwrap_err();
        assert!(matches!(err, Error::PropertyNotFound { .. }));
    }

    #[test]
    fn test_snapshot_fetched_once_until_invalidated() {
        let bus = Rc::new(FakeBus::new());
        bus.add_characteristic(
            "/dev_AA/service01/char01",
            uuid::Uuid::from_u128(0x2a19),
            "/dev_AA/service01",
            "/dev_AA",
        );
        let props = PropertyCache::new(bus.clone());

        let path = ObjectPath::new("/dev_AA/service01/char01");
        props
            .get(&path, GATT_CHARACTERISTIC_INTERFACE, "UUID")
            .unwrap();
        props
            .get(&path, GATT_CHARACTERISTIC_INTERFACE, "UUID")
            .unwrap();
        assert_eq!(bus.snapshot_fetches(), 1);

        props.invalidate();
        props
            .get(&path, GATT_CHARACTERISTIC_INTERFACE, "UUID")
            .unwrap();
        assert_eq!(bus.snapshot_fetches(), 2);
    }

    #[test]
    fn test_paths_with_interface_sorted() {
        let bus = Rc::new(FakeBus::new());
        bus.add_characteristic(
            "/dev_AA/service01/char02",
            uuid::Uuid::from_u128(2),
            "/dev_AA/service01",
            "/dev_AA",
        );
        bus.add_characteristic(
            "/dev_AA/service01/char01",
            uuid::Uuid::from_u128(1),
            "/dev_AA/service01",
            "/dev_AA",
        );
        let props = PropertyCache::new(bus);

        let paths = props
            .paths_with_interface(GATT_CHARACTERISTIC_INTERFACE)
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0] < paths[1]);
    }
}
