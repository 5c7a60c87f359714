//! Role-based device discovery.
//!
//! A device driver names the characteristic UUIDs it cares about and the
//! role each plays ("humidity", "measurement", ...). Discovery walks
//! every GATT characteristic the daemon exposes, groups the wanted ones
//! by their owning device, and hands back one role map per device. The
//! driver then assembles its typed device struct from the roles,
//! surfacing [`Error::MissingRole`] for incomplete devices.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;
use uuid::Uuid;

use crate::bus::{Bus, ObjectPath, PropertyCache, GATT_CHARACTERISTIC_INTERFACE};
use crate::characteristic::Characteristic;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// The wanted characteristics of one discovered device, keyed by role.
pub struct DiscoveredDevice {
    path: ObjectPath,
    roles: HashMap<&'static str, Rc<Characteristic>>,
}

impl DiscoveredDevice {
    /// The device's bus path.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Look up an optional role.
    pub fn role(&self, name: &str) -> Option<Rc<Characteristic>> {
        self.roles.get(name).cloned()
    }

    /// Look up a required role; missing roles exclude the device.
    pub fn require(&self, name: &'static str) -> Result<Rc<Characteristic>> {
        self.role(name).ok_or_else(|| Error::MissingRole {
            device: self.path.clone(),
            role: name,
        })
    }

    /// Number of wanted characteristics found on this device.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no wanted characteristic was found (not produced by
    /// [`discover_devices`], which only yields non-empty groups).
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Group every discovered characteristic matching `wanted` by its owning
/// device.
///
/// Devices are returned in path order. A device appears as soon as one
/// wanted characteristic is found on it; validating that all required
/// roles are present is the driver's job during assembly.
pub fn discover_devices(
    bus: &Rc<dyn Bus>,
    props: &Rc<PropertyCache>,
    registry: &Registry,
    wanted: &[(Uuid, &'static str)],
) -> Result<Vec<DiscoveredDevice>> {
    let mut devices: BTreeMap<ObjectPath, HashMap<&'static str, Rc<Characteristic>>> =
        BTreeMap::new();

    for path in props.paths_with_interface(GATT_CHARACTERISTIC_INTERFACE)? {
        let chr = Characteristic::new(bus.clone(), props.clone(), registry, path)?;
        let Some((_, role)) = wanted.iter().find(|(uuid, _)| *uuid == chr.uuid()) else {
            continue;
        };
        let device = chr.device_path()?;
        debug!("found role '{role}' for device {device} at {}", chr.path());
        devices.entry(device).or_default().insert(role, chr);
    }

    Ok(devices
        .into_iter()
        .map(|(path, roles)| DiscoveredDevice { path, roles })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBus;

    const UUID_A: Uuid = Uuid::from_u128(0xa);
    const UUID_B: Uuid = Uuid::from_u128(0xb);

    fn fake_with_two_devices() -> Rc<FakeBus> {
        let fake = Rc::new(FakeBus::new());
        // dev_AA has both wanted characteristics, dev_BB only one.
        fake.add_characteristic("/dev_AA/s01/c01", UUID_A, "/dev_AA/s01", "/dev_AA");
        fake.add_characteristic("/dev_AA/s01/c02", UUID_B, "/dev_AA/s01", "/dev_AA");
        fake.add_characteristic("/dev_BB/s01/c01", UUID_A, "/dev_BB/s01", "/dev_BB");
        // An unrelated characteristic that must be ignored.
        fake.add_characteristic(
            "/dev_BB/s01/c09",
            Uuid::from_u128(0xffff),
            "/dev_BB/s01",
            "/dev_BB",
        );
        fake
    }

    #[test]
    fn test_grouping_by_device() {
        let fake = fake_with_two_devices();
        let bus: Rc<dyn Bus> = fake.clone();
        let props = Rc::new(PropertyCache::new(fake));
        let registry = Registry::builder().build();

        let wanted = [(UUID_A, "alpha"), (UUID_B, "beta")];
        let devices = discover_devices(&bus, &props, &registry, &wanted).unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].path().as_str(), "/dev_AA");
        assert_eq!(devices[0].len(), 2);
        assert!(devices[0].role("alpha").is_some());
        assert!(devices[0].role("beta").is_some());

        assert_eq!(devices[1].path().as_str(), "/dev_BB");
        assert!(devices[1].role("alpha").is_some());
        assert!(devices[1].role("beta").is_none());
    }

    #[test]
    fn test_require_reports_missing_role() {
        let fake = fake_with_two_devices();
        let bus: Rc<dyn Bus> = fake.clone();
        let props = Rc::new(PropertyCache::new(fake));
        let registry = Registry::builder().build();

        let wanted = [(UUID_A, "alpha"), (UUID_B, "beta")];
        let devices = discover_devices(&bus, &props, &registry, &wanted).unwrap();

        let err = devices[1].require("beta").unwrap_err();
        match err {
            Error::MissingRole { device, role } => {
                assert_eq!(device.as_str(), "/dev_BB");
                assert_eq!(role, "beta");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
