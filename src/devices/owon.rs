//! OWON-style BLE multimeter.
//!
//! The meter exposes one proprietary service with five characteristics.
//! Only the measurement stream is understood end to end; the rest are
//! named so reads of them at least render legibly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::warn;
use uuid::Uuid;

use crate::bus::{Bus, ObjectPath, PropertyCache};
use crate::characteristic::{Characteristic, NotifyHandler};
use crate::codec::{HexDump, Utf8String, Value};
use crate::discovery::{discover_devices, DiscoveredDevice};
use crate::error::{Error, Result};
use crate::protocol::{MeterFrame, MeterMeasurement};
use crate::registry::{Category, CodecEntry, Registry};
use crate::scheduler::Clock;

/// The meter's service UUID.
pub const METER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_fff0_0000_1000_8000_00805f9b34fb);
/// First unknown characteristic; reads back short text.
pub const UNKNOWN1_UUID: Uuid = Uuid::from_u128(0x0000_fff1_0000_1000_8000_00805f9b34fb);
/// Second unknown characteristic; opaque bytes.
pub const UNKNOWN2_UUID: Uuid = Uuid::from_u128(0x0000_fff2_0000_1000_8000_00805f9b34fb);
/// Button-press injection characteristic.
pub const PRESS_BUTTON_UUID: Uuid = Uuid::from_u128(0x0000_fff3_0000_1000_8000_00805f9b34fb);
/// The measurement notification stream.
pub const MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_fff4_0000_1000_8000_00805f9b34fb);
/// Third unknown characteristic.
pub const UNKNOWN5_UUID: Uuid = Uuid::from_u128(0x0000_fff5_0000_1000_8000_00805f9b34fb);

const ROLE_UNKNOWN1: &str = "unknown1";
const ROLE_UNKNOWN2: &str = "unknown2";
const ROLE_PRESS_BUTTON: &str = "press_button";
const ROLE_MEASUREMENT: &str = "measurement";
const ROLE_UNKNOWN5: &str = "unknown5";

/// Registry entries for the meter's characteristics.
///
/// fff3 and fff5 are deliberately left unregistered; the registry's
/// hex-dump fallback covers them.
pub fn gatt_entries() -> Vec<CodecEntry> {
    vec![
        CodecEntry::new(
            METER_SERVICE_UUID,
            "meter_service",
            Category::Misc,
            Rc::new(HexDump),
        ),
        CodecEntry::new(UNKNOWN1_UUID, "unknown1", Category::String, Rc::new(Utf8String)),
        CodecEntry::new(UNKNOWN2_UUID, "unknown2", Category::String, Rc::new(HexDump)),
        CodecEntry::new(
            MEASUREMENT_UUID,
            "measurement",
            Category::Normal,
            Rc::new(MeterFrame),
        ),
    ]
}

/// Callback for timestamped meter readings.
pub type MeterCallback = Box<dyn FnMut(f64, &MeterMeasurement)>;

struct MeterState {
    on_reading: Option<MeterCallback>,
}

/// One discovered multimeter.
pub struct Multimeter {
    path: ObjectPath,
    unknown1: Rc<Characteristic>,
    unknown2: Rc<Characteristic>,
    press_button: Rc<Characteristic>,
    measurement: Rc<Characteristic>,
    unknown5: Rc<Characteristic>,
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<MeterState>>,
    notifying: Cell<bool>,
}

impl Multimeter {
    /// Wanted UUID -> role table for discovery.
    fn wanted() -> [(Uuid, &'static str); 5] {
        [
            (UNKNOWN1_UUID, ROLE_UNKNOWN1),
            (UNKNOWN2_UUID, ROLE_UNKNOWN2),
            (PRESS_BUTTON_UUID, ROLE_PRESS_BUTTON),
            (MEASUREMENT_UUID, ROLE_MEASUREMENT),
            (UNKNOWN5_UUID, ROLE_UNKNOWN5),
        ]
    }

    /// Find every multimeter among the discovered characteristics.
    ///
    /// Devices missing a required role are logged and excluded.
    pub fn discover_all(
        bus: &Rc<dyn Bus>,
        props: &Rc<PropertyCache>,
        registry: &Registry,
        clock: Rc<dyn Clock>,
    ) -> Result<Vec<Self>> {
        let mut meters = Vec::new();
        for device in discover_devices(bus, props, registry, &Self::wanted())? {
            match Self::from_roles(&device, clock.clone()) {
                Ok(meter) => meters.push(meter),
                Err(Error::MissingRole { device, role }) => {
                    warn!("skipping {device}: no '{role}' characteristic");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(meters)
    }

    /// Assemble a meter from one device's discovered roles. All five
    /// characteristics must be present.
    pub fn from_roles(device: &DiscoveredDevice, clock: Rc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            path: device.path().clone(),
            unknown1: device.require(ROLE_UNKNOWN1)?,
            unknown2: device.require(ROLE_UNKNOWN2)?,
            press_button: device.require(ROLE_PRESS_BUTTON)?,
            measurement: device.require(ROLE_MEASUREMENT)?,
            unknown5: device.require(ROLE_UNKNOWN5)?,
            clock,
            state: Rc::new(RefCell::new(MeterState { on_reading: None })),
            notifying: Cell::new(false),
        })
    }

    /// The device's bus path.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// The text of the first unknown characteristic, useful for
    /// identifying firmware variants.
    pub fn identification(&self) -> Result<Option<String>> {
        Ok(self.unknown1.read()?.as_text().map(str::to_string))
    }

    /// Read every unknown characteristic, for protocol exploration.
    pub fn diagnostics(&self) -> Result<Vec<(&'static str, Value)>> {
        Ok(vec![
            (ROLE_UNKNOWN1, self.unknown1.read()?),
            (ROLE_UNKNOWN2, self.unknown2.read()?),
            (ROLE_UNKNOWN5, self.unknown5.read()?),
        ])
    }

    /// The button-press characteristic. Its write protocol is not mapped
    /// yet, so the raw handle is exposed as-is.
    pub fn press_button(&self) -> &Rc<Characteristic> {
        &self.press_button
    }

    /// Register the readings callback.
    pub fn on_reading(&self, callback: impl FnMut(f64, &MeterMeasurement) + 'static) {
        self.state.borrow_mut().on_reading = Some(Box::new(callback));
    }

    /// Subscribe to the measurement stream.
    pub fn enable_notifications(&self) -> Result<()> {
        if self.notifying.get() {
            return Ok(());
        }
        self.measurement.subscribe(self.stream_handler())?;
        self.notifying.set(true);
        Ok(())
    }

    /// Drop the measurement subscription. Idempotent.
    pub fn disable_notifications(&self) {
        self.measurement.unsubscribe();
        self.notifying.set(false);
    }

    fn stream_handler(&self) -> NotifyHandler {
        let state = Rc::clone(&self.state);
        let clock = Rc::clone(&self.clock);
        Box::new(move |chr, value| match value {
            Value::Meter(measurement) => {
                // Display updates arrive faster than once a second;
                // a tenth of a second is plenty of timestamp resolution.
                let timestamp = (clock.now() * 10.0).trunc() / 10.0;
                invoke_reading(&state, timestamp, &measurement);
            }
            other => warn!("{}: unexpected stream value {other:?}", chr.path()),
        })
    }
}

fn invoke_reading(state: &Rc<RefCell<MeterState>>, timestamp: f64, measurement: &MeterMeasurement) {
    // Taken out for the call so the callback may re-enter the meter.
    let callback = state.borrow_mut().on_reading.take();
    if let Some(mut callback) = callback {
        callback(timestamp, measurement);
        let mut st = state.borrow_mut();
        if st.on_reading.is_none() {
            st.on_reading = Some(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MeterMode;
    use crate::testing::{FakeBus, ManualClock};
    use pretty_assertions::assert_eq;

    const DEV: &str = "/dev_METER";

    fn char_path(uuid: Uuid) -> String {
        format!("{DEV}/s01/{}", &uuid.to_string()[4..8])
    }

    fn rig() -> (Rc<FakeBus>, Rc<ManualClock>, Multimeter) {
        crate::testing::init_tracing();
        let bus = Rc::new(FakeBus::new());
        for (uuid, _) in Multimeter::wanted() {
            bus.add_characteristic(&char_path(uuid), uuid, &format!("{DEV}/s01"), DEV);
        }

        let registry = Registry::builder().register(gatt_entries()).build();
        let dyn_bus: Rc<dyn Bus> = bus.clone();
        let props = Rc::new(PropertyCache::new(bus.clone()));
        let clock = Rc::new(ManualClock::new(500.0));

        let mut meters =
            Multimeter::discover_all(&dyn_bus, &props, &registry, clock.clone()).unwrap();
        assert_eq!(meters.len(), 1);
        (bus, clock, meters.remove(0))
    }

    /// A valid DC volts frame: scale1 4 (unit prefix), scale2 0, 1234 counts.
    const VOLTS_FRAME: [u8; 6] = [0x20, 0xF0, 0x00, 0x00, 0xD2, 0x04];

    #[test]
    fn test_discovery_requires_all_roles() {
        let bus = Rc::new(FakeBus::new());
        bus.add_characteristic("/dev_X/s01/fff4", MEASUREMENT_UUID, "/dev_X/s01", "/dev_X");

        let registry = Registry::builder().register(gatt_entries()).build();
        let dyn_bus: Rc<dyn Bus> = bus.clone();
        let props = Rc::new(PropertyCache::new(bus));
        let meters = Multimeter::discover_all(
            &dyn_bus,
            &props,
            &registry,
            Rc::new(ManualClock::new(0.0)),
        )
        .unwrap();
        assert!(meters.is_empty());
    }

    #[test]
    fn test_readings_are_timestamped_and_decoded() {
        let (bus, clock, meter) = rig();
        meter.enable_notifications().unwrap();
        assert!(bus.is_notifying(&char_path(MEASUREMENT_UUID)));

        let readings: Rc<RefCell<Vec<(f64, MeterMeasurement)>>> =
            Rc::new(RefCell::new(Vec::new()));
        let sink = readings.clone();
        meter.on_reading(move |t, m| sink.borrow_mut().push((t, *m)));

        clock.set(500.27);
        bus.notify(&ObjectPath::new(char_path(MEASUREMENT_UUID)), &VOLTS_FRAME);

        let seen = readings.borrow();
        assert_eq!(seen.len(), 1);
        let (timestamp, measurement) = &seen[0];
        assert_eq!(*timestamp, 500.2);
        assert_eq!(measurement.mode, MeterMode::VoltsDc);
        assert_eq!(measurement.value(), 1234.0);
    }

    #[test]
    fn test_invalid_frame_is_dropped() {
        let (bus, _clock, meter) = rig();
        meter.enable_notifications().unwrap();

        let count = Rc::new(Cell::new(0u32));
        let sink = count.clone();
        meter.on_reading(move |_, _| sink.set(sink.get() + 1));

        // Byte 3 must be zero; this frame fails to decode.
        let mut bad = VOLTS_FRAME;
        bad[3] = 0x01;
        bus.notify(&ObjectPath::new(char_path(MEASUREMENT_UUID)), &bad);
        assert_eq!(count.get(), 0);

        bus.notify(&ObjectPath::new(char_path(MEASUREMENT_UUID)), &VOLTS_FRAME);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_enable_disable_round_trip() {
        let (bus, _clock, meter) = rig();
        meter.enable_notifications().unwrap();
        // A second enable is a no-op, not an AlreadySubscribed error.
        meter.enable_notifications().unwrap();

        meter.disable_notifications();
        assert!(!bus.is_notifying(&char_path(MEASUREMENT_UUID)));
        meter.disable_notifications();

        meter.enable_notifications().unwrap();
        assert!(bus.is_notifying(&char_path(MEASUREMENT_UUID)));
    }

    #[test]
    fn test_identification_reads_text() {
        let (bus, _clock, meter) = rig();
        bus.set_read_value(&char_path(UNKNOWN1_UUID), b"BDM");
        assert_eq!(meter.identification().unwrap().as_deref(), Some("BDM"));
    }

    #[test]
    fn test_unregistered_roles_fall_back_to_hex_dump() {
        let (bus, _clock, meter) = rig();
        bus.set_read_value(&char_path(PRESS_BUTTON_UUID), &[0x68, 0x69]);
        assert!(!meter.press_button().is_known());
        assert_eq!(
            meter.press_button().read().unwrap(),
            Value::Text("68,69, hi".into())
        );
    }

    #[test]
    fn test_diagnostics_reads_every_unknown() {
        let (bus, _clock, meter) = rig();
        bus.set_read_value(&char_path(UNKNOWN1_UUID), b"BDM");
        bus.set_read_value(&char_path(UNKNOWN2_UUID), &[0x01]);
        bus.set_read_value(&char_path(UNKNOWN5_UUID), &[]);

        let report = meter.diagnostics().unwrap();
        assert_eq!(report[0], ("unknown1", Value::Text("BDM".into())));
        assert_eq!(report[1], ("unknown2", Value::Text("01,  ".into())));
        assert_eq!(report[2], ("unknown5", Value::Text(" ".into())));
    }
}
