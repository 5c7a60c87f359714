//! Sensirion SmartGadget humidity/temperature logger.
//!
//! The gadget notifies one live reading per second on each of two
//! characteristics (humidity and temperature), and can bulk-send its
//! internally logged history over the same characteristics as indexed
//! batches. Live readings are bucketed and merged before delivery;
//! history batches feed the per-device [`DownloadSession`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{Bus, ObjectPath, PropertyCache};
use crate::characteristic::{Characteristic, NotifyHandler};
use crate::codec::{ScaledInterval32, Sint8, Timestamp64, Value};
use crate::data::Measurement;
use crate::discovery::{discover_devices, DiscoveredDevice};
use crate::download::{
    clock_sync_value, DownloadProgress, DownloadSession, History, SessionState,
    STALL_CHECK_INTERVAL, STALL_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use crate::protocol::{HumidityFrame, TemperatureFrame};
use crate::registry::{Category, CodecEntry, Registry, BATTERY_LEVEL_UUID};
use crate::scheduler::{Clock, Scheduler};

/// Humidity characteristic UUID (live reading / history stream).
pub const HUMIDITY_UUID: Uuid = Uuid::from_u128(0x0000_1235_b38d_4985_720e_0f993a68ee41);
/// Temperature characteristic UUID (live reading / history stream).
pub const TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x0000_2235_b38d_4985_720e_0f993a68ee41);
/// Time-base write characteristic UUID.
pub const SET_TIME_UUID: Uuid = Uuid::from_u128(0x0000_f235_b38d_4985_720e_0f993a68ee41);
/// Oldest-logged-sample timestamp characteristic UUID.
pub const LOG_MIN_TIME_UUID: Uuid = Uuid::from_u128(0x0000_f236_b38d_4985_720e_0f993a68ee41);
/// Newest-logged-sample timestamp characteristic UUID.
pub const LOG_MAX_TIME_UUID: Uuid = Uuid::from_u128(0x0000_f237_b38d_4985_720e_0f993a68ee41);
/// History-send trigger characteristic UUID.
pub const TRIGGER_SEND_LOG_UUID: Uuid = Uuid::from_u128(0x0000_f238_b38d_4985_720e_0f993a68ee41);
/// Logging-interval characteristic UUID.
pub const LOGGER_INTERVAL_UUID: Uuid = Uuid::from_u128(0x0000_f239_b38d_4985_720e_0f993a68ee41);

const ROLE_HUMIDITY: &str = "humidity";
const ROLE_TEMPERATURE: &str = "temperature";
const ROLE_SET_TIME: &str = "settime";
const ROLE_MIN_TIME: &str = "mintime";
const ROLE_MAX_TIME: &str = "maxtime";
const ROLE_SEND_LOG: &str = "sendlog";
const ROLE_INTERVAL: &str = "interval";
const ROLE_BATTERY: &str = "battery";

/// Registry entries for the gadget's characteristics.
pub fn gatt_entries() -> Vec<CodecEntry> {
    vec![
        CodecEntry::new(
            HUMIDITY_UUID,
            "Humidity",
            Category::Normal,
            Rc::new(HumidityFrame),
        ),
        CodecEntry::new(
            TEMPERATURE_UUID,
            "Temperature",
            Category::Normal,
            Rc::new(TemperatureFrame),
        ),
        CodecEntry::new(
            SET_TIME_UUID,
            "set_Time",
            Category::Misc,
            Rc::new(Timestamp64::millis()),
        ),
        CodecEntry::new(
            LOG_MIN_TIME_UUID,
            "log_Min_Time",
            Category::Misc,
            Rc::new(Timestamp64::millis()),
        ),
        CodecEntry::new(
            LOG_MAX_TIME_UUID,
            "log_Max_Time",
            Category::Misc,
            Rc::new(Timestamp64::millis()),
        ),
        CodecEntry::new(
            TRIGGER_SEND_LOG_UUID,
            "trigger_send_log",
            Category::Misc,
            Rc::new(Sint8),
        ),
        CodecEntry::new(
            LOGGER_INTERVAL_UUID,
            "logger_interval",
            Category::Misc,
            Rc::new(ScaledInterval32),
        ),
    ]
}

/// Callback for merged live readings.
pub type ReadingCallback = Box<dyn FnMut(&Measurement)>;
/// Callback for per-batch download progress.
pub type ProgressCallback = Box<dyn FnMut(DownloadProgress)>;
/// Callback fired once per download pass, when silence ends it.
pub type CompleteCallback = Box<dyn FnMut(SessionState, &History)>;

struct GadgetState {
    session: DownloadSession,
    prev_reading: Option<Measurement>,
    stall_check_active: bool,
    on_reading: Option<ReadingCallback>,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
}

/// One discovered SmartGadget.
pub struct SmartGadget {
    path: ObjectPath,
    humidity: Rc<Characteristic>,
    temperature: Rc<Characteristic>,
    set_time: Rc<Characteristic>,
    min_time: Rc<Characteristic>,
    max_time: Rc<Characteristic>,
    send_log: Rc<Characteristic>,
    interval: Rc<Characteristic>,
    battery: Option<Rc<Characteristic>>,
    clock: Rc<dyn Clock>,
    scheduler: Rc<dyn Scheduler>,
    state: Rc<RefCell<GadgetState>>,
    notifying: Cell<bool>,
}

impl SmartGadget {
    /// Wanted UUID -> role table for discovery.
    fn wanted() -> [(Uuid, &'static str); 8] {
        [
            (HUMIDITY_UUID, ROLE_HUMIDITY),
            (TEMPERATURE_UUID, ROLE_TEMPERATURE),
            (SET_TIME_UUID, ROLE_SET_TIME),
            (LOG_MIN_TIME_UUID, ROLE_MIN_TIME),
            (LOG_MAX_TIME_UUID, ROLE_MAX_TIME),
            (TRIGGER_SEND_LOG_UUID, ROLE_SEND_LOG),
            (LOGGER_INTERVAL_UUID, ROLE_INTERVAL),
            (BATTERY_LEVEL_UUID, ROLE_BATTERY),
        ]
    }

    /// Find every SmartGadget among the discovered characteristics.
    ///
    /// Devices missing a required role are logged and excluded; they do
    /// not fail the discovery.
    pub fn discover_all(
        bus: &Rc<dyn Bus>,
        props: &Rc<PropertyCache>,
        registry: &Registry,
        clock: Rc<dyn Clock>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Vec<Self>> {
        let mut gadgets = Vec::new();
        for device in discover_devices(bus, props, registry, &Self::wanted())? {
            match Self::from_roles(&device, clock.clone(), scheduler.clone()) {
                Ok(gadget) => gadgets.push(gadget),
                Err(Error::MissingRole { device, role }) => {
                    warn!("skipping {device}: no '{role}' characteristic");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(gadgets)
    }

    /// Assemble a gadget from one device's discovered roles.
    ///
    /// Battery is optional; everything else is required.
    pub fn from_roles(
        device: &DiscoveredDevice,
        clock: Rc<dyn Clock>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self> {
        Ok(Self {
            path: device.path().clone(),
            humidity: device.require(ROLE_HUMIDITY)?,
            temperature: device.require(ROLE_TEMPERATURE)?,
            set_time: device.require(ROLE_SET_TIME)?,
            min_time: device.require(ROLE_MIN_TIME)?,
            max_time: device.require(ROLE_MAX_TIME)?,
            send_log: device.require(ROLE_SEND_LOG)?,
            interval: device.require(ROLE_INTERVAL)?,
            battery: device.role(ROLE_BATTERY),
            clock,
            scheduler,
            state: Rc::new(RefCell::new(GadgetState {
                session: DownloadSession::new(),
                prev_reading: None,
                stall_check_active: false,
                on_reading: None,
                on_progress: None,
                on_complete: None,
            })),
            notifying: Cell::new(false),
        })
    }

    /// The device's bus path.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Battery charge as a 0.0-1.0 ratio, when the device exposes one.
    pub fn battery_level(&self) -> Result<Option<f64>> {
        match &self.battery {
            Some(chr) => Ok(chr.read()?.as_f64()),
            None => Ok(None),
        }
    }

    /// Register the live-readings callback.
    pub fn on_reading(&self, callback: impl FnMut(&Measurement) + 'static) {
        self.state.borrow_mut().on_reading = Some(Box::new(callback));
    }

    /// Register the download-progress callback.
    pub fn on_download_progress(&self, callback: impl FnMut(DownloadProgress) + 'static) {
        self.state.borrow_mut().on_progress = Some(Box::new(callback));
    }

    /// Register the download-completion callback.
    pub fn on_download_complete(&self, callback: impl FnMut(SessionState, &History) + 'static) {
        self.state.borrow_mut().on_complete = Some(Box::new(callback));
    }

    /// Subscribe to both value streams.
    ///
    /// Live readings and download batches arrive interleaved on the same
    /// two characteristics; the handler routes them by shape.
    pub fn enable_notifications(&self) -> Result<()> {
        if self.notifying.get() {
            return Ok(());
        }
        self.humidity.subscribe(self.stream_handler())?;
        if let Err(e) = self.temperature.subscribe(self.stream_handler()) {
            self.humidity.unsubscribe();
            return Err(e);
        }
        self.notifying.set(true);
        Ok(())
    }

    /// Drop both stream subscriptions. Idempotent.
    pub fn disable_notifications(&self) {
        self.humidity.unsubscribe();
        self.temperature.unsubscribe();
        self.notifying.set(false);
    }

    /// Current download session state.
    pub fn download_state(&self) -> SessionState {
        self.state.borrow().session.state()
    }

    /// Progress of the current download pass.
    pub fn download_progress(&self) -> DownloadProgress {
        self.state.borrow().session.progress()
    }

    /// Start (or re-arm) a history download.
    ///
    /// Call [`enable_notifications`](SmartGadget::enable_notifications)
    /// first; the history arrives on the ordinary value streams.
    ///
    /// Synchronizes the device time base if it has none, reads the log
    /// window with cached reads, validates it against any previous pass,
    /// triggers the device's bulk send and arms the stall check that
    /// will end the pass.
    pub fn start_download(&self) -> Result<()> {
        self.state.borrow_mut().session.begin_time_sync();

        // A nonzero max time means the device already has a time base;
        // overwriting it would re-stamp the existing log.
        let device_max = seconds_of("log_Max_Time", self.max_time.read()?)?;
        if device_max == 0.0 {
            let target = clock_sync_value(self.clock.now());
            debug!("{}: setting device time base to {target}", self.path);
            self.set_time.write(&Value::Float(target))?;
        }

        // The device recomputes the log window from the time base.
        self.min_time.invalidate_cache();
        self.max_time.invalidate_cache();
        self.interval.invalidate_cache();

        let min_time = seconds_of("log_Min_Time", self.min_time.cached_read()?)?;
        let max_time = seconds_of("log_Max_Time", self.max_time.cached_read()?)?;
        let interval = seconds_of("logger_interval", self.interval.cached_read()?)?;

        self.state
            .borrow_mut()
            .session
            .begin_pass(min_time, max_time, interval)?;

        self.send_log.write(&Value::Signed(1))?;
        self.arm_stall_check();
        Ok(())
    }

    fn stream_handler(&self) -> NotifyHandler {
        let state = Rc::clone(&self.state);
        let clock = Rc::clone(&self.clock);
        Box::new(move |chr, value| match value {
            Value::Reading(reading) => handle_reading(&state, clock.now(), reading),
            Value::Batch(batch) => handle_batch(&state, clock.now(), &batch),
            other => warn!("{}: unexpected stream value {other:?}", chr.path()),
        })
    }

    fn arm_stall_check(&self) {
        {
            let mut st = self.state.borrow_mut();
            if st.stall_check_active {
                return;
            }
            st.stall_check_active = true;
        }

        let state = Rc::clone(&self.state);
        let clock = Rc::clone(&self.clock);
        self.scheduler.schedule_repeating(
            STALL_CHECK_INTERVAL,
            Box::new(move || {
                let finished = state
                    .borrow_mut()
                    .session
                    .check_stall(clock.now(), STALL_TIMEOUT_SECS);
                if finished {
                    let (final_state, history) = {
                        let st = state.borrow();
                        (st.session.state(), st.session.history().clone())
                    };
                    // Cleared before the callback runs, so a re-arm from
                    // inside it can schedule a fresh check.
                    state.borrow_mut().stall_check_active = false;
                    invoke_complete(&state, final_state, &history);
                    return false;
                }

                let keep = state.borrow().session.state() == SessionState::Downloading;
                if !keep {
                    state.borrow_mut().stall_check_active = false;
                }
                keep
            }),
        );
    }
}

fn seconds_of(what: &'static str, value: Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| Error::Decode {
        context: format!("{what}: expected a numeric value, got {value:?}"),
    })
}

/// Bucket a live reading and flush the previous bucket when a new one
/// starts.
///
/// The device notifies each attribute once per second; rounding the
/// arrival time to a tenth of a second lets the humidity and
/// temperature halves of one sample land in the same bucket and merge.
fn handle_reading(state: &Rc<RefCell<GadgetState>>, now: f64, mut reading: Measurement) {
    let bucket = (now * 10.0).trunc() / 10.0;
    reading.timestamp = Some(bucket);

    let flushed = {
        let mut st = state.borrow_mut();
        match &mut st.prev_reading {
            None => {
                st.prev_reading = Some(reading);
                None
            }
            Some(prev) if prev.timestamp == Some(bucket) => {
                prev.merge(&reading);
                None
            }
            Some(prev) => {
                let done = *prev;
                *prev = reading;
                Some(done)
            }
        }
    };

    if let Some(done) = flushed {
        invoke_reading(state, &done);
    }
}

fn handle_batch(state: &Rc<RefCell<GadgetState>>, now: f64, batch: &[Measurement]) {
    let progress = state.borrow_mut().session.apply_batch(batch, now);
    invoke_progress(state, progress);
}

// Callbacks are taken out of the state for the call, so a callback may
// re-enter the gadget (start another download, change callbacks) without
// tripping the RefCell.

fn invoke_reading(state: &Rc<RefCell<GadgetState>>, reading: &Measurement) {
    let callback = state.borrow_mut().on_reading.take();
    if let Some(mut callback) = callback {
        callback(reading);
        let mut st = state.borrow_mut();
        if st.on_reading.is_none() {
            st.on_reading = Some(callback);
        }
    }
}

fn invoke_progress(state: &Rc<RefCell<GadgetState>>, progress: DownloadProgress) {
    let callback = state.borrow_mut().on_progress.take();
    if let Some(mut callback) = callback {
        callback(progress);
        let mut st = state.borrow_mut();
        if st.on_progress.is_none() {
            st.on_progress = Some(callback);
        }
    }
}

fn invoke_complete(state: &Rc<RefCell<GadgetState>>, final_state: SessionState, history: &History) {
    let callback = state.borrow_mut().on_complete.take();
    if let Some(mut callback) = callback {
        callback(final_state, history);
        let mut st = state.borrow_mut();
        if st.on_complete.is_none() {
            st.on_complete = Some(callback);
        }
    }
}
