//! In-memory test doubles for the bus, clock and scheduler.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use crate::bus::{
    Bus, ObjectPath, ObjectSnapshot, PropertyChange, PropertyHandler, PropertyValue,
    GATT_CHARACTERISTIC_INTERFACE, GATT_SERVICE_INTERFACE, PROP_DEVICE, PROP_SERVICE, PROP_UUID,
};
use crate::error::{Error, Result};
use crate::scheduler::{Clock, Scheduler};

/// Route tracing output through the test harness, honoring `RUST_LOG`.
/// Safe to call from every test; only the first call installs anything.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scriptable in-memory [`Bus`].
#[derive(Default)]
pub(crate) struct FakeBus {
    objects: RefCell<ObjectSnapshot>,
    reads: RefCell<HashMap<ObjectPath, VecDeque<Bytes>>>,
    read_counts: RefCell<HashMap<ObjectPath, u32>>,
    written: RefCell<HashMap<ObjectPath, Vec<Vec<u8>>>>,
    notifying: RefCell<HashSet<ObjectPath>>,
    handlers: RefCell<HashMap<ObjectPath, PropertyHandler>>,
    failing_reads: RefCell<HashSet<ObjectPath>>,
    failing_writes: RefCell<HashSet<ObjectPath>>,
    failing_notify: RefCell<HashSet<ObjectPath>>,
    snapshot_fetches: Cell<u32>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a characteristic object, creating its service object as needed.
    pub fn add_characteristic(&self, path: &str, uuid: Uuid, service: &str, device: &str) {
        let mut objects = self.objects.borrow_mut();

        let char_props = objects
            .entry(ObjectPath::new(path))
            .or_default()
            .entry(GATT_CHARACTERISTIC_INTERFACE.to_string())
            .or_default();
        char_props.insert(
            PROP_UUID.to_string(),
            PropertyValue::Text(uuid.to_string()),
        );
        char_props.insert(
            PROP_SERVICE.to_string(),
            PropertyValue::Path(ObjectPath::new(service)),
        );

        objects
            .entry(ObjectPath::new(service))
            .or_default()
            .entry(GATT_SERVICE_INTERFACE.to_string())
            .or_default()
            .insert(
                PROP_DEVICE.to_string(),
                PropertyValue::Path(ObjectPath::new(device)),
            );
    }

    /// Make reads of `path` return exactly `data` from now on.
    pub fn set_read_value(&self, path: &str, data: &[u8]) {
        let mut reads = self.reads.borrow_mut();
        let queue = reads.entry(ObjectPath::new(path)).or_default();
        queue.clear();
        queue.push_back(Bytes::copy_from_slice(data));
    }

    /// Queue a read result; the last queued value is sticky.
    pub fn queue_read_value(&self, path: &str, data: &[u8]) {
        self.reads
            .borrow_mut()
            .entry(ObjectPath::new(path))
            .or_default()
            .push_back(Bytes::copy_from_slice(data));
    }

    pub fn fail_reads(&self, path: &str) {
        self.failing_reads.borrow_mut().insert(ObjectPath::new(path));
    }

    pub fn fail_writes(&self, path: &str) {
        self.failing_writes
            .borrow_mut()
            .insert(ObjectPath::new(path));
    }

    pub fn fail_start_notify(&self, path: &str) {
        self.failing_notify
            .borrow_mut()
            .insert(ObjectPath::new(path));
    }

    pub fn allow_start_notify(&self, path: &str) {
        self.failing_notify
            .borrow_mut()
            .remove(&ObjectPath::new(path));
    }

    pub fn has_handler(&self, path: &str) -> bool {
        self.handlers.borrow().contains_key(&ObjectPath::new(path))
    }

    pub fn read_count(&self, path: &str) -> u32 {
        self.read_counts
            .borrow()
            .get(&ObjectPath::new(path))
            .copied()
            .unwrap_or(0)
    }

    pub fn written(&self, path: &str) -> Vec<Vec<u8>> {
        self.written
            .borrow()
            .get(&ObjectPath::new(path))
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot_fetches(&self) -> u32 {
        self.snapshot_fetches.get()
    }

    pub fn is_notifying(&self, path: &str) -> bool {
        self.notifying.borrow().contains(&ObjectPath::new(path))
    }

    /// Deliver a value notification to the subscribed handler, if any.
    pub fn notify(&self, path: &ObjectPath, data: &[u8]) {
        self.dispatch(
            path,
            PropertyChange {
                interface: GATT_CHARACTERISTIC_INTERFACE.to_string(),
                value: Some(Bytes::copy_from_slice(data)),
            },
        );
    }

    /// Deliver a properties-changed signal that carries no value.
    pub fn notify_noise(&self, path: &ObjectPath) {
        self.dispatch(
            path,
            PropertyChange {
                interface: GATT_CHARACTERISTIC_INTERFACE.to_string(),
                value: None,
            },
        );
    }

    fn dispatch(&self, path: &ObjectPath, change: PropertyChange) {
        // The handler is taken out for the call so it may re-enter the bus.
        let handler = self.handlers.borrow_mut().remove(path);
        if let Some(mut handler) = handler {
            handler(change);
            self.handlers
                .borrow_mut()
                .entry(path.clone())
                .or_insert(handler);
        }
    }
}

impl Bus for FakeBus {
    fn managed_objects(&self) -> Result<ObjectSnapshot> {
        self.snapshot_fetches.set(self.snapshot_fetches.get() + 1);
        Ok(self.objects.borrow().clone())
    }

    fn read_value(&self, path: &ObjectPath) -> Result<Bytes> {
        if self.failing_reads.borrow().contains(path) {
            return Err(Error::Transport {
                context: format!("fake bus: read of {path} failed"),
            });
        }
        *self
            .read_counts
            .borrow_mut()
            .entry(path.clone())
            .or_default() += 1;

        let mut reads = self.reads.borrow_mut();
        let queue = reads.get_mut(path).ok_or_else(|| Error::Transport {
            context: format!("fake bus: no value for {path}"),
        })?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue.front().cloned().ok_or_else(|| Error::Transport {
                context: format!("fake bus: no value for {path}"),
            })
        }
    }

    fn write_value(&self, path: &ObjectPath, data: &[u8]) -> Result<()> {
        if self.failing_writes.borrow().contains(path) {
            return Err(Error::Transport {
                context: format!("fake bus: write to {path} failed"),
            });
        }
        self.written
            .borrow_mut()
            .entry(path.clone())
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    fn start_notify(&self, path: &ObjectPath) -> Result<()> {
        if self.failing_notify.borrow().contains(path) {
            return Err(Error::Transport {
                context: format!("fake bus: start_notify on {path} failed"),
            });
        }
        self.notifying.borrow_mut().insert(path.clone());
        Ok(())
    }

    fn stop_notify(&self, path: &ObjectPath) -> Result<()> {
        self.notifying.borrow_mut().remove(path);
        Ok(())
    }

    fn subscribe_property_changes(
        &self,
        path: &ObjectPath,
        handler: PropertyHandler,
    ) -> Result<()> {
        self.handlers.borrow_mut().insert(path.clone(), handler);
        Ok(())
    }

    fn unsubscribe_property_changes(&self, path: &ObjectPath) -> Result<()> {
        self.handlers.borrow_mut().remove(path);
        Ok(())
    }
}

/// A [`Clock`] that only moves when told to.
pub(crate) struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self { now: Cell::new(now) }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// A [`Scheduler`] whose timers fire only on explicit ticks.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    once: RefCell<Vec<Box<dyn FnOnce()>>>,
    repeating: RefCell<Vec<Box<dyn FnMut() -> bool>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every repeating task once, dropping the ones that finish.
    pub fn tick(&self) {
        let mut tasks = std::mem::take(&mut *self.repeating.borrow_mut());
        tasks.retain_mut(|task| task());

        // Tasks scheduled during the tick go behind the survivors.
        let mut repeating = self.repeating.borrow_mut();
        tasks.append(&mut repeating);
        *repeating = tasks;
    }

    /// Run and drop every one-shot task.
    pub fn run_once_tasks(&self) {
        let tasks = std::mem::take(&mut *self.once.borrow_mut());
        for task in tasks {
            task();
        }
    }

    pub fn repeating_len(&self) -> usize {
        self.repeating.borrow().len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, _delay: Duration, callback: Box<dyn FnOnce()>) {
        self.once.borrow_mut().push(callback);
    }

    fn schedule_repeating(&self, _interval: Duration, callback: Box<dyn FnMut() -> bool>) {
        self.repeating.borrow_mut().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_drops_finished_tasks() {
        let scheduler = ManualScheduler::new();
        let fired = std::rc::Rc::new(Cell::new(0u32));

        let sink = fired.clone();
        scheduler.schedule_once(Duration::from_secs(1), Box::new(move || sink.set(sink.get() + 1)));
        let sink = fired.clone();
        scheduler.schedule_repeating(
            Duration::from_secs(1),
            Box::new(move || {
                sink.set(sink.get() + 1);
                sink.get() < 3
            }),
        );

        scheduler.run_once_tasks();
        assert_eq!(fired.get(), 1);
        scheduler.run_once_tasks();
        assert_eq!(fired.get(), 1);

        scheduler.tick();
        assert_eq!(fired.get(), 2);
        assert_eq!(scheduler.repeating_len(), 1);
        scheduler.tick();
        assert_eq!(fired.get(), 3);
        assert_eq!(scheduler.repeating_len(), 0);
        scheduler.tick();
        assert_eq!(fired.get(), 3);
    }
}
