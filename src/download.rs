//! The bulk-download session state machine.
//!
//! The humidity/temperature logger streams its internally logged history
//! as indexed batches over the same two notification characteristics
//! used for live readings. This module holds the per-device session
//! state that turns those batches into a time-indexed history:
//! time-base synchronization, index-to-timestamp conversion,
//! partial-record merging across the two streams, progress accounting
//! and stall detection.
//!
//! The device has no explicit end-of-log marker. Completion is inferred
//! from silence: when no batch has arrived for [`STALL_TIMEOUT_SECS`],
//! the download is deemed finished and the accumulated history is
//! delivered.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::data::Measurement;
use crate::error::{Error, Result};

/// Silence on both streams for this long ends the download.
pub const STALL_TIMEOUT_SECS: f64 = 2.0;

/// How often the stall check runs while a download is active.
pub const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Correction applied when writing a fresh time base to the device.
///
/// Calibration value: compensates for the latency between sampling the
/// wall clock and the device latching the written value. Changing it
/// shifts every downloaded timestamp.
pub const CLOCK_SET_OFFSET_SECS: f64 = -1.0;

/// The accumulated download history, keyed by millisecond timestamp.
///
/// Keys are unique timestamps; re-arrival of a timestamp merges into the
/// existing record.
pub type History = BTreeMap<i64, Measurement>;

/// Map an epoch-seconds timestamp to its history key.
pub fn timestamp_key(timestamp: f64) -> i64 {
    (timestamp * 1e3).round() as i64
}

/// The value to write when establishing a new device time base: the
/// wall clock truncated to whole seconds (the device truncates
/// internally), plus the calibration offset.
pub fn clock_sync_value(now: f64) -> f64 {
    now.trunc() + CLOCK_SET_OFFSET_SECS
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No download attempted yet, or the last pass was aborted.
    Idle,
    /// Establishing or verifying the device time base.
    TimeSync,
    /// Batches are (expected to be) arriving.
    Downloading,
    /// Silence ended the download with every expected record complete.
    Complete,
    /// Silence ended the download with records still missing.
    Stalled,
}

/// Progress snapshot handed to the progress callback per batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Which pass this is, starting at 1.
    pub pass_number: u32,
    /// Completeness acquired this pass; two half-records count as one.
    pub count: f64,
    /// Expected record count for the device's log window.
    pub total: u32,
}

/// Per-device state across one or more bulk-retrieval passes.
///
/// The history survives re-arming, so a second pass tops up records the
/// first one missed; the time-base validation guards against merging
/// history from a device whose clock moved in between.
#[derive(Debug)]
pub struct DownloadSession {
    state: SessionState,
    history: History,
    count: f64,
    pass_number: u32,
    min_time: f64,
    max_time: f64,
    interval: f64,
    total: u32,
    last_activity: Option<f64>,
}

impl DownloadSession {
    /// A fresh idle session.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            history: History::new(),
            count: 0.0,
            pass_number: 0,
            min_time: 0.0,
            max_time: 0.0,
            interval: 0.0,
            total: 0,
            last_activity: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The history accumulated so far, across all passes.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Progress of the current pass.
    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            pass_number: self.pass_number,
            count: self.count,
            total: self.total,
        }
    }

    /// Mark the session as synchronizing the device time base.
    pub fn begin_time_sync(&mut self) {
        self.state = SessionState::TimeSync;
    }

    /// Start a pass from freshly read log-window values.
    ///
    /// `min_time`, `max_time` and `interval` must be cached reads taken
    /// after the time base was established, so every batch of this pass
    /// converts indices against the same window.
    ///
    /// On any pass after the first, a min or max time that moved by more
    /// than half an interval means the time base shifted underneath the
    /// session; the pass aborts with [`Error::TimeBaseShifted`] and the
    /// history is left untouched for the caller to retry against.
    pub fn begin_pass(&mut self, min_time: f64, max_time: f64, interval: f64) -> Result<()> {
        if !interval.is_finite() || interval <= 0.0 {
            return Err(Error::Decode {
                context: format!("logger interval {interval} is not positive"),
            });
        }

        if self.pass_number > 0 {
            if (min_time - self.min_time).abs() > interval / 2.0 {
                self.state = SessionState::Idle;
                return Err(Error::TimeBaseShifted {
                    field: "min_time",
                    previous: self.min_time,
                    current: min_time,
                });
            }
            if (max_time - self.max_time).abs() > interval / 2.0 {
                self.state = SessionState::Idle;
                return Err(Error::TimeBaseShifted {
                    field: "max_time",
                    previous: self.max_time,
                    current: max_time,
                });
            }
        }

        self.min_time = min_time;
        self.max_time = max_time;
        self.interval = interval;
        self.total = ((max_time - min_time) / interval).floor() as u32;
        self.count = 0.0;
        self.pass_number += 1;
        self.last_activity = None;
        self.state = SessionState::Downloading;

        debug!(
            "download pass {} started: window {min_time}..{max_time} step {interval}, {} records expected",
            self.pass_number, self.total
        );
        Ok(())
    }

    /// Merge one decoded batch into the history.
    ///
    /// Indices convert to absolute timestamps against the pass's log
    /// window. A record already present for a timestamp is merged rather
    /// than overwritten, and the pass count moves by the *delta* in its
    /// completeness, so nothing is double-counted.
    ///
    /// A batch arriving while no pass is active (late stragglers after
    /// silence ended the pass, or before any pass started) is dropped;
    /// there is no valid window to convert its indices against.
    pub fn apply_batch(&mut self, batch: &[Measurement], now: f64) -> DownloadProgress {
        if self.state != SessionState::Downloading {
            trace!("dropping {}-sample batch outside an active pass", batch.len());
            return self.progress();
        }
        self.last_activity = Some(now);

        for sample in batch {
            let Some(index) = sample.index else {
                trace!("dropping unindexed sample from download batch");
                continue;
            };
            let timestamp = self.max_time - self.interval * (f64::from(index) - 1.0);
            let mut record = *sample;
            record.timestamp = Some(timestamp);

            match self.history.entry(timestamp_key(timestamp)) {
                Entry::Vacant(slot) => {
                    self.count += record.completeness();
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    let before = slot.get().completeness();
                    slot.get_mut().merge(&record);
                    self.count += slot.get().completeness() - before;
                }
            }
        }

        self.progress()
    }

    /// Periodic stall check; returns `true` when this call ended the
    /// download.
    ///
    /// Nothing happens until the first batch arrives. After that, once
    /// `now` passes the last activity plus `timeout`, the session moves
    /// to [`SessionState::Complete`] (every expected record acquired) or
    /// [`SessionState::Stalled`] (records missing) - either way the
    /// download is over and the history is ready for delivery.
    pub fn check_stall(&mut self, now: f64, timeout: f64) -> bool {
        if self.state != SessionState::Downloading {
            return false;
        }
        let Some(last_activity) = self.last_activity else {
            return false;
        };
        if now < last_activity + timeout {
            return false;
        }

        self.state = if self.count >= f64::from(self.total) {
            SessionState::Complete
        } else {
            SessionState::Stalled
        };
        debug!(
            "download pass {} finished by silence: {:?}, {}/{} records",
            self.pass_number, self.state, self.count, self.total
        );
        true
    }
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new()
    }
}
