//! Per-device on-time accounting.

use chrono::{DateTime, Utc};

use crate::models::{DeviceId, BLOCK_MINUTES};

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_milliseconds() as f64 / 60_000.0).max(0.0)
}

/// Tracks how many minutes a device spent switched on in the current block.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStateTracker {
    pub device_id: DeviceId,
    state: bool,
    active_minutes: f64,
    last_state_change: DateTime<Utc>,
}

impl DeviceStateTracker {
    pub fn new(device_id: DeviceId, state: bool, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            state,
            active_minutes: 0.0,
            last_state_change: now,
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn active_minutes(&self) -> f64 {
        self.active_minutes
    }

    /// Record a state change at `now`, crediting the time spent on since
    /// the previous change.
    pub fn update_state(&mut self, new_state: bool, now: DateTime<Utc>) {
        if self.state {
            self.active_minutes += minutes_between(self.last_state_change, now);
        }
        self.state = new_state;
        self.last_state_change = now;
    }

    /// Close the current block and return its on-time, capped at one block.
    ///
    /// The on/off state carries over; the minute counter restarts at zero.
    pub fn finalize_block(&mut self, now: DateTime<Utc>) -> f64 {
        if self.state {
            self.active_minutes += minutes_between(self.last_state_change, now);
            self.last_state_change = now;
        }
        let minutes = self.active_minutes.min(BLOCK_MINUTES);
        self.active_minutes = 0.0;
        minutes
    }
}
