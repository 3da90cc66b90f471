//! Shared latest-value store
//!
//! One [`TelemetrySlot`] per sensor kind. Acquisition tasks write their own
//! slot; the publisher takes a [`TelemetrySnapshot`] once per cycle.

mod slot;

pub use slot::{LockExhausted, LockTimeout, SlotSnapshot, SlotState, TelemetrySlot};

use embassy_time::Duration;

use crate::clock::Clock;
use crate::sensors::{Co2Reading, DustReading, PressureReading};

pub struct TelemetryStore {
    co2: TelemetrySlot<Co2Reading>,
    dust: TelemetrySlot<DustReading>,
    pressure: TelemetrySlot<PressureReading>,
}

/// Per-slot copies; `None` where the slot lock could not be taken in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub co2: Option<SlotSnapshot<Co2Reading>>,
    pub dust: Option<SlotSnapshot<DustReading>>,
    pub pressure: Option<SlotSnapshot<PressureReading>>,
}

impl TelemetryStore {
    pub const fn new() -> Self {
        Self {
            co2: TelemetrySlot::new(),
            dust: TelemetrySlot::new(),
            pressure: TelemetrySlot::new(),
        }
    }

    pub fn co2(&self) -> &TelemetrySlot<Co2Reading> {
        &self.co2
    }

    pub fn dust(&self) -> &TelemetrySlot<DustReading> {
        &self.dust
    }

    pub fn pressure(&self) -> &TelemetrySlot<PressureReading> {
        &self.pressure
    }

    /// Copy every slot, each under its own lock with `timeout`.
    pub async fn snapshot<C: Clock>(&self, clock: &C, timeout: Duration) -> TelemetrySnapshot {
        TelemetrySnapshot {
            co2: self.co2.with_lock(clock, timeout, |s| s.snapshot()).await.ok(),
            dust: self.dust.with_lock(clock, timeout, |s| s.snapshot()).await.ok(),
            pressure: self
                .pressure
                .with_lock(clock, timeout, |s| s.snapshot())
                .await
                .ok(),
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}
