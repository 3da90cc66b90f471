use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
#[cfg(test)]
use embassy_sync::mutex::MutexGuard;
use embassy_time::Duration;
use log::warn;
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::retry::RetryBudget;

/// A single lock attempt did not succeed within its timeout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("slot lock not acquired within timeout")]
pub struct LockTimeout;

/// Every lock attempt of one operation timed out.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("slot lock not acquired after {attempts} attempts")]
pub struct LockExhausted {
    pub attempts: u8,
}

/// Contents of a slot, only reachable inside [`TelemetrySlot::with_lock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotState<T> {
    value: Option<T>,
    updated: bool,
    revision: u32,
}

impl<T: Copy + Default> SlotState<T> {
    const fn empty() -> Self {
        Self {
            value: None,
            updated: false,
            revision: 0,
        }
    }

    /// Replace the value as a whole and mark the slot updated.
    pub fn store(&mut self, value: T) {
        self.value = Some(value);
        self.updated = true;
        self.revision = self.revision.wrapping_add(1);
    }

    /// The stored value, or the zero reading when nothing was stored yet.
    pub fn value_or_default(&self) -> T {
        match (self.updated, self.value) {
            (true, Some(value)) => value,
            _ => T::default(),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.value
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    /// Number of stores so far (wrapping).
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn snapshot(&self) -> SlotSnapshot<T> {
        SlotSnapshot {
            value: self.value_or_default(),
            updated: self.updated,
            revision: self.revision,
        }
    }
}

/// Copy of a slot taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSnapshot<T> {
    pub value: T,
    pub updated: bool,
    pub revision: u32,
}

/// Latest reading of one sensor behind a mutex.
///
/// Exactly one acquisition task writes a slot; the publisher reads it.
/// Closures run synchronously while the lock is held, so no I/O can happen
/// under it.
pub struct TelemetrySlot<T> {
    state: Mutex<CriticalSectionRawMutex, SlotState<T>>,
}

impl<T: Copy + Default> TelemetrySlot<T> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::empty()),
        }
    }

    /// Acquire the lock within `timeout`, run `f` and release.
    pub async fn with_lock<C, R>(
        &self,
        clock: &C,
        timeout: Duration,
        f: impl FnOnce(&mut SlotState<T>) -> R,
    ) -> Result<R, LockTimeout>
    where
        C: Clock,
    {
        let mut state = clock
            .timeout(timeout, self.state.lock())
            .await
            .map_err(|_| LockTimeout)?;
        Ok(f(&mut state))
    }

    /// [`Self::with_lock`], retried until `max_failures` attempts have timed
    /// out and one more fails.
    pub async fn with_lock_retrying<C, R>(
        &self,
        clock: &C,
        timeout: Duration,
        max_failures: u8,
        f: impl FnOnce(&mut SlotState<T>) -> R,
    ) -> Result<R, LockExhausted>
    where
        C: Clock,
    {
        let mut budget = RetryBudget::new(max_failures);
        loop {
            match clock.timeout(timeout, self.state.lock()).await {
                Ok(mut state) => return Ok(f(&mut state)),
                Err(_) => {
                    warn!("slot lock busy ({} failed attempts)", budget.failures() + 1);
                    budget
                        .record_failure()
                        .map_err(|e| LockExhausted { attempts: e.failures })?;
                }
            }
        }
    }
}

#[cfg(test)]
impl<T> TelemetrySlot<T> {
    /// Hold the lock outside of a closure to simulate a stuck writer.
    pub(crate) async fn hold(&self) -> MutexGuard<'_, CriticalSectionRawMutex, SlotState<T>> {
        self.state.lock().await
    }
}

impl<T: Copy + Default> Default for TelemetrySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
