//! Connectivity status shared between network event handlers and the
//! publisher.
//!
//! The link and broker handlers run in event-dispatch context: they only
//! touch the atomic bitset and the reconnect budget and never block. The
//! publisher waits on the bitset with a timeout.

mod events;

pub use events::{BrokerEvent, LinkAction, LinkEvent};

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::clock::Clock;
use crate::config::DEFAULT_LINK_MAX_RETRIES;
use crate::retry::RetryBudget;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConnectivityFlags: u32 {
        /// Associated and holding an IP address.
        const LINK_UP = 1 << 0;
        /// Reconnect budget ran out. Cleared only by a new address.
        const LINK_FAILED = 1 << 1;
        /// Broker session established.
        const BROKER_UP = 1 << 2;
        /// One-shot request to tear the broker session down.
        const MUST_DISCONNECT = 1 << 3;
    }
}

impl ConnectivityFlags {
    pub const fn link_up(self) -> bool {
        self.contains(Self::LINK_UP)
    }

    pub const fn link_failed(self) -> bool {
        self.contains(Self::LINK_FAILED)
    }

    pub const fn broker_up(self) -> bool {
        self.contains(Self::BROKER_UP)
    }

    pub const fn must_disconnect(self) -> bool {
        self.contains(Self::MUST_DISCONNECT)
    }
}

pub struct ConnectivityState {
    bits: AtomicU32,
    changed: Signal<CriticalSectionRawMutex, ()>,
    link_retries: BlockingMutex<CriticalSectionRawMutex, Cell<RetryBudget>>,
}

impl ConnectivityState {
    pub const fn new(max_link_retries: u8) -> Self {
        Self {
            bits: AtomicU32::new(0),
            changed: Signal::new(),
            link_retries: BlockingMutex::new(Cell::new(RetryBudget::new(max_link_retries))),
        }
    }

    pub fn snapshot(&self) -> ConnectivityFlags {
        ConnectivityFlags::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, flags: ConnectivityFlags) {
        let before = self.bits.fetch_or(flags.bits(), Ordering::AcqRel);
        if before & flags.bits() != flags.bits() {
            self.changed.signal(());
        }
    }

    pub fn clear(&self, flags: ConnectivityFlags) {
        self.bits.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub fn link_up(&self) -> bool {
        self.snapshot().link_up()
    }

    pub fn link_failed(&self) -> bool {
        self.snapshot().link_failed()
    }

    pub fn broker_up(&self) -> bool {
        self.snapshot().broker_up()
    }

    pub fn must_disconnect(&self) -> bool {
        self.snapshot().must_disconnect()
    }

    /// Wait until any flag in `mask` is set or `timeout` elapses, then return
    /// the whole bitset. Nothing is cleared.
    pub async fn wait_for<C: Clock>(
        &self,
        clock: &C,
        mask: ConnectivityFlags,
        timeout: Duration,
    ) -> ConnectivityFlags {
        if !self.snapshot().intersects(mask) {
            let _ = clock
                .timeout(timeout, async {
                    loop {
                        self.changed.wait().await;
                        if self.snapshot().intersects(mask) {
                            break;
                        }
                    }
                })
                .await;
        }
        self.snapshot()
    }

    /// Reconnect attempts used since the last address was obtained.
    pub fn link_retries(&self) -> u8 {
        self.link_retries.lock(|budget| budget.get().failures())
    }

    fn update_retries<R>(&self, f: impl FnOnce(&mut RetryBudget) -> R) -> R {
        self.link_retries.lock(|cell| {
            let mut budget = cell.get();
            let result = f(&mut budget);
            cell.set(budget);
            result
        })
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_MAX_RETRIES)
    }
}
