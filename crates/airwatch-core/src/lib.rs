//! Hardware-independent core library for airwatch
//!
//! This crate contains all platform-agnostic logic for the airwatch air-quality
//! station: sensor wire codecs, the bounded-retry serial transport, the shared
//! telemetry store, the per-sensor acquisition state machine, the connectivity
//! bitset fed by network events, and the publisher decision table.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod acquisition;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod protocol;
pub mod publisher;
pub mod retry;
pub mod sensors;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;
