//! Per-sensor acquisition state machine
//!
//! Each sensor gets one long-running [`AcquisitionTask`]: request a
//! measurement, collect and validate the response, store it in the sensor's
//! telemetry slot, sleep, repeat. I/O and checksum errors never stop the task;
//! they degrade that cycle's reading to zero. Only a failed bring-up or a
//! slot lock that cannot be taken within its retry budget ends it.

use core::convert::Infallible;

use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::sensors::{Sensor, SensorError};
use crate::telemetry::{LockExhausted, TelemetrySlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Requesting,
    AwaitingResponse,
    Validating,
    Storing,
    Sleeping,
    /// Terminal.
    Failed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("sensor initialization failed: {0}")]
    Initialization(SensorError),
    #[error("telemetry slot unavailable: {0}")]
    LockExhausted(LockExhausted),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Completed request-to-sleep cycles.
    pub cycles: u32,
    /// Cycles that stored the default reading.
    pub degraded: u32,
    pub checksum_failures: u32,
    pub io_failures: u32,
}

pub struct AcquisitionTask<'a, S: Sensor, C> {
    sensor: S,
    slot: &'a TelemetrySlot<S::Reading>,
    clock: C,
    config: AcquisitionConfig,
    state: AcquisitionState,
    frame: Option<S::Frame>,
    reading: S::Reading,
    stats: AcquisitionStats,
    failure: Option<LockExhausted>,
}

impl<'a, S, C> AcquisitionTask<'a, S, C>
where
    S: Sensor,
    C: Clock,
{
    pub fn new(
        sensor: S,
        slot: &'a TelemetrySlot<S::Reading>,
        clock: C,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            sensor,
            slot,
            clock,
            config,
            state: AcquisitionState::Idle,
            frame: None,
            reading: S::Reading::default(),
            stats: AcquisitionStats::default(),
            failure: None,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Bring the sensor up, then cycle until the slot becomes unavailable.
    pub async fn run(mut self) -> Result<Infallible, AcquisitionError> {
        self.sensor.init(&self.clock).await.map_err(|e| {
            error!("{}: {}", S::NAME, e);
            AcquisitionError::Initialization(e)
        })?;
        info!("{}: acquisition started", S::NAME);

        loop {
            if self.step().await == AcquisitionState::Failed {
                let exhausted = self.failure.unwrap_or(LockExhausted {
                    attempts: self.config.lock_retry_budget.saturating_add(1),
                });
                return Err(AcquisitionError::LockExhausted(exhausted));
            }
        }
    }

    /// Execute the current state and return the next one.
    pub async fn step(&mut self) -> AcquisitionState {
        self.state = match self.state {
            AcquisitionState::Idle => {
                self.frame = None;
                self.reading = S::Reading::default();
                AcquisitionState::Requesting
            }
            AcquisitionState::Requesting => match self.sensor.request().await {
                Ok(()) => AcquisitionState::AwaitingResponse,
                Err(e) => self.degrade(e),
            },
            AcquisitionState::AwaitingResponse => match self.sensor.receive(&self.clock).await {
                Ok(frame) => {
                    self.frame = Some(frame);
                    AcquisitionState::Validating
                }
                Err(e) => self.degrade(e),
            },
            AcquisitionState::Validating => {
                let validated = match self.frame.take() {
                    Some(frame) => self.sensor.validate(&frame),
                    None => Err(SensorError::ReadFailed {
                        sensor: S::NAME,
                        operation: "validate frame",
                        details: "no frame received",
                    }),
                };
                match validated {
                    Ok(reading) => {
                        debug!("{}: {:?}", S::NAME, reading);
                        self.reading = reading;
                        AcquisitionState::Storing
                    }
                    Err(e) => self.degrade(e),
                }
            }
            AcquisitionState::Storing => self.store().await,
            AcquisitionState::Sleeping => {
                self.clock.sleep(self.config.interval).await;
                self.stats.cycles = self.stats.cycles.wrapping_add(1);
                AcquisitionState::Idle
            }
            AcquisitionState::Failed => AcquisitionState::Failed,
        };
        self.state
    }

    fn degrade(&mut self, error: SensorError) -> AcquisitionState {
        match error {
            SensorError::ChecksumMismatch { .. } => {
                self.stats.checksum_failures = self.stats.checksum_failures.wrapping_add(1)
            }
            _ => self.stats.io_failures = self.stats.io_failures.wrapping_add(1),
        }
        self.stats.degraded = self.stats.degraded.wrapping_add(1);
        self.reading = S::Reading::default();
        warn!("{}; storing zero reading", error);
        AcquisitionState::Storing
    }

    async fn store(&mut self) -> AcquisitionState {
        let reading = self.reading;
        let stored = self
            .slot
            .with_lock_retrying(
                &self.clock,
                self.config.lock_timeout,
                self.config.lock_retry_budget,
                |slot| slot.store(reading),
            )
            .await;

        match stored {
            Ok(()) => AcquisitionState::Sleeping,
            Err(e) => {
                error!("{}: {}, stopping acquisition", S::NAME, e);
                self.failure = Some(e);
                AcquisitionState::Failed
            }
        }
    }
}
