//! Sensor readings and the capability the acquisition loop drives.

mod pressure;
mod uart;

pub use pressure::Bmp280Sensor;
pub use uart::UartSensor;

use core::future::Future;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::clock::Clock;

/// CO2 concentration from the MH-Z19B.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Co2Reading {
    pub ppm: u16,
}

/// Atmospheric particulate concentrations from the PMS7003, in µg/m³.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustReading {
    pub pm25: u16,
    pub pm100: u16,
}

/// Corrected temperature and absolute pressure from the BMP280.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureReading {
    pub temperature_c: f64,
    pub pressure_pa: f64,
}

/// Latest value of any sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Co2(Co2Reading),
    Dust(DustReading),
    Pressure(PressureReading),
}

impl Reading {
    pub const fn kind(&self) -> SensorKind {
        match self {
            Self::Co2(_) => SensorKind::Co2,
            Self::Dust(_) => SensorKind::Dust,
            Self::Pressure(_) => SensorKind::Pressure,
        }
    }
}

impl From<Co2Reading> for Reading {
    fn from(value: Co2Reading) -> Self {
        Self::Co2(value)
    }
}

impl From<DustReading> for Reading {
    fn from(value: DustReading) -> Self {
        Self::Dust(value)
    }
}

impl From<PressureReading> for Reading {
    fn from(value: PressureReading) -> Self {
        Self::Pressure(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Co2,
    Dust,
    Pressure,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [Self::Co2, Self::Dust, Self::Pressure];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Co2 => "co2",
            Self::Dust => "dust",
            Self::Pressure => "pressure",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: no complete frame within retry budget ({received}/{expected} bytes)")]
    IoExhausted {
        sensor: &'static str,
        received: usize,
        expected: usize,
    },
    #[error("{sensor}: checksum mismatch (computed {expected:#06x}, frame carries {received:#06x})")]
    ChecksumMismatch {
        sensor: &'static str,
        expected: u16,
        received: u16,
    },
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
}

/// A sensor driven by the acquisition state machine.
///
/// One cycle is `request` → `receive` → `validate`. Any error along the way
/// degrades that cycle's reading to the default value; only `init` failures
/// stop the task.
pub trait Sensor {
    /// Decoded measurement. `Default` is the degraded value.
    type Reading: Copy + Default + core::fmt::Debug;
    /// Raw response as received, possibly incomplete.
    type Frame;

    const KIND: SensorKind;
    /// Part name used in logs and errors.
    const NAME: &'static str;

    /// One-time bring-up before the first cycle.
    fn init<C: Clock>(&mut self, clock: &C) -> impl Future<Output = Result<(), SensorError>>;

    /// Ask the sensor for a measurement.
    fn request(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Collect the response. A partial frame is still returned so that it can
    /// be validated (and rejected) by [`Sensor::validate`].
    fn receive<C: Clock>(
        &mut self,
        clock: &C,
    ) -> impl Future<Output = Result<Self::Frame, SensorError>>;

    /// Check integrity and decode.
    fn validate(&self, frame: &Self::Frame) -> Result<Self::Reading, SensorError>;
}
