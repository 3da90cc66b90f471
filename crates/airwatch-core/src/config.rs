//! Runtime configuration
//!
//! Defaults reproduce the timing and retry constants the station has always
//! shipped with. Credentials and calibration constants are supplied by the
//! firmware at build time.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound on consecutive empty reads / failed lock attempts.
pub const DEFAULT_RETRY_BUDGET: u8 = 20;

/// Reconnect attempts before the link is declared failed.
pub const DEFAULT_LINK_MAX_RETRIES: u8 = 100;

#[derive(Debug, Clone, Copy)]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub broker: BrokerConfig<'a>,
    pub link: LinkConfig,
    pub publisher: PublisherConfig<'a>,
    pub co2: AcquisitionConfig,
    pub dust: AcquisitionConfig,
    pub pressure: AcquisitionConfig,
    pub serial: ReadPolicy,
    pub temperature_correction: TemperatureCorrection,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            internet: InternetConfig::default(),
            broker: BrokerConfig::default(),
            link: LinkConfig::default(),
            publisher: PublisherConfig::default(),
            co2: AcquisitionConfig::co2(),
            dust: AcquisitionConfig::default(),
            pressure: AcquisitionConfig::default(),
            serial: ReadPolicy::default(),
            temperature_correction: TemperatureCorrection::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    #[serde(borrow)]
    pub username: Option<&'a str>,
    #[serde(borrow)]
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
}

impl Default for BrokerConfig<'_> {
    fn default() -> Self {
        Self {
            host: "",
            port: 1883,
            client_id: "airwatch",
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }
}

/// Timing of one acquisition task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// How long a single slot lock attempt may wait.
    pub lock_timeout: Duration,
    /// Failed lock attempts tolerated before the task gives up.
    pub lock_retry_budget: u8,
}

impl AcquisitionConfig {
    /// The CO2 sensor spends up to its own read budget waiting for a reply,
    /// so it sleeps less between cycles.
    pub const fn co2() -> Self {
        Self {
            interval: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(1),
            lock_retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(1),
            lock_retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Bounds of the serial read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Timeout of each underlying read call.
    pub read_timeout: Duration,
    /// Empty reads tolerated before the frame is abandoned.
    pub fail_budget: u8,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(200),
            fail_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub max_retries: u8,
    /// How long the link task waits after the retry budget ran out before
    /// starting a fresh connection sequence.
    pub failure_cooldown: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_LINK_MAX_RETRIES,
            failure_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig<'a> {
    /// Maximum time between two publisher cycles.
    pub poll_interval: Duration,
    /// How long the publisher waits for each slot lock.
    pub lock_timeout: Duration,
    pub topics: TopicLayout<'a>,
    pub pressure_unit: PressureUnit,
    /// Publish cycles without a fresh write before a slot is reported stale.
    pub stale_after_cycles: u8,
}

impl Default for PublisherConfig<'_> {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(2),
            topics: TopicLayout::default(),
            pressure_unit: PressureUnit::default(),
            stale_after_cycles: 6,
        }
    }
}

/// Topics are `{prefix}{device_id}{metric suffix}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicLayout<'a> {
    pub prefix: &'a str,
    pub device_id: &'a str,
}

impl Default for TopicLayout<'_> {
    fn default() -> Self {
        Self {
            prefix: "sensors/",
            device_id: "dust",
        }
    }
}

/// Unit pressure is published in.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PressureUnit {
    #[default]
    Hectopascal,
    MillimetersOfMercury,
}

impl PressureUnit {
    pub fn convert_pascals(self, pascals: f64) -> f64 {
        match self {
            Self::Hectopascal => pascals / 100.0,
            Self::MillimetersOfMercury => pascals / 133.322_368,
        }
    }
}

/// Linear fit `T_real = slope * T_measured + offset`, from a least-squares fit
/// against a reference thermometer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TemperatureCorrection {
    pub slope: f64,
    pub offset: f64,
}

impl TemperatureCorrection {
    pub fn apply(&self, measured_c: f64) -> f64 {
        self.slope * measured_c + self.offset
    }
}

impl Default for TemperatureCorrection {
    fn default() -> Self {
        Self {
            slope: 1.0,
            offset: 0.0,
        }
    }
}
