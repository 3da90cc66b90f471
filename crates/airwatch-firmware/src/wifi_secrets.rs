//! Credentials baked in at build time from `.env` (see `build.rs`).

pub const WIFI_SSID: &str = env!("AIRWATCH_WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("AIRWATCH_WIFI_PASSWORD");

pub const BROKER_HOST: &str = env!("AIRWATCH_BROKER_HOST");
pub const BROKER_PORT: Option<&str> = option_env!("AIRWATCH_BROKER_PORT");
pub const BROKER_USERNAME: Option<&str> = option_env!("AIRWATCH_BROKER_USERNAME");
pub const BROKER_PASSWORD: Option<&str> = option_env!("AIRWATCH_BROKER_PASSWORD");

pub const DEVICE_ID: Option<&str> = option_env!("AIRWATCH_DEVICE_ID");

/// Empty values in `.env` count as unset.
pub fn non_empty(value: Option<&'static str>) -> Option<&'static str> {
    value.filter(|v| !v.is_empty())
}
