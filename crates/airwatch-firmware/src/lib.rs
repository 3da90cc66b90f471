//! ESP32-S3 firmware modules for the airwatch station
//!
//! Everything here needs the ESP32 peripherals or the radio: board bring-up,
//! the UART adapter, the shared I2C bus, Wi-Fi link handling and the MQTT
//! session. The telemetry pipeline itself lives in `airwatch_core`.

#![no_std]

extern crate alloc;

pub mod async_i2c_bus;
pub mod board;
pub mod broker;
pub mod link;
pub mod serial;
pub mod station;
pub mod wifi_secrets;
