//! Pin assignments and peripheral bring-up
//!
//! Both UART sensors run at 9600 baud, 8N1. The BMP280 sits alone on I2C0 at
//! 100 kHz.

use esp_hal::i2c::master::{Config as I2cConfig, ConfigError as I2cConfigError, I2c};
use esp_hal::peripherals::{GPIO8, GPIO9, GPIO15, GPIO16, GPIO17, GPIO18, I2C0, UART1, UART2};
use esp_hal::time::Rate;
use esp_hal::uart::{Config as UartConfig, ConfigError as UartConfigError, Uart};
use esp_hal::Async;
use static_cell::StaticCell;
use thiserror_no_std::Error;

use crate::async_i2c_bus::{AsyncI2cDevice, I2cBus};
use crate::serial::SensorUart;

pub const SENSOR_BAUD_RATE: u32 = 9600;
pub const I2C_FREQUENCY_KHZ: u32 = 100;

pub type AsyncI2c = I2c<'static, Async>;
pub type PressureBus = AsyncI2cDevice<'static, AsyncI2c>;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("UART configuration rejected: {0:?}")]
    Uart(UartConfigError),
    #[error("I2C configuration rejected: {0:?}")]
    I2c(I2cConfigError),
}

/// Pins of the MH-Z19B on UART1.
pub struct Co2Pins {
    pub uart: UART1<'static>,
    pub tx: GPIO17<'static>,
    pub rx: GPIO18<'static>,
}

/// Pins of the PMS7003 on UART2.
pub struct DustPins {
    pub uart: UART2<'static>,
    pub tx: GPIO15<'static>,
    pub rx: GPIO16<'static>,
}

/// Pins of the BMP280 on I2C0.
pub struct PressurePins {
    pub i2c: I2C0<'static>,
    pub sda: GPIO8<'static>,
    pub scl: GPIO9<'static>,
}

fn sensor_uart_config() -> UartConfig {
    UartConfig::default().with_baudrate(SENSOR_BAUD_RATE)
}

pub fn create_co2_uart(pins: Co2Pins) -> Result<SensorUart, BoardError> {
    let uart = Uart::new(pins.uart, sensor_uart_config())
        .map_err(BoardError::Uart)?
        .with_tx(pins.tx)
        .with_rx(pins.rx)
        .into_async();
    Ok(SensorUart::new(uart))
}

pub fn create_dust_uart(pins: DustPins) -> Result<SensorUart, BoardError> {
    let uart = Uart::new(pins.uart, sensor_uart_config())
        .map_err(BoardError::Uart)?
        .with_tx(pins.tx)
        .with_rx(pins.rx)
        .into_async();
    Ok(SensorUart::new(uart))
}

/// Create the I2C bus and hand out the pressure sensor's device handle.
pub fn create_pressure_bus(pins: PressurePins) -> Result<PressureBus, BoardError> {
    static I2C0_BUS: StaticCell<I2cBus<AsyncI2c>> = StaticCell::new();

    let i2c = I2c::new(
        pins.i2c,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )
    .map_err(BoardError::I2c)?
    .with_sda(pins.sda)
    .with_scl(pins.scl)
    .into_async();

    let bus = I2C0_BUS.init(I2cBus::new(i2c));
    Ok(AsyncI2cDevice::new(bus))
}
