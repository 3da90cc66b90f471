use embassy_time::Duration;
use embedded_hal_async::i2c::I2c;
use log::{error, info, trace};

use super::{PressureReading, Sensor, SensorError, SensorKind};
use crate::clock::Clock;
use crate::config::TemperatureCorrection;
use crate::protocol::bmp280::{
    self, CALIBRATION_LEN, Calibration, DATA_LEN, MeasurementConfig, PowerMode, RawSample,
};

const NAME: &str = "BMP280";

/// Start-up time after a soft reset (datasheet table 2).
const RESET_DELAY: Duration = Duration::from_millis(2);

/// Forced-mode conversions take at most 43.2 ms (x16/x16, datasheet table 13).
const CONVERSION_POLL: Duration = Duration::from_millis(2);
const MAX_CONVERSION_POLLS: u8 = 32;

pub struct Bmp280Sensor<I> {
    i2c: I,
    address: u8,
    measurement: MeasurementConfig,
    correction: TemperatureCorrection,
    calibration: Option<Calibration>,
}

impl<I: I2c> Bmp280Sensor<I> {
    pub fn new(i2c: I, correction: TemperatureCorrection) -> Self {
        Self {
            i2c,
            address: bmp280::I2C_ADDRESS,
            measurement: MeasurementConfig::default(),
            correction,
            calibration: None,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_measurement(mut self, measurement: MeasurementConfig) -> Self {
        self.measurement = measurement;
        self
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    async fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), I::Error> {
        self.i2c.write_read(self.address, &[register], buf).await
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(self.address, &[register, value]).await
    }

    async fn wait_for_conversion<C: Clock>(&mut self, clock: &C) -> Result<(), SensorError> {
        let mut status = [0u8; 1];
        for _ in 0..MAX_CONVERSION_POLLS {
            self.read_registers(bmp280::REG_STATUS, &mut status)
                .await
                .map_err(|e| {
                    error!("BMP280 status read failed: {:?}", e);
                    SensorError::ReadFailed {
                        sensor: NAME,
                        operation: "read status",
                        details: "I2C communication error",
                    }
                })?;
            if status[0] & bmp280::STATUS_MEASURING == 0 {
                return Ok(());
            }
            clock.sleep(CONVERSION_POLL).await;
        }
        error!("BMP280: forced conversion did not finish");
        Err(SensorError::ReadFailed {
            sensor: NAME,
            operation: "wait for conversion",
            details: "measurement still running",
        })
    }
}

impl<I: I2c> Sensor for Bmp280Sensor<I> {
    type Reading = PressureReading;
    type Frame = [u8; DATA_LEN];

    const KIND: SensorKind = SensorKind::Pressure;
    const NAME: &'static str = NAME;

    async fn init<C: Clock>(&mut self, clock: &C) -> Result<(), SensorError> {
        let init_failed = |details| SensorError::InitializationFailed {
            sensor: NAME,
            details,
        };

        let mut id = [0u8; 1];
        self.read_registers(bmp280::REG_CHIP_ID, &mut id)
            .await
            .map_err(|e| {
                error!("BMP280 chip id read failed: {:?}", e);
                init_failed("I2C communication error")
            })?;
        if id[0] != bmp280::CHIP_ID {
            error!("BMP280: unexpected chip id {:#04x}", id[0]);
            return Err(init_failed("unexpected chip id"));
        }

        self.write_register(bmp280::REG_RESET, bmp280::RESET_COMMAND)
            .await
            .map_err(|e| {
                error!("BMP280 soft reset failed: {:?}", e);
                init_failed("soft reset failed")
            })?;
        clock.sleep(RESET_DELAY).await;

        let mut raw = [0u8; CALIBRATION_LEN];
        self.read_registers(bmp280::REG_CALIBRATION, &mut raw)
            .await
            .map_err(|e| {
                error!("BMP280 calibration read failed: {:?}", e);
                init_failed("failed to read calibration")
            })?;
        self.calibration = Some(Calibration::from_bytes(&raw));

        // `config` is only honoured in sleep mode, so it goes first.
        let config = self.measurement.config();
        let ctrl_meas = self.measurement.ctrl_meas();
        self.write_register(bmp280::REG_CONFIG, config)
            .await
            .map_err(|_| init_failed("failed to write config"))?;
        self.write_register(bmp280::REG_CTRL_MEAS, ctrl_meas)
            .await
            .map_err(|_| init_failed("failed to write ctrl_meas"))?;

        info!(
            "BMP280: configured (ctrl_meas={:#04x}, config={:#04x})",
            ctrl_meas, config
        );
        Ok(())
    }

    async fn request(&mut self) -> Result<(), SensorError> {
        // Normal mode samples continuously; forced mode needs a trigger.
        if self.measurement.mode != PowerMode::Forced {
            return Ok(());
        }

        let ctrl_meas = self.measurement.ctrl_meas();
        self.write_register(bmp280::REG_CTRL_MEAS, ctrl_meas)
            .await
            .map_err(|e| {
                error!("BMP280 forced measurement trigger failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: NAME,
                    operation: "trigger forced measurement",
                    details: "I2C communication error",
                }
            })
    }

    async fn receive<C: Clock>(&mut self, clock: &C) -> Result<Self::Frame, SensorError> {
        if self.measurement.mode == PowerMode::Forced {
            self.wait_for_conversion(clock).await?;
        }

        let mut data = [0u8; DATA_LEN];
        self.read_registers(bmp280::REG_DATA, &mut data)
            .await
            .map_err(|e| {
                error!("BMP280 data read failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: NAME,
                    operation: "read measurement registers",
                    details: "I2C communication error",
                }
            })?;
        trace!("BMP280: data {:02x?}", data);
        Ok(data)
    }

    fn validate(&self, frame: &Self::Frame) -> Result<PressureReading, SensorError> {
        let calibration = self.calibration.as_ref().ok_or(SensorError::ReadFailed {
            sensor: NAME,
            operation: "compensate measurement",
            details: "calibration not loaded",
        })?;

        let (temperature_c, pressure_pa) = calibration
            .compensate(RawSample::from_bytes(frame))
            .ok_or(SensorError::ReadFailed {
                sensor: NAME,
                operation: "compensate measurement",
                details: "no valid sample available",
            })?;

        Ok(PressureReading {
            temperature_c: self.correction.apply(temperature_c),
            pressure_pa,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bmp280::DATASHEET_CALIBRATION;
    use crate::testing::{FakeBmp280, InstantClock};
    use embassy_futures::block_on;

    const DATASHEET_SAMPLE: [u8; DATA_LEN] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00];

    #[test]
    fn test_init_configures_the_part() {
        let mut sensor = Bmp280Sensor::new(FakeBmp280::new(), TemperatureCorrection::default());
        let clock = InstantClock::new();

        block_on(sensor.init(&clock)).unwrap();

        assert_eq!(sensor.calibration(), Some(&DATASHEET_CALIBRATION));
        let device = &sensor.i2c;
        assert_eq!(device.register(bmp280::REG_CTRL_MEAS), 0x77);
        assert_eq!(device.register(bmp280::REG_CONFIG), 0xB0);
        assert_eq!(device.resets(), 1);
        assert_eq!(clock.sleeps(), alloc::vec![RESET_DELAY]);
    }

    #[test]
    fn test_wrong_chip_id_fails_init() {
        let mut device = FakeBmp280::new();
        device.set_register(bmp280::REG_CHIP_ID, 0x60);
        let mut sensor = Bmp280Sensor::new(device, TemperatureCorrection::default());

        assert_eq!(
            block_on(sensor.init(&InstantClock::new())),
            Err(SensorError::InitializationFailed {
                sensor: "BMP280",
                details: "unexpected chip id",
            })
        );
    }

    #[test]
    fn test_reading_applies_temperature_correction_only() {
        let correction = TemperatureCorrection {
            slope: 1.0,
            offset: -2.0,
        };
        let mut sensor = Bmp280Sensor::new(FakeBmp280::new(), correction);
        let clock = InstantClock::new();
        block_on(sensor.init(&clock)).unwrap();

        block_on(sensor.request()).unwrap();
        let frame = block_on(sensor.receive(&clock)).unwrap();
        let reading = sensor.validate(&frame).unwrap();

        assert!((reading.temperature_c - 23.08).abs() < 0.01);
        assert!((reading.pressure_pa - 100_653.27).abs() < 1.0);
    }

    #[test]
    fn test_validate_before_init_fails() {
        let sensor = Bmp280Sensor::new(FakeBmp280::new(), TemperatureCorrection::default());
        assert!(matches!(
            sensor.validate(&DATASHEET_SAMPLE),
            Err(SensorError::ReadFailed { sensor: "BMP280", .. })
        ));
    }

    #[test]
    fn test_bus_failure_is_a_read_failure() {
        let mut sensor = Bmp280Sensor::new(FakeBmp280::new(), TemperatureCorrection::default());
        let clock = InstantClock::new();
        block_on(sensor.init(&clock)).unwrap();

        sensor.i2c.fail_transfers();
        assert!(matches!(
            block_on(sensor.receive(&clock)),
            Err(SensorError::ReadFailed { operation: "read measurement registers", .. })
        ));
    }

    #[test]
    fn test_forced_mode_retriggers_each_request() {
        let measurement = MeasurementConfig {
            mode: PowerMode::Forced,
            ..MeasurementConfig::default()
        };
        let mut sensor = Bmp280Sensor::new(FakeBmp280::new(), TemperatureCorrection::default())
            .with_measurement(measurement);
        block_on(sensor.init(&InstantClock::new())).unwrap();
        let writes = sensor.i2c.ctrl_meas_writes();

        block_on(sensor.request()).unwrap();
        block_on(sensor.request()).unwrap();
        assert_eq!(sensor.i2c.ctrl_meas_writes(), writes + 2);
    }

    fn forced_sensor(device: FakeBmp280) -> Bmp280Sensor<FakeBmp280> {
        let measurement = MeasurementConfig {
            mode: PowerMode::Forced,
            ..MeasurementConfig::default()
        };
        Bmp280Sensor::new(device, TemperatureCorrection::default()).with_measurement(measurement)
    }

    #[test]
    fn test_forced_mode_waits_for_conversion_before_reading() {
        let mut device = FakeBmp280::new();
        device.set_busy_polls(3);
        let mut sensor = forced_sensor(device);
        let clock = InstantClock::new();
        block_on(sensor.init(&clock)).unwrap();
        let init_sleeps = clock.sleeps().len();

        block_on(sensor.request()).unwrap();
        let frame = block_on(sensor.receive(&clock)).unwrap();

        assert_eq!(frame, DATASHEET_SAMPLE);
        assert_eq!(sensor.i2c.busy_polls(), 0);
        assert_eq!(
            clock.sleeps()[init_sleeps..],
            [CONVERSION_POLL, CONVERSION_POLL, CONVERSION_POLL]
        );
    }

    #[test]
    fn test_conversion_that_never_finishes_is_a_read_failure() {
        let mut device = FakeBmp280::new();
        device.set_busy_polls(usize::MAX);
        let mut sensor = forced_sensor(device);
        let clock = InstantClock::new();
        block_on(sensor.init(&clock)).unwrap();

        block_on(sensor.request()).unwrap();
        assert!(matches!(
            block_on(sensor.receive(&clock)),
            Err(SensorError::ReadFailed { operation: "wait for conversion", .. })
        ));
    }

    #[test]
    fn test_normal_mode_reads_without_polling_status() {
        let mut device = FakeBmp280::new();
        device.set_busy_polls(5);
        let mut sensor = Bmp280Sensor::new(device, TemperatureCorrection::default());
        let clock = InstantClock::new();
        block_on(sensor.init(&clock)).unwrap();

        block_on(sensor.receive(&clock)).unwrap();
        assert_eq!(sensor.i2c.busy_polls(), 5);
    }
}
