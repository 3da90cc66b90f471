//! Bosch BMP280 register map and compensation.
//!
//! Register access itself lives in [`crate::sensors::pressure`]; this module
//! only knows how to interpret the bytes.

/// 7-bit bus address with SDO tied low.
pub const I2C_ADDRESS: u8 = 0x76;

pub const REG_CALIBRATION: u8 = 0x88;
pub const REG_CHIP_ID: u8 = 0xD0;
pub const REG_RESET: u8 = 0xE0;
pub const REG_STATUS: u8 = 0xF3;
/// `status.measuring`: set while a conversion is running.
pub const STATUS_MEASURING: u8 = 1 << 3;
pub const REG_CTRL_MEAS: u8 = 0xF4;
pub const REG_CONFIG: u8 = 0xF5;
/// First of six data registers: press_msb, press_lsb, press_xlsb, temp_msb,
/// temp_lsb, temp_xlsb.
pub const REG_DATA: u8 = 0xF7;

pub const CHIP_ID: u8 = 0x58;
pub const RESET_COMMAND: u8 = 0xB6;

pub const CALIBRATION_LEN: usize = 24;
pub const DATA_LEN: usize = 6;

/// The ADC reports this value for a channel whose oversampling is "skipped".
const ADC_SKIPPED: i32 = 0x80000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Oversampling {
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filter {
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Ms2000 = 6,
    Ms4000 = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerMode {
    Sleep = 0,
    Forced = 1,
    Normal = 3,
}

/// Measurement setup written during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementConfig {
    pub temperature: Oversampling,
    pub pressure: Oversampling,
    pub filter: Filter,
    pub standby: Standby,
    pub mode: PowerMode,
}

impl MeasurementConfig {
    /// `ctrl_meas` register value.
    pub const fn ctrl_meas(&self) -> u8 {
        ((self.temperature as u8) << 5) | ((self.pressure as u8) << 2) | self.mode as u8
    }

    /// `config` register value (3-wire SPI stays disabled).
    pub const fn config(&self) -> u8 {
        ((self.standby as u8) << 5) | ((self.filter as u8) << 2)
    }
}

impl Default for MeasurementConfig {
    /// Indoor monitoring: heavy IIR filtering, one sample per second.
    fn default() -> Self {
        Self {
            temperature: Oversampling::X4,
            pressure: Oversampling::X16,
            filter: Filter::X16,
            standby: Standby::Ms1000,
            mode: PowerMode::Normal,
        }
    }
}

/// Factory trimming constants, read once from `0x88..0xA0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

impl Calibration {
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LEN]) -> Self {
        let u = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);

        Self {
            dig_t1: u(0),
            dig_t2: s(2),
            dig_t3: s(4),
            dig_p1: u(6),
            dig_p2: s(8),
            dig_p3: s(10),
            dig_p4: s(12),
            dig_p5: s(14),
            dig_p6: s(16),
            dig_p7: s(18),
            dig_p8: s(20),
            dig_p9: s(22),
        }
    }

    /// Temperature in °C and pressure in Pa, using the floating-point
    /// formulas from the datasheet (section 8.1).
    pub fn compensate(&self, raw: RawSample) -> Option<(f64, f64)> {
        if raw.temperature == ADC_SKIPPED || raw.pressure == ADC_SKIPPED {
            return None;
        }

        let adc_t = raw.temperature as f64;
        let t1 = self.dig_t1 as f64;

        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * self.dig_t2 as f64;
        let delta = adc_t / 131072.0 - t1 / 8192.0;
        let var2 = delta * delta * self.dig_t3 as f64;
        let t_fine = (var1 + var2) as i32;
        let temperature = (var1 + var2) / 5120.0;

        let mut var1 = t_fine as f64 / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * self.dig_p6 as f64 / 32768.0;
        var2 += var1 * self.dig_p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.dig_p4 as f64 * 65536.0;
        var1 = (self.dig_p3 as f64 * var1 * var1 / 524288.0 + self.dig_p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.dig_p1 as f64;
        if var1 == 0.0 {
            // Avoid division by zero on an unprogrammed part.
            return None;
        }

        let mut pressure = 1048576.0 - raw.pressure as f64;
        pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.dig_p9 as f64 * pressure * pressure / 2147483648.0;
        let var2 = pressure * self.dig_p8 as f64 / 32768.0;
        pressure += (var1 + var2 + self.dig_p7 as f64) / 16.0;

        Some((temperature, pressure))
    }
}

/// Uncompensated 20-bit ADC outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub pressure: i32,
    pub temperature: i32,
}

impl RawSample {
    pub fn from_bytes(bytes: &[u8; DATA_LEN]) -> Self {
        let adc = |msb: u8, lsb: u8, xlsb: u8| {
            ((msb as i32) << 12) | ((lsb as i32) << 4) | ((xlsb as i32) >> 4)
        };

        Self {
            pressure: adc(bytes[0], bytes[1], bytes[2]),
            temperature: adc(bytes[3], bytes[4], bytes[5]),
        }
    }
}

#[cfg(test)]
pub(crate) const DATASHEET_CALIBRATION: Calibration = Calibration {
    dig_t1: 27504,
    dig_t2: 26435,
    dig_t3: -1000,
    dig_p1: 36477,
    dig_p2: -10685,
    dig_p3: 3024,
    dig_p4: 2855,
    dig_p5: 140,
    dig_p6: -7,
    dig_p7: 15500,
    dig_p8: -14600,
    dig_p9: 6000,
};

#[cfg(test)]
pub(crate) fn calibration_bytes(c: &Calibration) -> [u8; CALIBRATION_LEN] {
    let words: [u16; 12] = [
        c.dig_t1,
        c.dig_t2 as u16,
        c.dig_t3 as u16,
        c.dig_p1,
        c.dig_p2 as u16,
        c.dig_p3 as u16,
        c.dig_p4 as u16,
        c.dig_p5 as u16,
        c.dig_p6 as u16,
        c.dig_p7 as u16,
        c.dig_p8 as u16,
        c.dig_p9 as u16,
    ];
    let mut bytes = [0u8; CALIBRATION_LEN];
    for (i, word) in words.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&word.to_le_bytes());
    }
    bytes
}
