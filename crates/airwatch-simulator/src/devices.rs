//! Simulated MH-Z19B, PMS7003 and BMP280
//!
//! Readings drift slowly over time. Every device misbehaves on a fixed
//! schedule so the degraded paths of the pipeline get exercised too.

use std::collections::VecDeque;
use std::future::pending;

use airwatch_core::protocol::{bmp280, mhz19, pms7003};
use airwatch_core::transport::DiscardInput;
use embassy_time::{Duration, Timer};
use embedded_hal::i2c::{ErrorKind as I2cErrorKind, NoAcknowledgeSource, Operation};
use embedded_io::ErrorKind;
use log::{debug, info};

/// Delay per delivered chunk, about 8 bytes at 9600 baud.
const CHUNK_DELAY: Duration = Duration::from_millis(8);
const CHUNK_LEN: usize = 8;

/// How often a device corrupts or drops a response.
#[derive(Debug, Clone, Copy)]
pub struct FaultSchedule {
    /// Every n-th response has a broken checksum.
    pub corrupt_every: u32,
    /// Every n-th request goes unanswered.
    pub silent_every: u32,
}

impl FaultSchedule {
    fn corrupt(&self, request: u32) -> bool {
        self.corrupt_every > 0 && request % self.corrupt_every == 0
    }

    fn silent(&self, request: u32) -> bool {
        self.silent_every > 0 && request % self.silent_every == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialModel {
    Mhz19,
    Pms7003,
}

impl SerialModel {
    fn name(self) -> &'static str {
        match self {
            Self::Mhz19 => "sim MH-Z19B",
            Self::Pms7003 => "sim PMS7003",
        }
    }

    fn is_request(self, bytes: &[u8]) -> bool {
        match self {
            Self::Mhz19 => bytes == mhz19::READ_CO2_COMMAND,
            Self::Pms7003 => bytes == pms7003::READ_COMMAND,
        }
    }

    fn response(self, t: f64) -> Vec<u8> {
        match self {
            Self::Mhz19 => {
                let ppm = (650.0 + 150.0 * (t / 40.0).sin()) as u16;
                let [high, low] = ppm.to_be_bytes();
                let mut frame = [0xFF, 0x86, high, low, 0x47, 0x00, 0x00, 0x00, 0x00];
                frame[8] = mhz19::checksum(&frame);
                frame.to_vec()
            }
            Self::Pms7003 => {
                let pm25 = (12.0 + 8.0 * (t / 25.0).sin()).max(0.0) as u16;
                let pm100 = pm25 + (10.0 + 6.0 * (t / 60.0).cos()) as u16;
                let mut frame = [0u8; pms7003::RESPONSE_LEN];
                frame[..4].copy_from_slice(&[0x42, 0x4D, 0x00, 0x1C]);
                frame[12..14].copy_from_slice(&pm25.to_be_bytes());
                frame[14..16].copy_from_slice(&pm100.to_be_bytes());
                let sum = pms7003::checksum(&frame[..30]);
                frame[30..].copy_from_slice(&sum.to_be_bytes());
                frame.to_vec()
            }
        }
    }
}

/// Serial sensor that answers its read command with a fresh frame.
pub struct SimulatedUart {
    model: SerialModel,
    faults: FaultSchedule,
    rx: VecDeque<u8>,
    requests: u32,
}

impl SimulatedUart {
    pub fn new(model: SerialModel, faults: FaultSchedule) -> Self {
        Self {
            model,
            faults,
            rx: VecDeque::new(),
            requests: 0,
        }
    }

    fn answer(&mut self) {
        self.requests += 1;
        let request = self.requests;
        if self.faults.silent(request) {
            info!("{}: staying silent for request {}", self.model.name(), request);
            return;
        }

        let mut frame = self.model.response(f64::from(request));
        if self.faults.corrupt(request) {
            info!("{}: corrupting response {}", self.model.name(), request);
            if let Some(last) = frame.last_mut() {
                *last ^= 0x5A;
            }
        }
        self.rx.extend(frame);
    }
}

impl embedded_io::ErrorType for SimulatedUart {
    type Error = ErrorKind;
}

impl embedded_io_async::Read for SimulatedUart {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        if self.rx.is_empty() {
            return pending().await;
        }
        Timer::after(CHUNK_DELAY).await;

        let count = buf.len().min(self.rx.len()).min(CHUNK_LEN);
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl embedded_io_async::Write for SimulatedUart {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if self.model.is_request(buf) {
            self.answer();
        } else {
            debug!("{}: command {:02X?}", self.model.name(), buf);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }
}

impl DiscardInput for SimulatedUart {
    fn discard_input(&mut self) {
        self.rx.clear();
    }
}

/// Calibration words from the BMP280 datasheet example.
const CALIBRATION_WORDS: [u16; 12] = [
    27504,
    26435,
    -1000i16 as u16,
    36477,
    -10685i16 as u16,
    3024,
    2855,
    140,
    -7i16 as u16,
    15500,
    -14600i16 as u16,
    6000,
];

/// Register-level BMP280 whose data registers change on every sample.
pub struct SimulatedBmp280 {
    registers: [u8; 256],
    pointer: u8,
    samples: u32,
    /// Every n-th sample read is not acknowledged.
    nack_every: u32,
}

impl SimulatedBmp280 {
    pub fn new(nack_every: u32) -> Self {
        let mut registers = [0u8; 256];
        registers[bmp280::REG_CHIP_ID as usize] = bmp280::CHIP_ID;
        let start = bmp280::REG_CALIBRATION as usize;
        for (i, word) in CALIBRATION_WORDS.iter().enumerate() {
            registers[start + 2 * i..start + 2 * i + 2].copy_from_slice(&word.to_le_bytes());
        }
        Self {
            registers,
            pointer: 0,
            samples: 0,
            nack_every,
        }
    }

    /// Load the next raw sample into the data registers.
    fn sample(&mut self) {
        self.samples += 1;
        let t = f64::from(self.samples);
        let pressure = (415_148.0 + 900.0 * (t / 30.0).sin()) as u32;
        let temperature = (519_888.0 + 4_000.0 * (t / 50.0).cos()) as u32;

        let data = bmp280::REG_DATA as usize;
        self.registers[data..data + 3].copy_from_slice(&twenty_bit(pressure));
        self.registers[data + 3..data + 6].copy_from_slice(&twenty_bit(temperature));
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&register, values)) = bytes.split_first() else {
            return;
        };
        self.pointer = register;
        for &value in values {
            if self.pointer == bmp280::REG_RESET && value == bmp280::RESET_COMMAND {
                info!("sim BMP280: reset");
            } else {
                self.registers[self.pointer as usize] = value;
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.registers[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

fn twenty_bit(raw: u32) -> [u8; 3] {
    [(raw >> 12) as u8, (raw >> 4) as u8, ((raw & 0x0F) << 4) as u8]
}

impl embedded_hal_async::i2c::ErrorType for SimulatedBmp280 {
    type Error = I2cErrorKind;
}

impl embedded_hal_async::i2c::I2c for SimulatedBmp280 {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), I2cErrorKind> {
        if address != bmp280::I2C_ADDRESS {
            return Err(I2cErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        let reads_data = matches!(
            operations.first(),
            Some(Operation::Write([register])) if *register == bmp280::REG_DATA
        );
        if reads_data {
            self.sample();
            if self.nack_every > 0 && self.samples % self.nack_every == 0 {
                info!("sim BMP280: dropping sample {}", self.samples);
                return Err(I2cErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
            }
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write(bytes),
                Operation::Read(buf) => self.read(buf),
            }
        }
        Ok(())
    }
}
