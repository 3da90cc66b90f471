//! Deterministic stand-ins for time, buses and the broker.

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::{Future, pending, ready};

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, TimeoutError};
use embedded_hal::i2c::{ErrorKind as I2cErrorKind, NoAcknowledgeSource, Operation};
use embedded_io::ErrorKind;

use crate::clock::Clock;
use crate::protocol::bmp280::{self, DATASHEET_CALIBRATION, calibration_bytes};
use crate::publisher::{BrokerClient, BrokerError};
use crate::transport::DiscardInput;

/// Clock that never actually waits.
///
/// `sleep` returns immediately; `timeout` gives the future exactly one poll
/// and times out if it is not ready by then.
#[derive(Default)]
pub struct InstantClock {
    sleeps: RefCell<Vec<Duration>>,
    timeouts: RefCell<Vec<Duration>>,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.borrow().clone()
    }
}

impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }

    async fn timeout<F: Future>(
        &self,
        duration: Duration,
        future: F,
    ) -> Result<F::Output, TimeoutError> {
        self.timeouts.borrow_mut().push(duration);
        match select(future, ready(())).await {
            Either::First(output) => Ok(output),
            Either::Second(()) => Err(TimeoutError),
        }
    }
}

/// One scripted outcome of a `read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Deliver these bytes (split across calls if the buffer is smaller).
    Bytes(Vec<u8>),
    /// Never complete; the read times out.
    Silence,
    /// The driver reports an error.
    Fail,
    /// The read returns zero bytes.
    Eof,
}

/// UART double that replays a script of read outcomes.
///
/// Once the script runs out every further read is silent.
#[derive(Debug, Default)]
pub struct ScriptedPort {
    steps: VecDeque<Step>,
    buffered: Vec<u8>,
    written: Vec<Vec<u8>>,
    discards: usize,
    fail_writes: bool,
}

impl ScriptedPort {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ..Self::default()
        }
    }

    /// Bytes that are already waiting in the driver before the first request.
    pub fn set_buffered(&mut self, bytes: &[u8]) {
        self.buffered = bytes.to_vec();
    }

    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn discards(&self) -> usize {
        self.discards
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len()
    }
}

impl embedded_io::ErrorType for ScriptedPort {
    type Error = ErrorKind;
}

impl embedded_io_async::Read for ScriptedPort {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        if !self.buffered.is_empty() {
            let count = buf.len().min(self.buffered.len());
            buf[..count].copy_from_slice(&self.buffered[..count]);
            self.buffered.drain(..count);
            return Ok(count);
        }

        match self.steps.pop_front() {
            Some(Step::Bytes(mut bytes)) => {
                if bytes.len() > buf.len() {
                    let rest = bytes.split_off(buf.len());
                    self.steps.push_front(Step::Bytes(rest));
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Step::Fail) => Err(ErrorKind::Other),
            Some(Step::Eof) => Ok(0),
            Some(Step::Silence) | None => pending().await,
        }
    }
}

impl embedded_io_async::Write for ScriptedPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if self.fail_writes {
            return Err(ErrorKind::BrokenPipe);
        }
        self.written.push(buf.to_vec());
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }
}

impl DiscardInput for ScriptedPort {
    fn discard_input(&mut self) {
        self.buffered.clear();
        self.discards += 1;
    }
}

/// Register-level BMP280 model loaded with the datasheet example values.
pub struct FakeBmp280 {
    registers: [u8; 256],
    pointer: u8,
    resets: usize,
    ctrl_meas_writes: usize,
    busy_polls: usize,
    fail: bool,
}

impl FakeBmp280 {
    pub fn new() -> Self {
        let mut registers = [0u8; 256];
        registers[bmp280::REG_CHIP_ID as usize] = bmp280::CHIP_ID;

        let calibration = calibration_bytes(&DATASHEET_CALIBRATION);
        let start = bmp280::REG_CALIBRATION as usize;
        registers[start..start + calibration.len()].copy_from_slice(&calibration);

        let data = bmp280::REG_DATA as usize;
        registers[data..data + bmp280::DATA_LEN]
            .copy_from_slice(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00]);

        Self {
            registers,
            pointer: 0,
            resets: 0,
            ctrl_meas_writes: 0,
            busy_polls: 0,
            fail: false,
        }
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }

    pub fn set_register(&mut self, register: u8, value: u8) {
        self.registers[register as usize] = value;
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn ctrl_meas_writes(&self) -> usize {
        self.ctrl_meas_writes
    }

    /// Report `measuring` for the next `polls` status reads.
    pub fn set_busy_polls(&mut self, polls: usize) {
        self.busy_polls = polls;
    }

    pub fn busy_polls(&self) -> usize {
        self.busy_polls
    }

    pub fn fail_transfers(&mut self) {
        self.fail = true;
    }

    fn write_registers(&mut self, bytes: &[u8]) {
        let Some((&register, values)) = bytes.split_first() else {
            return;
        };
        self.pointer = register;
        for &value in values {
            match self.pointer {
                bmp280::REG_RESET if value == bmp280::RESET_COMMAND => {
                    self.resets += 1;
                    self.registers[bmp280::REG_CTRL_MEAS as usize] = 0;
                    self.registers[bmp280::REG_CONFIG as usize] = 0;
                }
                bmp280::REG_CTRL_MEAS => {
                    self.ctrl_meas_writes += 1;
                    self.registers[bmp280::REG_CTRL_MEAS as usize] = value;
                }
                register => self.registers[register as usize] = value,
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read_registers(&mut self, buf: &mut [u8]) {
        if self.pointer == bmp280::REG_STATUS {
            let measuring = if self.busy_polls > 0 {
                self.busy_polls -= 1;
                bmp280::STATUS_MEASURING
            } else {
                0
            };
            self.registers[bmp280::REG_STATUS as usize] = measuring;
        }
        for byte in buf {
            *byte = self.registers[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl embedded_hal_async::i2c::ErrorType for FakeBmp280 {
    type Error = I2cErrorKind;
}

impl embedded_hal_async::i2c::I2c for FakeBmp280 {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), I2cErrorKind> {
        if self.fail {
            return Err(I2cErrorKind::Bus);
        }
        if address != bmp280::I2C_ADDRESS {
            return Err(I2cErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write_registers(bytes),
                Operation::Read(buf) => self.read_registers(buf),
            }
        }
        Ok(())
    }
}

/// Broker double recording every call the publisher makes.
#[derive(Debug, Default)]
pub struct RecordingBroker {
    pub starts: usize,
    pub stops: usize,
    /// Every `publish` call, accepted or not.
    pub attempts: usize,
    pub published: Vec<(String, String)>,
    pub reject_publishes: Option<BrokerError>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> Vec<&str> {
        self.published.iter().map(|(topic, _)| topic.as_str()).collect()
    }

    pub fn payload(&self, topic: &str) -> Option<&str> {
        self.published
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, payload)| payload.as_str())
    }
}

impl BrokerClient for RecordingBroker {
    fn start(&mut self) {
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.stops += 1;
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.attempts += 1;
        if let Some(error) = self.reject_publishes {
            return Err(error);
        }
        let payload = core::str::from_utf8(payload).unwrap_or("<binary>");
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Per-thread log capture, so parallel tests do not see each other's records.
pub mod logs {
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use std::sync::Once;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    std::thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|records| {
                records
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT: Once = Once::new();

    /// Run `f` and return everything it logged on this thread.
    pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
        INIT.call_once(|| {
            // Another logger may already be installed by a dependency's tests.
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(LevelFilter::Trace);
        });
        RECORDS.with(|records| records.borrow_mut().clear());
        let result = f();
        let records = RECORDS.with(|records| core::mem::take(&mut *records.borrow_mut()));
        (result, records)
    }

    /// Messages at `level` from a capture.
    pub fn at(records: &[(Level, String)], level: Level) -> Vec<&str> {
        records
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.as_str())
            .collect()
    }
}
