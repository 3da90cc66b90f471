//! UART adapter for the serial sensors

use airwatch_core::transport::DiscardInput;
use embedded_io::ErrorKind;
use esp_hal::Async;
use esp_hal::uart::Uart;
use log::trace;

/// Async UART as seen by `SerialTransport`.
pub struct SensorUart {
    uart: Uart<'static, Async>,
}

impl SensorUart {
    pub fn new(uart: Uart<'static, Async>) -> Self {
        Self { uart }
    }
}

impl embedded_io::ErrorType for SensorUart {
    type Error = ErrorKind;
}

impl embedded_io_async::Read for SensorUart {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.uart.read_async(buf).await.map_err(|_| ErrorKind::Other)
    }
}

impl embedded_io_async::Write for SensorUart {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        self.uart
            .write_async(buf)
            .await
            .map_err(|_| ErrorKind::BrokenPipe)
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        self.uart
            .flush_async()
            .await
            .map_err(|_| ErrorKind::BrokenPipe)
    }
}

impl DiscardInput for SensorUart {
    fn discard_input(&mut self) {
        let mut scratch = [0u8; 32];
        let mut dropped = 0;
        while let Ok(count) = self.uart.read_buffered(&mut scratch) {
            if count == 0 {
                break;
            }
            dropped += count;
        }
        if dropped > 0 {
            trace!("discarded {} stale bytes", dropped);
        }
    }
}
