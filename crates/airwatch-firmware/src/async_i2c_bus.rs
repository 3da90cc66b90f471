//! Shared access to the async I2C bus
//!
//! The BMP280 is the only device on the bus today, but the pressure task does
//! not own the peripheral: it holds an [`AsyncI2cDevice`] handle that locks
//! the bus for the length of one transaction and yields while waiting.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

pub type I2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// One device's handle on a bus shared through an embassy [`Mutex`].
pub struct AsyncI2cDevice<'a, T> {
    bus: &'a I2cBus<T>,
}

impl<'a, T> AsyncI2cDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a I2cBus<T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for AsyncI2cDevice<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for AsyncI2cDevice<'_, T> {
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    /// Register reads: the repeated start happens with the bus held.
    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
