//! Byte-level serial transport with a bounded-retry read loop
//!
//! A frame is read by repeatedly calling the port with a short timeout and
//! accumulating whatever arrives into a fixed-size buffer. Every call that
//! yields nothing counts against a [`RetryBudget`]; when the budget runs out
//! the read is abandoned and the caller keeps the partial buffer.

use embedded_io::{Error as _, ErrorKind};
use embedded_io_async::{Read, Write};
use log::{debug, trace};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::ReadPolicy;
use crate::retry::RetryBudget;

/// Drop bytes the UART driver has already buffered.
///
/// Called before every request so a late reply to a previous request cannot
/// be mistaken for the answer to the current one.
pub trait DiscardInput {
    fn discard_input(&mut self);
}

impl<T: DiscardInput + ?Sized> DiscardInput for &mut T {
    fn discard_input(&mut self) {
        (**self).discard_input();
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("serial write failed: {0:?}")]
    Write(ErrorKind),
    #[error("frame incomplete after retry budget: {received} of {expected} bytes")]
    Exhausted { received: usize, expected: usize },
}

/// Fixed-size receive buffer and how much of it has been filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<B> {
    bytes: B,
    filled: usize,
}

impl<B: Default> Frame<B> {
    pub fn new() -> Self {
        Self {
            bytes: B::default(),
            filled: 0,
        }
    }
}

impl<B: Default> Default for Frame<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AsRef<[u8]>> Frame<B> {
    /// A frame whose buffer is already completely filled.
    pub fn complete(bytes: B) -> Self {
        let filled = bytes.as_ref().len();
        Self { bytes, filled }
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.capacity()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn capacity(&self) -> usize {
        self.bytes.as_ref().len()
    }

    /// The whole buffer, including the zeroed tail of a partial frame.
    pub fn bytes(&self) -> &B {
        &self.bytes
    }

    pub fn received(&self) -> &[u8] {
        &self.bytes.as_ref()[..self.filled]
    }
}

impl<B: AsMut<[u8]>> Frame<B> {
    fn clear(&mut self) {
        self.bytes.as_mut().fill(0);
        self.filled = 0;
    }

    fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.bytes.as_mut()[self.filled..]
    }

    fn advance(&mut self, count: usize) {
        self.filled += count;
    }
}

/// One UART link to one request/response sensor.
pub struct SerialTransport<P> {
    port: P,
    policy: ReadPolicy,
}

impl<P> SerialTransport<P>
where
    P: Read + Write + DiscardInput,
{
    pub fn new(port: P, policy: ReadPolicy) -> Self {
        Self { port, policy }
    }

    /// Discard stale input, then write `command` completely.
    pub async fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        self.port.discard_input();
        self.port
            .write_all(command)
            .await
            .map_err(|e| TransportError::Write(e.kind()))?;
        self.port
            .flush()
            .await
            .map_err(|e| TransportError::Write(e.kind()))
    }

    /// Fill `frame` from the port.
    ///
    /// On [`TransportError::Exhausted`] the bytes received so far stay in
    /// `frame`; it is never complete in that case.
    pub async fn read_frame<B, C>(
        &mut self,
        clock: &C,
        frame: &mut Frame<B>,
    ) -> Result<(), TransportError>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
        C: Clock,
    {
        let mut budget = RetryBudget::new(self.policy.fail_budget);
        frame.clear();

        while !frame.is_complete() {
            let read = clock
                .timeout(self.policy.read_timeout, self.port.read(frame.unfilled_mut()))
                .await;

            match read {
                Ok(Ok(count)) if count > 0 => {
                    frame.advance(count);
                    trace!("read {} bytes, {}/{}", count, frame.filled(), frame.capacity());
                    continue;
                }
                Ok(Ok(_)) => trace!("read returned no data"),
                Ok(Err(e)) => debug!("read failed: {:?}", e.kind()),
                Err(_) => trace!("read timed out"),
            }

            if budget.record_failure().is_err() {
                return Err(TransportError::Exhausted {
                    received: frame.filled(),
                    expected: frame.capacity(),
                });
            }
        }

        Ok(())
    }

    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}
