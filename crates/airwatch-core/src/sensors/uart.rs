use embedded_io_async::{Read, Write};
use log::{debug, info, trace, warn};

use super::{Sensor, SensorError, SensorKind};
use crate::clock::Clock;
use crate::protocol::{FrameCodec, Mhz19Codec, Pms7003Codec};
use crate::transport::{DiscardInput, Frame, SerialTransport, TransportError};

/// Which telemetry slot a codec's readings belong to.
pub trait CodecKind: FrameCodec {
    const KIND: SensorKind;
}

impl CodecKind for Mhz19Codec {
    const KIND: SensorKind = SensorKind::Co2;
}

impl CodecKind for Pms7003Codec {
    const KIND: SensorKind = SensorKind::Dust;
}

/// Any fixed-frame request/response sensor on a UART.
pub struct UartSensor<P, K> {
    transport: SerialTransport<P>,
    codec: K,
}

impl<P, K> UartSensor<P, K>
where
    P: Read + Write + DiscardInput,
    K: CodecKind,
{
    pub fn new(transport: SerialTransport<P>, codec: K) -> Self {
        Self { transport, codec }
    }

    pub fn transport(&self) -> &SerialTransport<P> {
        &self.transport
    }

    fn write_error(error: TransportError) -> SensorError {
        debug!("{}: {}", K::NAME, error);
        SensorError::ReadFailed {
            sensor: K::NAME,
            operation: "write command",
            details: "UART write error",
        }
    }
}

impl<P, K> Sensor for UartSensor<P, K>
where
    P: Read + Write + DiscardInput,
    K: CodecKind,
{
    type Reading = K::Reading;
    type Frame = Frame<K::Response>;

    const KIND: SensorKind = K::KIND;
    const NAME: &'static str = K::NAME;

    async fn init<C: Clock>(&mut self, _clock: &C) -> Result<(), SensorError> {
        if let Some(command) = self.codec.startup_command() {
            self.transport.send(command).await.map_err(|e| {
                debug!("{}: {}", K::NAME, e);
                SensorError::InitializationFailed {
                    sensor: K::NAME,
                    details: "failed to write startup command",
                }
            })?;
            info!("{}: startup command sent", K::NAME);
        }
        Ok(())
    }

    async fn request(&mut self) -> Result<(), SensorError> {
        self.transport
            .send(self.codec.build_request())
            .await
            .map_err(Self::write_error)
    }

    async fn receive<C: Clock>(&mut self, clock: &C) -> Result<Self::Frame, SensorError> {
        let mut frame = Frame::new();
        match self.transport.read_frame(clock, &mut frame).await {
            Ok(()) => trace!("{}: frame {:02x?}", K::NAME, frame.received()),
            Err(TransportError::Exhausted { received, expected }) => {
                warn!(
                    "{}: unable to read a full frame ({}/{} bytes)",
                    K::NAME,
                    received,
                    expected
                );
            }
            Err(e) => debug!("{}: {}", K::NAME, e),
        }
        Ok(frame)
    }

    fn validate(&self, frame: &Self::Frame) -> Result<K::Reading, SensorError> {
        // A short frame is rejected even if its zero padding sums correctly.
        if !frame.is_complete() {
            return Err(SensorError::IoExhausted {
                sensor: K::NAME,
                received: frame.filled(),
                expected: frame.capacity(),
            });
        }

        let parsed = self.codec.parse_response(frame.bytes());
        parsed.map_err(|mismatch| SensorError::ChecksumMismatch {
            sensor: K::NAME,
            expected: mismatch.expected,
            received: mismatch.received,
        })
    }
}
