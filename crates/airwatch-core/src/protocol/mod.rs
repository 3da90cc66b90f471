//! Sensor wire codecs
//!
//! Pure functions only: frame construction, checksum computation and response
//! parsing. No I/O happens here, so every codec can be exercised directly
//! against byte arrays.

pub mod bmp280;
pub mod mhz19;
pub mod pms7003;

pub use mhz19::Mhz19Codec;
pub use pms7003::Pms7003Codec;

/// A received frame failed checksum validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMismatch {
    /// Checksum computed over the frame body.
    pub expected: u16,
    /// Checksum carried by the frame itself.
    pub received: u16,
}

/// Request/response framing of a UART sensor.
///
/// The acquisition loop is generic over this capability; only the codec
/// differs between sensors that speak a fixed-size framed protocol.
pub trait FrameCodec {
    /// Decoded measurement.
    type Reading: Copy + Default + core::fmt::Debug;
    /// Fixed-size response buffer, e.g. `[u8; 9]`.
    type Response: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Command sent once before the first request, if the sensor needs one.
    fn startup_command(&self) -> Option<&'static [u8]> {
        None
    }

    /// Command that triggers one response frame.
    fn build_request(&self) -> &'static [u8];

    /// Validate the checksum and decode the measurement.
    fn parse_response(&self, frame: &Self::Response) -> Result<Self::Reading, ChecksumMismatch>;
}

/// Big-endian `u16` at `offset`.
#[inline]
pub(crate) const fn be16(bytes: &[u8], offset: usize) -> u16 {
    ((bytes[offset] as u16) << 8) | bytes[offset + 1] as u16
}
