//! Plantower PMS7003 particulate sensor, UART 9600 8N1, passive mode.

use super::{ChecksumMismatch, FrameCodec, be16};
use crate::sensors::DustReading;

pub const RESPONSE_LEN: usize = 32;

/// Switch the sensor to passive (request/response) mode.
/// 0x42 + 0x4D + 0xE1 + 0x00 + 0x00 = 0x0170
pub const SET_PASSIVE_MODE_COMMAND: [u8; 7] = [0x42, 0x4D, 0xE1, 0x00, 0x00, 0x01, 0x70];

/// Request one measurement frame while in passive mode.
/// 0x42 + 0x4D + 0xE2 + 0x00 + 0x00 = 0x0171
pub const READ_COMMAND: [u8; 7] = [0x42, 0x4D, 0xE2, 0x00, 0x00, 0x01, 0x71];

/// Byte offset of the atmospheric PM2.5 concentration.
const PM25_OFFSET: usize = 12;
/// Byte offset of the atmospheric PM10 concentration.
const PM100_OFFSET: usize = 14;
/// The trailing big-endian checksum covers everything before it.
const CHECKSUM_OFFSET: usize = 30;

/// 16-bit wrapping sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(*byte as u16))
}

pub fn parse_response(frame: &[u8; RESPONSE_LEN]) -> Result<DustReading, ChecksumMismatch> {
    let expected = checksum(&frame[..CHECKSUM_OFFSET]);
    let received = be16(frame, CHECKSUM_OFFSET);
    if expected != received {
        return Err(ChecksumMismatch { expected, received });
    }

    Ok(DustReading {
        pm25: be16(frame, PM25_OFFSET),
        pm100: be16(frame, PM100_OFFSET),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pms7003Codec;

impl FrameCodec for Pms7003Codec {
    type Reading = DustReading;
    type Response = [u8; RESPONSE_LEN];

    const NAME: &'static str = "PMS7003";

    fn startup_command(&self) -> Option<&'static [u8]> {
        Some(&SET_PASSIVE_MODE_COMMAND)
    }

    fn build_request(&self) -> &'static [u8] {
        &READ_COMMAND
    }

    fn parse_response(&self, frame: &Self::Response) -> Result<DustReading, ChecksumMismatch> {
        parse_response(frame)
    }
}

#[cfg(test)]
pub(crate) fn encode_frame(pm25: u16, pm100: u16) -> [u8; RESPONSE_LEN] {
    let mut frame = [0u8; RESPONSE_LEN];
    frame[0] = 0x42;
    frame[1] = 0x4D;
    frame[3] = 28;
    frame[PM25_OFFSET..PM25_OFFSET + 2].copy_from_slice(&pm25.to_be_bytes());
    frame[PM100_OFFSET..PM100_OFFSET + 2].copy_from_slice(&pm100.to_be_bytes());
    let sum = checksum(&frame[..CHECKSUM_OFFSET]);
    frame[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_be_bytes());
    frame
}
