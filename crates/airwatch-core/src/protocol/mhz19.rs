//! MH-Z19B NDIR CO2 sensor, UART 9600 8N1.

use super::{ChecksumMismatch, FrameCodec, be16};
use crate::sensors::Co2Reading;

pub const RESPONSE_LEN: usize = 9;

/// "Read gas concentration" command (0x86).
pub const READ_CO2_COMMAND: [u8; 9] = [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79];

/// Checksum over bytes 1..8: `0xFF - sum + 1`, all modulo 256.
pub fn checksum(frame: &[u8; RESPONSE_LEN]) -> u8 {
    let sum = frame[1..8]
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    0xFFu8.wrapping_sub(sum).wrapping_add(1)
}

/// Validate a response frame and extract the concentration.
pub fn parse_response(frame: &[u8; RESPONSE_LEN]) -> Result<Co2Reading, ChecksumMismatch> {
    let expected = checksum(frame);
    if expected != frame[8] {
        return Err(ChecksumMismatch {
            expected: expected as u16,
            received: frame[8] as u16,
        });
    }

    Ok(Co2Reading {
        ppm: be16(frame, 2),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mhz19Codec;

impl FrameCodec for Mhz19Codec {
    type Reading = Co2Reading;
    type Response = [u8; RESPONSE_LEN];

    const NAME: &'static str = "MH-Z19B";

    fn build_request(&self) -> &'static [u8] {
        &READ_CO2_COMMAND
    }

    fn parse_response(&self, frame: &Self::Response) -> Result<Co2Reading, ChecksumMismatch> {
        parse_response(frame)
    }
}
