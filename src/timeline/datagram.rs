//! Datagrams: duration-tagged opaque payloads.

use crate::binio::{read_bytes, read_u32, write_u32};
use crate::error::{Result, VoicebankError};
use std::io::{Read, Write};

/// Size of the fixed part of an on-disk datagram (duration + payload length).
pub const DATAGRAM_PREFIX_SIZE: u64 = 8;

/// One entry of a timeline: a duration in samples plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Duration in samples at the owning store's sample rate.
    pub duration: u32,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(duration: u32, payload: Vec<u8>) -> Self {
        Self { duration, payload }
    }

    /// Datagram carrying 16-bit PCM samples (2 bytes per sample, big-endian).
    pub fn from_samples(duration: u32, samples: &[i16]) -> Self {
        let payload = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        Self { duration, payload }
    }

    /// Datagram carrying one frame of float coefficients (4 bytes each, big-endian).
    pub fn from_frame(duration: u32, frame: &[f32]) -> Self {
        let payload = frame.iter().flat_map(|v| v.to_be_bytes()).collect();
        Self { duration, payload }
    }

    pub fn samples(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    pub fn frame(&self) -> Vec<f32> {
        self.payload
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Number of bytes this datagram occupies on disk.
    pub fn encoded_len(&self) -> u64 {
        DATAGRAM_PREFIX_SIZE + self.payload.len() as u64
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            VoicebankError::state(format!(
                "datagram payload of {} bytes is too large",
                self.payload.len()
            ))
        })?;
        write_u32(writer, self.duration)?;
        write_u32(writer, len)?;
        writer.write_all(&self.payload)?;
        Ok(self.encoded_len())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let duration = read_u32(reader)?;
        let len = read_u32(reader)? as usize;
        let payload = read_bytes(reader, len, "datagram payload")?;
        Ok(Self { duration, payload })
    }
}

/// Converts a duration declared at `from_rate` into samples at `to_rate`.
///
/// Identity when the rates match, otherwise `round(duration * to_rate / from_rate)`.
pub fn rescale_duration(duration: u64, from_rate: u32, to_rate: u32) -> u64 {
    if from_rate == to_rate || from_rate == 0 {
        return duration;
    }
    (duration as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as u64
}
