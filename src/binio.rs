//! Big-endian primitive codecs shared by every artifact.

use crate::error::{Result, VoicebankError};
use std::io::{ErrorKind, Read, Write};

/// Most elements a reader preallocates from a count read off disk.
const MAX_PREALLOC: usize = 1 << 16;

/// Capacity to reserve for `count` elements declared by a file.
///
/// A corrupt count must surface as a short read, not an allocation failure.
pub fn capacity_for(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

/// Reads exactly `len` bytes; `len` only bounds the read, never the allocation.
pub fn read_bytes<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(capacity_for(len));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(VoicebankError::format(format!(
            "{what} of {len} bytes runs past end of file"
        )));
    }
    Ok(buf)
}

/// Reads exactly `N` bytes, mapping a short read to a format error.
pub fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            VoicebankError::format("unexpected end of file")
        } else {
            VoicebankError::Io(e)
        }
    })?;
    Ok(buf)
}

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    Ok(read_array::<1, _>(reader)?[0])
}

pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    Ok(u16::from_be_bytes(read_array(reader)?))
}

pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(u32::from_be_bytes(read_array(reader)?))
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    Ok(i32::from_be_bytes(read_array(reader)?))
}

pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    Ok(u64::from_be_bytes(read_array(reader)?))
}

pub fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    Ok(f32::from_be_bytes(read_array(reader)?))
}

pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<()> {
    writer.write_all(&[value])?;
    Ok(())
}

pub fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(writer: &mut W, value: f32) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a `u16`-length-prefixed UTF-8 string, returning the bytes written.
pub fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<u64> {
    let len = u16::try_from(value.len()).map_err(|_| {
        VoicebankError::state(format!(
            "string of {} bytes exceeds the 65535-byte limit",
            value.len()
        ))
    })?;
    write_u16(writer, len)?;
    writer.write_all(value.as_bytes())?;
    Ok(2 + u64::from(len))
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u16(reader)? as usize;
    let buf = read_bytes(reader, len, "string")?;
    String::from_utf8(buf).map_err(|_| VoicebankError::format("string is not valid UTF-8"))
}

/// Converts a count to the `u32` stored on disk.
pub fn count_u32(count: usize, what: &str) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| VoicebankError::state(format!("{what} count {count} does not fit in 32 bits")))
}
