//! One entry of the unit table.

use crate::binio::{read_i32, read_u64, write_i32, write_u64};
use crate::error::{Result, VoicebankError};
use serde::Serialize;
use std::io::{Read, Write};

/// Duration marker stored on disk for edge entries.
pub const EDGE_DURATION: i32 = -1;
/// On-disk size of one entry.
pub const UNIT_ENTRY_SIZE: u64 = 12;

/// A synthesis unit, or the sentinel framing an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitEntry {
    Real { start: u64, duration: u32 },
    /// Carries the global sample offset at which it occurs.
    Edge { start: u64 },
}

impl UnitEntry {
    pub fn start(&self) -> u64 {
        match *self {
            UnitEntry::Real { start, .. } | UnitEntry::Edge { start } => start,
        }
    }

    /// Duration in samples; 0 for edges.
    pub fn duration(&self) -> u32 {
        match *self {
            UnitEntry::Real { duration, .. } => duration,
            UnitEntry::Edge { .. } => 0,
        }
    }

    pub fn end(&self) -> u64 {
        self.start() + u64::from(self.duration())
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, UnitEntry::Edge { .. })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.start())?;
        match *self {
            UnitEntry::Real { duration, .. } => {
                let duration = i32::try_from(duration).map_err(|_| {
                    VoicebankError::state(format!("unit duration {duration} overflows 31 bits"))
                })?;
                write_i32(writer, duration)
            }
            UnitEntry::Edge { .. } => write_i32(writer, EDGE_DURATION),
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let start = read_u64(reader)?;
        match read_i32(reader)? {
            EDGE_DURATION => Ok(UnitEntry::Edge { start }),
            d if d >= 0 => Ok(UnitEntry::Real {
                start,
                duration: d as u32,
            }),
            d => Err(VoicebankError::format(format!("negative unit duration {d}"))),
        }
    }
}
