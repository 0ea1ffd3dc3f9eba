//! Sparse time-to-byte index of a timeline.
//!
//! Entry `k` describes the datagram that contains grid time `k * interval`:
//! its start time and the byte offset at which it is stored. The grid is
//! fixed when the store is created and is independent of datagram
//! boundaries, so the index grows with total duration, not datagram count.

use crate::binio::{read_u64, write_u64};
use crate::error::{Result, VoicebankError};
use std::io::{Read, Write};

/// On-disk size of one index entry.
pub const INDEX_ENTRY_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Start time (samples) of the indexed datagram.
    pub time: u64,
    /// Absolute byte offset of the indexed datagram.
    pub byte_offset: u64,
}

/// Accumulates index entries while datagrams are appended.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    interval: u64,
    next_grid: u64,
    entries: Vec<IndexEntry>,
}

impl IndexBuilder {
    pub fn new(interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(VoicebankError::state(
                "index interval must be at least one sample",
            ));
        }
        Ok(Self {
            interval,
            next_grid: 0,
            entries: Vec::new(),
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Registers a datagram covering `[start, start + duration)` stored at `byte_offset`.
    ///
    /// Returns the number of entries added.
    pub fn record(&mut self, byte_offset: u64, start: u64, duration: u64) -> usize {
        let end = start + duration;
        let mut added = 0;
        while self.next_grid < end {
            self.entries.push(IndexEntry {
                time: start,
                byte_offset,
            });
            self.next_grid += self.interval;
            added += 1;
        }
        added
    }

    pub fn finish(self) -> TimeIndex {
        TimeIndex {
            entries: self.entries,
        }
    }
}

/// Loaded, immutable time index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeIndex {
    entries: Vec<IndexEntry>,
}

impl TimeIndex {
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let unsorted = entries
            .windows(2)
            .any(|w| w[1].time < w[0].time || w[1].byte_offset < w[0].byte_offset);
        if unsorted {
            return Err(VoicebankError::format("time index entries are not sorted"));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last entry whose time is at or before `time`.
    ///
    /// Stateless binary search; valid for queries in any order.
    pub fn entry_before(&self, time: u64) -> Option<IndexEntry> {
        let pos = self.entries.partition_point(|e| e.time <= time);
        if pos == 0 {
            self.entries.first().copied()
        } else {
            Some(self.entries[pos - 1])
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        for entry in &self.entries {
            write_u64(writer, entry.time)?;
            write_u64(writer, entry.byte_offset)?;
        }
        Ok(self.entries.len() as u64 * INDEX_ENTRY_SIZE)
    }

    /// Reads `byte_len` bytes of index entries.
    pub fn read_from<R: Read>(reader: &mut R, byte_len: u64) -> Result<Self> {
        if byte_len % INDEX_ENTRY_SIZE != 0 {
            return Err(VoicebankError::format(format!(
                "index region of {byte_len} bytes is not a whole number of entries"
            )));
        }
        let count = byte_len / INDEX_ENTRY_SIZE;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let time = read_u64(reader)?;
            let byte_offset = read_u64(reader)?;
            entries.push(IndexEntry { time, byte_offset });
        }
        Self::from_entries(entries)
    }
}
