//! Unit table file.
//!
//! The entry count is only known once every utterance has been processed,
//! so it is written as a placeholder and patched on close.

use crate::binio::{capacity_for, count_u32, read_u32, write_u32};
use crate::error::{Result, VoicebankError};
use crate::header::{self, ContentType, HEADER_SIZE};
use crate::units::entry::UnitEntry;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct UnitTableWriter<W: Write + Seek> {
    writer: W,
    count: usize,
}

impl UnitTableWriter<BufWriter<File>> {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), sample_rate)
    }
}

impl<W: Write + Seek> UnitTableWriter<W> {
    pub fn new(mut writer: W, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoicebankError::state("unit sample rate must be positive"));
        }
        header::write(&mut writer, ContentType::Units)?;
        write_u32(&mut writer, 0)?;
        write_u32(&mut writer, sample_rate)?;
        Ok(Self { writer, count: 0 })
    }

    pub fn push(&mut self, entry: &UnitEntry) -> Result<()> {
        entry.write_to(&mut self.writer)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Patches the entry count and flushes. Returns the number of entries.
    pub fn close(mut self) -> Result<usize> {
        let count = count_u32(self.count, "unit")?;
        self.writer.seek(SeekFrom::Start(HEADER_SIZE))?;
        write_u32(&mut self.writer, count)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.count)
    }
}

/// Fully loaded unit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTable {
    pub sample_rate: u32,
    pub entries: Vec<UnitEntry>,
}

impl UnitTable {
    pub fn new(sample_rate: u32, entries: Vec<UnitEntry>) -> Self {
        Self {
            sample_rate,
            entries,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(&mut BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        header::read_expecting(reader, ContentType::Units)?;
        let count = read_u32(reader)?;
        let sample_rate = read_u32(reader)?;
        if sample_rate == 0 {
            return Err(VoicebankError::format("unit table declares a zero sample rate"));
        }
        let mut entries = Vec::with_capacity(capacity_for(count as usize));
        for _ in 0..count {
            entries.push(UnitEntry::read_from(reader)?);
        }
        Ok(Self {
            sample_rate,
            entries,
        })
    }

    pub fn write(&self, path: &Path) -> Result<usize> {
        let mut writer = UnitTableWriter::create(path, self.sample_rate)?;
        for entry in &self.entries {
            writer.push(entry)?;
        }
        writer.close()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UnitEntry> {
        self.entries.get(index)
    }

    pub fn edge_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_edge()).count()
    }

    /// End of the last entry, in samples.
    pub fn total_duration(&self) -> u64 {
        self.entries.iter().map(UnitEntry::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<UnitEntry> {
        vec![
            UnitEntry::Edge { start: 0 },
            UnitEntry::Real {
                start: 0,
                duration: 1600,
            },
            UnitEntry::Real {
                start: 1600,
                duration: 3200,
            },
            UnitEntry::Edge { start: 4800 },
        ]
    }

    #[test]
    fn test_count_is_patched() {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = UnitTableWriter::new(&mut sink, 16000).unwrap();
            for entry in sample_entries() {
                writer.push(&entry).unwrap();
            }
            assert_eq!(writer.close().unwrap(), 4);
        }
        let bytes = sink.into_inner();
        assert_eq!(u32::from_be_bytes(bytes[12..16].try_into().unwrap()), 4);
        assert_eq!(bytes.len(), 12 + 8 + 4 * 12);

        let table = UnitTable::from_reader(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(table.sample_rate, 16000);
        assert_eq!(table.entries, sample_entries());
        assert_eq!(table.edge_count(), 2);
        assert_eq!(table.total_duration(), 4800);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(UnitTableWriter::new(Cursor::new(Vec::new()), 0).is_err());
    }

    #[test]
    fn test_truncated_table() {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = UnitTableWriter::new(&mut sink, 16000).unwrap();
            for entry in sample_entries() {
                writer.push(&entry).unwrap();
            }
            writer.close().unwrap();
        }
        let mut bytes = sink.into_inner();
        bytes.truncate(bytes.len() - 5);
        let err = UnitTable::from_reader(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, VoicebankError::Format { .. }));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.bin");
        let table = UnitTable::new(22050, sample_entries());
        assert_eq!(table.write(&path).unwrap(), 4);
        assert_eq!(UnitTable::read(&path).unwrap(), table);
    }
}
