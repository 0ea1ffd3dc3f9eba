//! Precomputed join-cost table.

use crate::binio::{capacity_for, count_u32, read_f32, read_u32, write_f32, write_u32};
use crate::error::{Result, VoicebankError};
use crate::header::{self, ContentType};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Retained candidates of one left unit, by ascending cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeftUnitCosts {
    pub unit: u32,
    pub candidates: Vec<(u32, f32)>,
}

/// Streams left-unit records; the left-unit count is declared up front.
pub struct JoinCostTableWriter<W: Write> {
    writer: W,
    declared: usize,
    written: usize,
    pairs: usize,
}

impl JoinCostTableWriter<BufWriter<File>> {
    pub fn create(path: &Path, left_units: usize) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), left_units)
    }
}

impl<W: Write> JoinCostTableWriter<W> {
    pub fn new(mut writer: W, left_units: usize) -> Result<Self> {
        header::write(&mut writer, ContentType::PrecomputedJoinCosts)?;
        write_u32(&mut writer, count_u32(left_units, "left unit")?)?;
        Ok(Self {
            writer,
            declared: left_units,
            written: 0,
            pairs: 0,
        })
    }

    pub fn push(&mut self, record: &LeftUnitCosts) -> Result<()> {
        if self.written == self.declared {
            return Err(VoicebankError::state(format!(
                "join-cost table declared {} left units",
                self.declared
            )));
        }
        write_u32(&mut self.writer, record.unit)?;
        write_u32(
            &mut self.writer,
            count_u32(record.candidates.len(), "candidate")?,
        )?;
        for (right, cost) in &record.candidates {
            write_u32(&mut self.writer, *right)?;
            write_f32(&mut self.writer, *cost)?;
        }
        self.written += 1;
        self.pairs += record.candidates.len();
        Ok(())
    }

    /// Flushes and returns the number of (left, right) pairs written.
    pub fn close(mut self) -> Result<usize> {
        if self.written != self.declared {
            return Err(VoicebankError::state(format!(
                "join-cost table declared {} left units but {} were written",
                self.declared, self.written
            )));
        }
        self.writer.flush()?;
        Ok(self.pairs)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinCostTable {
    entries: Vec<LeftUnitCosts>,
    by_unit: HashMap<u32, usize>,
}

impl JoinCostTable {
    pub fn new(entries: Vec<LeftUnitCosts>) -> Result<Self> {
        let mut by_unit = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if by_unit.insert(entry.unit, i).is_some() {
                return Err(VoicebankError::format(format!(
                    "left unit {} appears twice in the join-cost table",
                    entry.unit
                )));
            }
        }
        Ok(Self { entries, by_unit })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(&mut BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        header::read_expecting(reader, ContentType::PrecomputedJoinCosts)?;
        let count = read_u32(reader)?;
        let mut entries = Vec::with_capacity(capacity_for(count as usize));
        for _ in 0..count {
            let unit = read_u32(reader)?;
            let k = read_u32(reader)?;
            let mut candidates = Vec::with_capacity(capacity_for(k as usize));
            for _ in 0..k {
                candidates.push((read_u32(reader)?, read_f32(reader)?));
            }
            entries.push(LeftUnitCosts { unit, candidates });
        }
        Self::new(entries)
    }

    pub fn entries(&self) -> &[LeftUnitCosts] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of retained (left, right) pairs.
    pub fn pair_count(&self) -> usize {
        self.entries.iter().map(|e| e.candidates.len()).sum()
    }

    pub fn candidates(&self, left: u32) -> Option<&[(u32, f32)]> {
        self.by_unit
            .get(&left)
            .map(|&i| self.entries[i].candidates.as_slice())
    }

    /// Precomputed cost of `left` followed by `right`, if it was retained.
    pub fn cost(&self, left: u32, right: u32) -> Option<f32> {
        self.candidates(left)?
            .iter()
            .find(|(r, _)| *r == right)
            .map(|(_, c)| *c)
    }

    /// Every unit index the table references.
    pub fn unit_refs(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().flat_map(|e| {
            std::iter::once(e.unit).chain(e.candidates.iter().map(|(r, _)| *r))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records() -> Vec<LeftUnitCosts> {
        vec![
            LeftUnitCosts {
                unit: 1,
                candidates: vec![(4, 0.5), (2, 1.5)],
            },
            LeftUnitCosts {
                unit: 3,
                candidates: vec![(2, 0.25)],
            },
        ]
    }

    fn encode(records: &[LeftUnitCosts]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = JoinCostTableWriter::new(&mut buf, records.len()).unwrap();
        for record in records {
            writer.push(record).unwrap();
        }
        assert_eq!(writer.close().unwrap(), 3);
        buf
    }

    #[test]
    fn test_layout_and_lookup() {
        let buf = encode(&records());
        // header + count + (8 + 2 * 8) + (8 + 8)
        assert_eq!(buf.len(), 12 + 4 + 24 + 16);
        let table = JoinCostTable::from_reader(&mut Cursor::new(buf)).unwrap();
        assert_eq!(table.entries(), records().as_slice());
        assert_eq!(table.cost(1, 2), Some(1.5));
        assert_eq!(table.cost(1, 3), None);
        assert_eq!(table.cost(9, 2), None);
        assert_eq!(table.pair_count(), 3);
        assert_eq!(table.unit_refs().collect::<Vec<_>>(), vec![1, 4, 2, 3, 2]);
    }

    #[test]
    fn test_declared_count_enforced() {
        let mut buf = Vec::new();
        let mut writer = JoinCostTableWriter::new(&mut buf, 1).unwrap();
        writer.push(&records()[0]).unwrap();
        assert!(writer.push(&records()[1]).is_err());

        let writer = JoinCostTableWriter::new(Vec::new(), 2).unwrap();
        assert!(writer.close().is_err());
    }

    #[test]
    fn test_duplicate_left_unit_rejected() {
        let mut dup = records();
        dup[1].unit = 1;
        assert!(JoinCostTable::new(dup).is_err());
    }
}
