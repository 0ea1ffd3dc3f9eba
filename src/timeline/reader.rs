//! Timeline reader with seek-by-time.
//!
//! Lookups go through the sparse index to the closest entry at or before
//! the requested time and then scan forward datagram by datagram. Every
//! lookup is stateless, so queries may arrive in any order.

use crate::binio::{capacity_for, read_string, read_u32, read_u64};
use crate::error::{Result, VoicebankError};
use crate::header::{self, ContentType};
use crate::timeline::datagram::{DATAGRAM_PREFIX_SIZE, Datagram, rescale_duration};
use crate::timeline::index::TimeIndex;
use crate::units::UnitEntry;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub struct TimelineReader<R: Read + Seek> {
    reader: R,
    processing_header: String,
    sample_rate: u32,
    datagram_count: u64,
    datagrams_pos: u64,
    index_pos: u64,
    index: TimeIndex,
    total_duration: u64,
}

impl TimelineReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> TimelineReader<R> {
    /// Validates the header and loads the index into memory.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        header::read_expecting(&mut reader, ContentType::Timeline)?;
        let processing_header = read_string(&mut reader)?;
        let sample_rate = read_u32(&mut reader)?;
        if sample_rate == 0 {
            return Err(VoicebankError::format("timeline declares a zero sample rate"));
        }
        let datagram_count = read_u64(&mut reader)?;
        let datagrams_pos = read_u64(&mut reader)?;
        let index_pos = read_u64(&mut reader)?;

        let fields_end = reader.stream_position()?;
        let file_len = reader.seek(SeekFrom::End(0))?;
        if datagrams_pos < fields_end || index_pos < datagrams_pos || index_pos > file_len {
            return Err(VoicebankError::format(format!(
                "inconsistent timeline offsets (datagrams {datagrams_pos}, index {index_pos}, length {file_len}); was the writer closed?"
            )));
        }

        if datagram_count > (index_pos - datagrams_pos) / DATAGRAM_PREFIX_SIZE {
            return Err(VoicebankError::format(format!(
                "timeline declares {datagram_count} datagrams in {} bytes",
                index_pos - datagrams_pos
            )));
        }

        reader.seek(SeekFrom::Start(index_pos))?;
        let index = TimeIndex::read_from(&mut reader, file_len - index_pos)?;

        let mut timeline = Self {
            reader,
            processing_header,
            sample_rate,
            datagram_count,
            datagrams_pos,
            index_pos,
            index,
            total_duration: 0,
        };
        timeline.total_duration = timeline.scan_total_duration()?;
        Ok(timeline)
    }

    pub fn processing_header(&self) -> &str {
        &self.processing_header
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn datagram_count(&self) -> u64 {
        self.datagram_count
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    /// Total duration in samples.
    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.total_duration as f64 / f64::from(self.sample_rate)
    }

    /// Time (seconds) of the index entry at or before `seconds`, after
    /// clamping the query to `[0, total_duration]`.
    pub fn closest_indexed_time(&self, seconds: f64) -> f64 {
        let clamped = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.total_duration_secs())
        };
        let samples = (clamped * f64::from(self.sample_rate)).round() as u64;
        match self.index.entry_before(samples) {
            Some(entry) => entry.time as f64 / f64::from(self.sample_rate),
            None => 0.0,
        }
    }

    /// Datagram whose `[start, end)` interval contains `time`, with its start.
    ///
    /// Times past the end resolve to the last datagram with a non-zero
    /// duration. Returns `None` only for an empty timeline.
    pub fn datagram_at(&mut self, time: u64) -> Result<Option<(u64, Datagram)>> {
        let Some(entry) = self.index.entry_before(time) else {
            return Ok(None);
        };
        self.reader.seek(SeekFrom::Start(entry.byte_offset))?;
        let mut pos = entry.byte_offset;
        let mut t = entry.time;
        let mut last = None;
        while pos < self.index_pos {
            let datagram = Datagram::read_from(&mut self.reader)?;
            pos += datagram.encoded_len();
            let end = t + u64::from(datagram.duration);
            if end > time {
                return Ok(Some((t, datagram)));
            }
            if datagram.duration > 0 {
                last = Some((t, datagram));
            }
            t = end;
        }
        Ok(last)
    }

    /// Datagrams overlapping `[start, end)` (timeline samples), in order.
    pub fn datagrams_in_span(&mut self, start: u64, end: u64) -> Result<Vec<Datagram>> {
        let mut out = Vec::new();
        if start >= end {
            return Ok(out);
        }
        let Some(entry) = self.index.entry_before(start) else {
            return Ok(out);
        };
        self.reader.seek(SeekFrom::Start(entry.byte_offset))?;
        let mut pos = entry.byte_offset;
        let mut t = entry.time;
        while pos < self.index_pos && t < end {
            let datagram = Datagram::read_from(&mut self.reader)?;
            pos += datagram.encoded_len();
            let datagram_end = t + u64::from(datagram.duration);
            if datagram_end > start {
                out.push(datagram);
            }
            t = datagram_end;
        }
        Ok(out)
    }

    /// Datagrams covering one unit whose times are expressed at `unit_sample_rate`.
    pub fn datagrams_for_unit(
        &mut self,
        unit: &UnitEntry,
        unit_sample_rate: u32,
    ) -> Result<Vec<Datagram>> {
        let UnitEntry::Real { start, duration } = *unit else {
            return Ok(Vec::new());
        };
        let from = rescale_duration(start, unit_sample_rate, self.sample_rate);
        let to = rescale_duration(
            start + u64::from(duration),
            unit_sample_rate,
            self.sample_rate,
        );
        self.datagrams_in_span(from, to)
    }

    /// Reads every datagram in storage order.
    pub fn read_all(&mut self) -> Result<Vec<Datagram>> {
        self.reader.seek(SeekFrom::Start(self.datagrams_pos))?;
        let mut pos = self.datagrams_pos;
        let mut out = Vec::with_capacity(capacity_for(self.datagram_count as usize));
        while pos < self.index_pos {
            let datagram = Datagram::read_from(&mut self.reader)?;
            pos += datagram.encoded_len();
            out.push(datagram);
        }
        if out.len() as u64 != self.datagram_count {
            return Err(VoicebankError::format(format!(
                "timeline declares {} datagrams but holds {}",
                self.datagram_count,
                out.len()
            )));
        }
        Ok(out)
    }

    /// Scans from the last index entry to the end of the datagram zone.
    fn scan_total_duration(&mut self) -> Result<u64> {
        let Some(last) = self.index.entries().last().copied() else {
            return Ok(0);
        };
        self.reader.seek(SeekFrom::Start(last.byte_offset))?;
        let mut pos = last.byte_offset;
        let mut t = last.time;
        while pos < self.index_pos {
            let datagram = Datagram::read_from(&mut self.reader)?;
            pos += datagram.encoded_len();
            t += u64::from(datagram.duration);
        }
        if pos != self.index_pos {
            return Err(VoicebankError::format(
                "last datagram overruns the index region",
            ));
        }
        Ok(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::writer::TimelineWriter;
    use std::io::Cursor;

    /// Builds an in-memory timeline at 100 Hz with a 1 s index grid.
    fn build(durations: &[u32]) -> TimelineReader<Cursor<Vec<u8>>> {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = TimelineWriter::new(&mut sink, 100, 1.0, "test").unwrap();
            for (i, d) in durations.iter().enumerate() {
                writer
                    .feed(Datagram::new(*d, vec![i as u8]), 100)
                    .unwrap();
            }
            writer.close().unwrap();
        }
        TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap()
    }

    #[test]
    fn test_header_fields() {
        let reader = build(&[30, 30, 30]);
        assert_eq!(reader.processing_header(), "test");
        assert_eq!(reader.sample_rate(), 100);
        assert_eq!(reader.datagram_count(), 3);
        assert_eq!(reader.total_duration(), 90);
    }

    #[test]
    fn test_rejects_other_content_type() {
        let mut buf = Vec::new();
        header::write(&mut buf, ContentType::Units).unwrap();
        let err = TimelineReader::from_reader(Cursor::new(buf)).err().unwrap();
        assert!(matches!(err, VoicebankError::WrongContentType { .. }));
    }

    #[test]
    fn test_datagram_at_every_time() {
        let durations = [70, 0, 50, 120, 10, 200];
        let mut reader = build(&durations);
        let mut start = 0u64;
        for (i, d) in durations.iter().enumerate() {
            for t in start..start + u64::from(*d) {
                let (found_start, datagram) = reader.datagram_at(t).unwrap().unwrap();
                assert_eq!(found_start, start);
                assert_eq!(datagram.payload, vec![i as u8], "time {t}");
            }
            start += u64::from(*d);
        }
        // Past the end: the last datagram
        let (s, datagram) = reader.datagram_at(10_000).unwrap().unwrap();
        assert_eq!(s, 250);
        assert_eq!(datagram.payload, vec![5]);
    }

    #[test]
    fn test_datagrams_in_span() {
        let mut reader = build(&[70, 50, 120, 10]);
        let ids = |v: Vec<Datagram>| v.into_iter().map(|d| d.payload[0]).collect::<Vec<_>>();
        assert_eq!(ids(reader.datagrams_in_span(0, 70).unwrap()), vec![0]);
        assert_eq!(ids(reader.datagrams_in_span(69, 71).unwrap()), vec![0, 1]);
        assert_eq!(ids(reader.datagrams_in_span(120, 250).unwrap()), vec![2, 3]);
        assert!(reader.datagrams_in_span(300, 400).unwrap().is_empty());
        assert!(reader.datagrams_in_span(50, 50).unwrap().is_empty());
    }

    #[test]
    fn test_datagrams_for_unit_scales_rate() {
        let mut reader = build(&[50, 50, 50, 50]);
        // unit at 200 Hz: [200, 300) -> timeline [100, 150)
        let unit = UnitEntry::Real {
            start: 200,
            duration: 100,
        };
        let found = reader.datagrams_for_unit(&unit, 200).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].payload, vec![2]);

        let edge = UnitEntry::Edge { start: 200 };
        assert!(reader.datagrams_for_unit(&edge, 200).unwrap().is_empty());
    }

    #[test]
    fn test_closest_indexed_time_clamps() {
        let reader = build(&[70, 50, 120, 10]);
        // grid 0 -> datagram at 0, grid 100 -> datagram at 70, grid 200 -> datagram at 120
        assert_eq!(reader.closest_indexed_time(-5.0), 0.0);
        assert_eq!(reader.closest_indexed_time(0.5), 0.0);
        assert_eq!(reader.closest_indexed_time(1.5), 1.2);
        assert_eq!(reader.closest_indexed_time(99.0), 1.2);
    }

    #[test]
    fn test_read_all() {
        let mut reader = build(&[1, 2, 3]);
        let all = reader.read_all().unwrap();
        assert_eq!(all.iter().map(|d| d.duration).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_timeline() {
        let mut reader = build(&[]);
        assert_eq!(reader.total_duration(), 0);
        assert!(reader.datagram_at(0).unwrap().is_none());
        assert_eq!(reader.closest_indexed_time(3.0), 0.0);
    }
}
