//! Sequential timeline writer.
//!
//! The datagram count and the index offset are unknown until the last
//! datagram has been fed, so they are written as placeholders and patched
//! in place by [`TimelineWriter::close`].

use crate::binio::{write_string, write_u32, write_u64};
use crate::error::{Result, VoicebankError};
use crate::header::{self, ContentType};
use crate::timeline::datagram::{Datagram, rescale_duration};
use crate::timeline::index::IndexBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Figures known only once a timeline has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    pub sample_rate: u32,
    pub datagram_count: u64,
    /// Total duration in samples.
    pub total_duration: u64,
    pub index_entries: usize,
}

#[derive(Debug)]
pub struct TimelineWriter<W: Write + Seek> {
    writer: W,
    sample_rate: u32,
    index: IndexBuilder,
    /// Offset of the datagram-count field (followed by the two byte offsets).
    fields_pos: u64,
    datagrams_pos: u64,
    byte_pos: u64,
    time_pos: u64,
    count: u64,
}

impl TimelineWriter<BufWriter<File>> {
    /// Creates a timeline file at `path`.
    pub fn create(
        path: &Path,
        sample_rate: u32,
        index_interval_secs: f64,
        processing_header: &str,
    ) -> Result<Self> {
        validate_params(sample_rate, index_interval_secs)?;
        let file = File::create(path)?;
        Self::new(
            BufWriter::new(file),
            sample_rate,
            index_interval_secs,
            processing_header,
        )
    }
}

impl<W: Write + Seek> TimelineWriter<W> {
    /// Starts a timeline on an arbitrary seekable sink positioned at offset 0.
    pub fn new(
        mut writer: W,
        sample_rate: u32,
        index_interval_secs: f64,
        processing_header: &str,
    ) -> Result<Self> {
        let interval = validate_params(sample_rate, index_interval_secs)?;
        let index = IndexBuilder::new(interval)?;

        let mut pos = header::write(&mut writer, ContentType::Timeline)?;
        pos += write_string(&mut writer, processing_header)?;
        write_u32(&mut writer, sample_rate)?;
        pos += 4;
        let fields_pos = pos;
        let datagrams_pos = fields_pos + 24;
        write_u64(&mut writer, 0)?;
        write_u64(&mut writer, datagrams_pos)?;
        write_u64(&mut writer, 0)?;

        Ok(Self {
            writer,
            sample_rate,
            index,
            fields_pos,
            datagrams_pos,
            byte_pos: datagrams_pos,
            time_pos: 0,
            count: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current time position in samples.
    pub fn time_position(&self) -> u64 {
        self.time_pos
    }

    pub fn datagram_count(&self) -> u64 {
        self.count
    }

    /// Appends one datagram whose duration is expressed at `declared_rate`.
    pub fn feed(&mut self, mut datagram: Datagram, declared_rate: u32) -> Result<()> {
        if declared_rate == 0 {
            return Err(VoicebankError::state(
                "declared sample rate must be positive",
            ));
        }
        if declared_rate != self.sample_rate {
            let scaled =
                rescale_duration(u64::from(datagram.duration), declared_rate, self.sample_rate);
            datagram.duration = u32::try_from(scaled).map_err(|_| {
                VoicebankError::state(format!("rescaled duration {scaled} overflows 32 bits"))
            })?;
        }

        let duration = u64::from(datagram.duration);
        self.index.record(self.byte_pos, self.time_pos, duration);
        self.byte_pos += datagram.write_to(&mut self.writer)?;
        self.time_pos += duration;
        self.count += 1;
        Ok(())
    }

    /// Writes the index, patches the deferred header fields and flushes.
    pub fn close(mut self) -> Result<TimelineSummary> {
        let index_pos = self.byte_pos;
        let index = self.index.finish();
        index.write_to(&mut self.writer)?;

        self.writer.seek(SeekFrom::Start(self.fields_pos))?;
        write_u64(&mut self.writer, self.count)?;
        write_u64(&mut self.writer, self.datagrams_pos)?;
        write_u64(&mut self.writer, index_pos)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;

        debug!(
            datagrams = self.count,
            duration = self.time_pos,
            index_entries = index.len(),
            "Timeline closed"
        );

        Ok(TimelineSummary {
            sample_rate: self.sample_rate,
            datagram_count: self.count,
            total_duration: self.time_pos,
            index_entries: index.len(),
        })
    }
}

/// Returns the index interval in samples.
fn validate_params(sample_rate: u32, index_interval_secs: f64) -> Result<u64> {
    if sample_rate == 0 {
        return Err(VoicebankError::state("sample rate must be positive"));
    }
    if !index_interval_secs.is_finite() || index_interval_secs <= 0.0 {
        return Err(VoicebankError::state(format!(
            "index interval must be positive, got {index_interval_secs}"
        )));
    }
    let interval = (index_interval_secs * f64::from(sample_rate)).round() as u64;
    if interval == 0 {
        return Err(VoicebankError::state(format!(
            "index interval of {index_interval_secs}s is shorter than one sample"
        )));
    }
    Ok(interval)
}
