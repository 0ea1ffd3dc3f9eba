//! Boundary frames used to score joins, and the file that stores them.
//!
//! For every unit the file holds a left frame (at the unit's start) and a
//! right frame (at its end). Each frame is the parameter-frame coefficients
//! followed by one F0 value. Edge units store all-zero frames.

use crate::binio::{
    capacity_for, count_u32, read_f32, read_string, read_u32, write_f32, write_string, write_u32,
};
use crate::error::{Result, VoicebankError};
use crate::header::{self, ContentType};
use crate::joincost::weights::{FeatureWeight, JoinWeights};
use crate::timeline::{Datagram, TimelineReader, rescale_duration};
use crate::units::UnitTable;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tracing::debug;

/// Cost of joining unit `left` to a following unit `right`.
pub trait JoinCostFunction: Send + Sync {
    fn cost(&self, left: usize, right: usize) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinFeatures {
    weights: JoinWeights,
    /// Frame width: coefficients plus F0.
    width: usize,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl JoinFeatures {
    pub fn new(weights: JoinWeights, left: Vec<Vec<f32>>, right: Vec<Vec<f32>>) -> Result<Self> {
        let width = weights.len();
        if left.len() != right.len() {
            return Err(VoicebankError::format(format!(
                "{} left frames but {} right frames",
                left.len(),
                right.len()
            )));
        }
        if let Some(frame) = left.iter().chain(&right).find(|f| f.len() != width) {
            return Err(VoicebankError::format(format!(
                "frame of width {} does not match {width} join-cost weights",
                frame.len()
            )));
        }
        Ok(Self {
            weights,
            width,
            left: left.concat(),
            right: right.concat(),
        })
    }

    /// Extracts boundary frames for every unit from a parameter-frame timeline.
    ///
    /// F0 is derived from the frame durations and averaged across each unit
    /// boundary, with edge units counting as 0 Hz.
    pub fn compute<R: Read + Seek>(
        units: &UnitTable,
        frames: &mut TimelineReader<R>,
        weights: JoinWeights,
    ) -> Result<Self> {
        let coefficients = weights.len() - 1;
        let rate = f64::from(frames.sample_rate());
        let mut left = Vec::with_capacity(units.len());
        let mut right = Vec::with_capacity(units.len());
        let mut left_f0 = Vec::with_capacity(units.len());
        let mut right_f0 = Vec::with_capacity(units.len());

        for (index, unit) in units.entries.iter().enumerate() {
            if unit.is_edge() {
                left.push(vec![0.0; coefficients]);
                right.push(vec![0.0; coefficients]);
                left_f0.push(0.0);
                right_f0.push(0.0);
                continue;
            }
            let mut datagrams: Vec<Datagram> = frames
                .datagrams_for_unit(unit, units.sample_rate)?
                .into_iter()
                .filter(|d| !d.payload.is_empty())
                .collect();
            if datagrams.is_empty() {
                // Zero-length unit: use the frame at its start.
                let start = rescale_duration(
                    unit.start(),
                    units.sample_rate,
                    frames.sample_rate(),
                );
                datagrams.extend(frames.datagram_at(start)?.map(|(_, d)| d));
            }
            let (Some(first), Some(last)) = (datagrams.first(), datagrams.last()) else {
                return Err(VoicebankError::format(format!(
                    "no parameter frames cover unit {index}"
                )));
            };
            let (first_frame, last_frame) = (first.frame(), last.frame());
            for frame in [&first_frame, &last_frame] {
                if frame.len() != coefficients {
                    return Err(VoicebankError::format(format!(
                        "unit {index}: frame has {} coefficients, weights expect {coefficients} plus F0",
                        frame.len()
                    )));
                }
            }
            left_f0.push(f0(first.duration, rate));
            right_f0.push(f0(last.duration, rate));
            left.push(first_frame);
            right.push(last_frame);
        }

        for (i, unit) in units.entries.iter().enumerate() {
            if unit.is_edge() {
                left[i].push(0.0);
                right[i].push(0.0);
                continue;
            }
            let before = if i > 0 { right_f0[i - 1] } else { 0.0 };
            let after = left_f0.get(i + 1).copied().unwrap_or(0.0);
            left[i].push(((left_f0[i] + before) / 2.0) as f32);
            right[i].push(((right_f0[i] + after) / 2.0) as f32);
        }

        debug!(units = units.len(), width = weights.len(), "Join features extracted");
        Self::new(weights, left, right)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(&mut BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        header::read_expecting(reader, ContentType::JoinFeatures)?;
        let count = read_u32(reader)? as usize;
        let mut weights = Vec::with_capacity(capacity_for(count));
        for _ in 0..count {
            let weight = read_f32(reader)?;
            let function = read_string(reader)?.parse()?;
            weights.push(FeatureWeight { weight, function });
        }
        let weights = JoinWeights::new(weights)?;
        let units = read_u32(reader)? as usize;
        let mut left = Vec::with_capacity(capacity_for(units.saturating_mul(count)));
        let mut right = Vec::with_capacity(capacity_for(units.saturating_mul(count)));
        for _ in 0..units {
            for _ in 0..count {
                left.push(read_f32(reader)?);
            }
            for _ in 0..count {
                right.push(read_f32(reader)?);
            }
        }
        Ok(Self {
            weights,
            width: count,
            left,
            right,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        header::write(writer, ContentType::JoinFeatures)?;
        write_u32(writer, count_u32(self.width, "join feature")?)?;
        for weight in self.weights.iter() {
            write_f32(writer, weight.weight)?;
            write_string(writer, &weight.function.to_string())?;
        }
        write_u32(writer, count_u32(self.len(), "unit")?)?;
        for unit in 0..self.len() {
            for v in self.left_frame(unit) {
                write_f32(writer, *v)?;
            }
            for v in self.right_frame(unit) {
                write_f32(writer, *v)?;
            }
        }
        Ok(())
    }

    pub fn weights(&self) -> &JoinWeights {
        &self.weights
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.left.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn left_frame(&self, unit: usize) -> &[f32] {
        &self.left[unit * self.width..(unit + 1) * self.width]
    }

    pub fn right_frame(&self, unit: usize) -> &[f32] {
        &self.right[unit * self.width..(unit + 1) * self.width]
    }
}

impl JoinCostFunction for JoinFeatures {
    /// Weighted distance between the end of `left` and the start of `right`.
    fn cost(&self, left: usize, right: usize) -> f64 {
        self.weights
            .distance(self.right_frame(left), self.left_frame(right))
    }
}

fn f0(duration: u32, sample_rate: f64) -> f64 {
    if duration == 0 {
        0.0
    } else {
        sample_rate / f64::from(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineWriter;
    use crate::units::UnitEntry;
    use std::io::Cursor;

    fn weights(n: usize) -> JoinWeights {
        JoinWeights::uniform(n).unwrap()
    }

    /// Frame timeline at 1000 Hz: frames of 10 samples (100 Hz F0) with
    /// coefficient value equal to the frame number.
    fn frames(count: usize, duration: u32) -> TimelineReader<Cursor<Vec<u8>>> {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = TimelineWriter::new(&mut sink, 1000, 0.05, "mcep").unwrap();
            for i in 0..count {
                writer
                    .feed(Datagram::from_frame(duration, &[i as f32, 1.0]), 1000)
                    .unwrap();
            }
            writer.close().unwrap();
        }
        TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap()
    }

    fn table() -> UnitTable {
        UnitTable::new(
            1000,
            vec![
                UnitEntry::Edge { start: 0 },
                UnitEntry::Real {
                    start: 0,
                    duration: 30,
                },
                UnitEntry::Real {
                    start: 30,
                    duration: 20,
                },
                UnitEntry::Edge { start: 50 },
            ],
        )
    }

    #[test]
    fn test_compute_boundary_frames() {
        let mut timeline = frames(5, 10);
        let features = JoinFeatures::compute(&table(), &mut timeline, weights(3)).unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features.left_frame(0), &[0.0, 0.0, 0.0]);
        // unit 1 covers frames 0..3; its left neighbour is an edge
        assert_eq!(features.left_frame(1), &[0.0, 1.0, 50.0]);
        assert_eq!(features.right_frame(1), &[2.0, 1.0, 100.0]);
        // unit 2 covers frames 3..5; its right neighbour is an edge
        assert_eq!(features.left_frame(2), &[3.0, 1.0, 100.0]);
        assert_eq!(features.right_frame(2), &[4.0, 1.0, 50.0]);
        assert_eq!(features.right_frame(3), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_f0_is_averaged_across_boundary() {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = TimelineWriter::new(&mut sink, 1000, 0.05, "mcep").unwrap();
            for d in [10, 10, 10, 5, 5, 5, 5] {
                writer.feed(Datagram::from_frame(d, &[0.0]), 1000).unwrap();
            }
            writer.close().unwrap();
        }
        let mut timeline = TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap();
        let features = JoinFeatures::compute(&table(), &mut timeline, weights(2)).unwrap();
        // right F0 of unit 1 is 100 Hz, left F0 of unit 2 is 200 Hz
        assert_eq!(features.right_frame(1)[1], 150.0);
        assert_eq!(features.left_frame(2)[1], 150.0);
    }

    #[test]
    fn test_width_mismatch() {
        let mut timeline = frames(5, 10);
        let err = JoinFeatures::compute(&table(), &mut timeline, weights(5)).unwrap_err();
        assert!(err.to_string().contains("coefficients"));
    }

    #[test]
    fn test_cost_uses_right_then_left_frame() {
        let features = JoinFeatures::new(
            weights(2),
            vec![vec![0.0, 0.0], vec![4.0, 4.0]],
            vec![vec![2.0, 2.0], vec![0.0, 0.0]],
        )
        .unwrap();
        // right(0) = [2, 2] vs left(1) = [4, 4]
        assert_eq!(features.cost(0, 1), 2.0);
        assert_eq!(features.cost(1, 0), 0.0);
    }

    #[test]
    fn test_file_layout() {
        let features = JoinFeatures::new(
            weights(2),
            vec![vec![1.0, 2.0]],
            vec![vec![3.0, 4.0]],
        )
        .unwrap();
        let mut buf = Vec::new();
        features.write_to(&mut buf).unwrap();
        // header + count + 2 * (weight + "linear") + unit count + 4 floats
        assert_eq!(buf.len(), 12 + 4 + 2 * (4 + 2 + 6) + 4 + 16);
        let back = JoinFeatures::from_reader(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, features);
    }

    #[test]
    fn test_rejects_bad_frame_width() {
        assert!(JoinFeatures::new(weights(2), vec![vec![1.0]], vec![vec![1.0]]).is_err());
    }
}
