//! Unit table construction as a fold over the utterance list.
//!
//! Each utterance contributes an opening edge, one real entry per label
//! (or two per label at half-phone granularity) and a closing edge. The
//! running global sample offset is threaded through the fold, so building
//! the table needs no I/O and no shared state.

use crate::track::{LabelTrack, seconds_to_samples};
use crate::units::Granularity;
use crate::units::entry::UnitEntry;
use crate::units::table::UnitTable;
use serde::Serialize;
use tracing::{debug, warn};

/// Everything the builder needs to know about one utterance.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub name: String,
    pub labels: LabelTrack,
    /// Pitch marks in samples at the unit table's sample rate.
    pub pitchmarks: Vec<u64>,
    /// Phone sequence of the utterance's feature dump, when available.
    pub reference: Option<Vec<String>>,
}

/// A label interval in local (utterance) samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub symbol: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub utterance: String,
    pub reason: String,
}

/// Result of the fold: the table plus accept/reject bookkeeping.
#[derive(Debug, Clone)]
pub struct UnitTableBuild {
    pub table: UnitTable,
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
    /// Global sample offset after the last accepted utterance.
    pub offset: u64,
}

impl UnitTableBuild {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            table: UnitTable::new(sample_rate, Vec::new()),
            accepted: Vec::new(),
            rejected: Vec::new(),
            offset: 0,
        }
    }

    /// Adds one utterance, or records why it was excluded.
    pub fn with_utterance(mut self, utterance: Utterance, granularity: Granularity) -> Self {
        match segment_utterance(&utterance, self.table.sample_rate, granularity) {
            Ok(segments) => {
                let length = utterance.pitchmarks.last().copied().unwrap_or(0);
                let entries = &mut self.table.entries;
                entries.push(UnitEntry::Edge { start: self.offset });
                let mut end = 0;
                for segment in &segments {
                    entries.push(UnitEntry::Real {
                        start: self.offset + segment.start,
                        duration: (segment.end - segment.start) as u32,
                    });
                    end = segment.end;
                }
                entries.push(UnitEntry::Edge {
                    start: self.offset + end,
                });
                debug!(
                    utterance = %utterance.name,
                    units = segments.len(),
                    offset = self.offset,
                    "Utterance segmented"
                );
                self.offset += length;
                self.accepted.push(utterance.name);
            }
            Err(reason) => {
                warn!(utterance = %utterance.name, %reason, "Utterance excluded");
                self.rejected.push(Rejection {
                    utterance: utterance.name,
                    reason,
                });
            }
        }
        self
    }
}

/// Folds the utterance list into a unit table.
pub fn build_unit_table<I>(utterances: I, sample_rate: u32, granularity: Granularity) -> UnitTableBuild
where
    I: IntoIterator<Item = Utterance>,
{
    utterances
        .into_iter()
        .fold(UnitTableBuild::new(sample_rate), |build, utterance| {
            build.with_utterance(utterance, granularity)
        })
}

/// Snaps label boundaries onto the utterance's pitch marks.
///
/// Returns the reason for rejection when the utterance cannot be aligned.
pub fn segment_utterance(
    utterance: &Utterance,
    sample_rate: u32,
    granularity: Granularity,
) -> std::result::Result<Vec<Segment>, String> {
    if utterance.labels.is_empty() {
        return Err("label track is empty".to_string());
    }
    if utterance.pitchmarks.is_empty() {
        return Err("no pitch marks".to_string());
    }
    if let Some(reference) = &utterance.reference {
        check_symbols(&utterance.labels.symbols(), reference)?;
    }

    let marks = boundary_marks(&utterance.pitchmarks);
    let mut segments = Vec::with_capacity(utterance.labels.len());
    let mut start = 0;
    for label in &utterance.labels.labels {
        let end = snap_to_marks(seconds_to_samples(label.end, sample_rate), &marks).max(start);
        segments.push(Segment {
            symbol: label.symbol.clone(),
            start,
            end,
        });
        start = end;
    }
    if let Some(segment) = segments.iter().find(|s| s.end - s.start > i32::MAX as u64) {
        return Err(format!("unit '{}' is too long", segment.symbol));
    }

    Ok(match granularity {
        Granularity::Phone => segments,
        Granularity::Halfphone => split_halfphones(&segments, &marks),
    })
}

/// Splits each phone at the pitch mark nearest its midpoint.
///
/// `marks` must contain both ends of every segment, which keeps each split
/// point inside its phone.
pub fn split_halfphones(segments: &[Segment], marks: &[u64]) -> Vec<Segment> {
    let mut halves = Vec::with_capacity(segments.len() * 2);
    for segment in segments {
        let middle = segment.start + (segment.end - segment.start) / 2;
        let split = snap_to_marks(middle, marks).clamp(segment.start, segment.end);
        halves.push(Segment {
            symbol: segment.symbol.clone(),
            start: segment.start,
            end: split,
        });
        halves.push(Segment {
            symbol: segment.symbol.clone(),
            start: split,
            end: segment.end,
        });
    }
    halves
}

/// Nearest mark to `target`; ties go to the earlier mark.
pub fn snap_to_marks(target: u64, marks: &[u64]) -> u64 {
    let pos = marks.partition_point(|&m| m < target);
    let after = marks.get(pos).copied();
    let before = pos.checked_sub(1).map(|i| marks[i]);
    match (before, after) {
        (Some(b), Some(a)) if a - target < target - b => a,
        (Some(b), _) => b,
        (None, Some(a)) => a,
        (None, None) => target,
    }
}

/// Pitch marks plus the utterance start at sample 0.
fn boundary_marks(pitchmarks: &[u64]) -> Vec<u64> {
    let mut marks = Vec::with_capacity(pitchmarks.len() + 1);
    marks.push(0);
    marks.extend(pitchmarks.iter().copied().filter(|&m| m > 0));
    marks.dedup();
    marks
}

fn check_symbols(labels: &[&str], reference: &[String]) -> std::result::Result<(), String> {
    if labels.len() != reference.len() {
        return Err(format!(
            "{} labels but {} feature lines",
            labels.len(),
            reference.len()
        ));
    }
    if let Some((i, (label, expected))) = labels
        .iter()
        .zip(reference)
        .enumerate()
        .find(|(_, (label, expected))| **label != expected.as_str())
    {
        return Err(format!(
            "label {i} is '{label}' but the feature dump has '{expected}'"
        ));
    }
    Ok(())
}
