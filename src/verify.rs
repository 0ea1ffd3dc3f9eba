//! Cross-file consistency checks.
//!
//! Every artifact is indexed by the same global unit index, so unit i must
//! be an edge in the unit table exactly when vector i is an edge vector.
//! The checks here work on already-materialized sequences and are shared
//! by the feature writer and the `verify` stage.

use crate::error::{Result, VoicebankError};
use crate::features::schema::FeatureSchema;
use crate::features::vector::FeatureVector;
use crate::units::UnitEntry;

/// Anything indexed by global unit index that can be an utterance boundary.
pub trait EdgeMarked {
    fn is_edge(&self) -> bool;
}

impl EdgeMarked for UnitEntry {
    fn is_edge(&self) -> bool {
        UnitEntry::is_edge(self)
    }
}

impl EdgeMarked for FeatureVector {
    fn is_edge(&self) -> bool {
        FeatureVector::is_edge(self)
    }
}

impl<T: EdgeMarked> EdgeMarked for &T {
    fn is_edge(&self) -> bool {
        (**self).is_edge()
    }
}

impl EdgeMarked for bool {
    fn is_edge(&self) -> bool {
        *self
    }
}

/// Requires a local schema to describe exactly the global vectors.
pub fn check_schema(utterance: &str, global: &FeatureSchema, local: &FeatureSchema) -> Result<()> {
    global
        .compatibility(local)
        .map_err(|message| VoicebankError::SchemaMismatch {
            utterance: utterance.to_string(),
            message,
        })
}

/// Requires unit `index` to exist and be an edge.
pub fn expect_edge(units: &[UnitEntry], index: usize, utterance: &str) -> Result<()> {
    match units.get(index) {
        Some(unit) if unit.is_edge() => Ok(()),
        Some(_) => Err(VoicebankError::alignment(
            utterance,
            index,
            "expected an edge unit, found a real unit",
        )),
        None => Err(VoicebankError::alignment(
            utterance,
            index,
            format!("unit table ends after {} units", units.len()),
        )),
    }
}

/// Requires unit `index` to exist and be a real unit.
pub fn expect_real(units: &[UnitEntry], index: usize, utterance: &str) -> Result<()> {
    match units.get(index) {
        Some(unit) if !unit.is_edge() => Ok(()),
        Some(_) => Err(VoicebankError::alignment(
            utterance,
            index,
            "expected a real unit, found an edge (more feature lines than units)",
        )),
        None => Err(VoicebankError::alignment(
            utterance,
            index,
            format!("unit table ends after {} units", units.len()),
        )),
    }
}

/// Walks two sequences in lockstep and requires matching edge placement
/// and equal length. Returns the common length.
///
/// `utterances` names the utterances in order and is only used to label errors.
pub fn check_alignment<A, B>(units: A, vectors: B, utterances: &[String]) -> Result<usize>
where
    A: IntoIterator,
    A::Item: EdgeMarked,
    B: IntoIterator,
    B::Item: EdgeMarked,
{
    let mut units = units.into_iter();
    let mut vectors = vectors.into_iter();
    let mut index = 0;
    // Edges seen so far; each utterance contributes two.
    let mut edges = 0;
    let name = |edges: usize| -> String {
        let ordinal = edges / 2 + 1;
        utterances
            .get(ordinal - 1)
            .cloned()
            .unwrap_or_else(|| format!("#{ordinal}"))
    };
    loop {
        match (units.next(), vectors.next()) {
            (None, None) => return Ok(index),
            (Some(unit), Some(vector)) => {
                if unit.is_edge() != vector.is_edge() {
                    let (u, v) = if unit.is_edge() {
                        ("an edge", "a real vector")
                    } else {
                        ("a real unit", "an edge vector")
                    };
                    return Err(VoicebankError::alignment(
                        &name(edges),
                        index,
                        format!("unit table has {u} where the feature file has {v}"),
                    ));
                }
                if unit.is_edge() {
                    edges += 1;
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(VoicebankError::alignment(
                    &name(edges),
                    index,
                    "files hold different numbers of units",
                ));
            }
        }
        index += 1;
    }
}

pub fn check_counts(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(VoicebankError::format(format!(
            "{what} holds {actual} units, unit table holds {expected}"
        )));
    }
    Ok(())
}

/// Requires each utterance's opening edge to sit where the lengths of the
/// utterances before it put it. Returns the summed length.
///
/// `lengths` are utterance lengths in samples at the unit table's rate.
pub fn check_utterance_offsets(
    units: &[UnitEntry],
    lengths: &[u64],
    utterances: &[String],
) -> Result<u64> {
    let openings: Vec<(usize, u64)> = units
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.is_edge())
        .step_by(2)
        .map(|(index, unit)| (index, unit.start()))
        .collect();
    if openings.len() != lengths.len() {
        return Err(VoicebankError::format(format!(
            "unit table holds {} utterances, pitch marks cover {}",
            openings.len(),
            lengths.len()
        )));
    }
    let mut offset = 0;
    for (ordinal, (&(index, start), length)) in openings.iter().zip(lengths).enumerate() {
        if start != offset {
            let name = utterances
                .get(ordinal)
                .cloned()
                .unwrap_or_else(|| format!("#{}", ordinal + 1));
            return Err(VoicebankError::alignment(
                &name,
                index,
                format!("utterance starts at sample {start}, pitch marks put it at {offset}"),
            ));
        }
        offset += length;
    }
    Ok(offset)
}

/// Requires a timeline to span exactly the samples the pitch marks cover.
pub fn check_duration(what: &str, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(VoicebankError::format(format!(
            "{what} spans {actual} samples, pitch marks cover {expected}"
        )));
    }
    Ok(())
}

/// Requires every index to name a real unit.
pub fn check_unit_refs<I>(what: &str, indices: I, units: &[UnitEntry]) -> Result<usize>
where
    I: IntoIterator<Item = u32>,
{
    let mut checked = 0;
    for index in indices {
        match units.get(index as usize) {
            Some(unit) if !unit.is_edge() => checked += 1,
            Some(_) => {
                return Err(VoicebankError::format(format!(
                    "{what} references edge unit {index}"
                )));
            }
            None => {
                return Err(VoicebankError::format(format!(
                    "{what} references unit {index} beyond the {} units",
                    units.len()
                )));
            }
        }
    }
    Ok(checked)
}
