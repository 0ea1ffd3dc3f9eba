//! Join-cost precomputation over phoneme buckets.
//!
//! Every real half-phone unit is bucketed by phone: left halves on one
//! side, right halves on the other. Within a bucket each left unit is
//! scored against every right unit and only the `K` cheapest candidates
//! are kept. Buckets are independent, so they are scored by a pool of
//! worker threads; a single writer flushes results strictly in bucket
//! order through a reorder buffer.

use crate::binio::count_u32;
use crate::error::{Result, VoicebankError};
use crate::features::FeatureFile;
use crate::features::halfphone::{self, Half};
use crate::joincost::features::JoinCostFunction;
use crate::joincost::table::{JoinCostTableWriter, LeftUnitCosts};
use crossbeam_channel::{Receiver, bounded, unbounded};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::thread;
use tracing::{debug, info};

/// How many candidates to keep per left unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Percentage of the bucket's right units, 1..=100.
    pub percent: u32,
    /// Lower bound on the number kept (capped by the bucket size).
    pub min: usize,
}

impl RetentionPolicy {
    /// `K = clamp(n * percent / 100, min, n)`
    pub fn retain_count(&self, n: usize) -> usize {
        (n * self.percent as usize / 100).max(self.min).min(n)
    }
}

/// Units of one phone, split by half.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub phone: String,
    pub left: Vec<u32>,
    pub right: Vec<u32>,
}

impl Bucket {
    pub fn evaluations(&self) -> usize {
        self.left.len() * self.right.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrecomputeSummary {
    pub buckets: usize,
    pub left_units: usize,
    pub pairs: usize,
    pub evaluations: usize,
}

/// Buckets the real units of a half-phone feature file by phone, in
/// ascending phone value order. No audio is read.
pub fn bucket_units(features: &FeatureFile) -> Result<Vec<Bucket>> {
    let schema = &features.schema;
    let phone = schema.phone_index()?;
    let phone_def = &schema.features()[phone];
    schema.halfphone_index()?;

    let mut buckets: BTreeMap<usize, Bucket> = BTreeMap::new();
    for (index, vector) in features.vectors.iter().enumerate() {
        let Some(values) = vector.values() else {
            continue;
        };
        let unit = count_u32(index, "unit")?;
        let value = values[phone]
            .category()
            .ok_or_else(|| VoicebankError::format("phone feature is not categorical"))?;
        let bucket = buckets.entry(value).or_insert_with(|| Bucket {
            phone: phone_def.value_name(value).unwrap_or_default().to_string(),
            ..Bucket::default()
        });
        match halfphone::half_of(schema, vector)? {
            Some(Half::Left) => bucket.left.push(unit),
            Some(Half::Right) => bucket.right.push(unit),
            None => {
                return Err(VoicebankError::format(format!(
                    "unit {index} has no half-phone designator"
                )));
            }
        }
    }
    Ok(buckets.into_values().collect())
}

pub fn left_unit_count(buckets: &[Bucket]) -> usize {
    buckets.iter().map(|b| b.left.len()).sum()
}

/// Scores one bucket: every left unit against every right unit, keeping
/// the `K` cheapest by ascending cost.
///
/// The sort is stable over the bucket's right-unit order, so output is
/// deterministic, but which of several equal-cost units survive at the
/// K boundary is not part of the contract.
pub fn score_bucket<C>(bucket: &Bucket, cost: &C, policy: RetentionPolicy) -> Vec<LeftUnitCosts>
where
    C: JoinCostFunction + ?Sized,
{
    let k = policy.retain_count(bucket.right.len());
    bucket
        .left
        .iter()
        .map(|&left| {
            let mut scored: Vec<(u32, f32)> = bucket
                .right
                .iter()
                .map(|&right| (right, cost.cost(left as usize, right as usize) as f32))
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            scored.truncate(k);
            LeftUnitCosts {
                unit: left,
                candidates: scored,
            }
        })
        .collect()
}

/// Resolves a configured worker count; 0 means available parallelism.
pub fn resolve_workers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Scores every bucket on `workers` threads and writes the results in
/// bucket order.
///
/// `writer` must have been created for [`left_unit_count`] left units.
pub fn precompute<C, W>(
    buckets: &[Bucket],
    cost: &C,
    policy: RetentionPolicy,
    workers: usize,
    writer: &mut JoinCostTableWriter<W>,
) -> Result<PrecomputeSummary>
where
    C: JoinCostFunction + ?Sized,
    W: Write,
{
    let workers = resolve_workers(workers).clamp(1, buckets.len().max(1));
    let evaluations = buckets.iter().map(Bucket::evaluations).sum();

    let (job_tx, job_rx) = unbounded::<(usize, &Bucket)>();
    for job in buckets.iter().enumerate() {
        job_tx
            .send(job)
            .map_err(|_| VoicebankError::state("join-cost job queue closed"))?;
    }
    drop(job_tx);
    let (result_tx, result_rx) = bounded::<(usize, Vec<LeftUnitCosts>)>(workers * 2);

    let mut summary = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((seq, bucket)) = job_rx.recv() {
                        let records = score_bucket(bucket, cost, policy);
                        debug!(
                            phone = %bucket.phone,
                            left = bucket.left.len(),
                            right = bucket.right.len(),
                            "Bucket scored"
                        );
                        if result_tx.send((seq, records)).is_err() {
                            // Writer gave up
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(result_tx);

        let flushed = flush_in_order(result_rx, buckets, writer);
        for handle in handles {
            handle
                .join()
                .map_err(|_| VoicebankError::Other("join-cost worker panicked".to_string()))?;
        }
        flushed
    })?;
    summary.evaluations = evaluations;

    info!(
        buckets = summary.buckets,
        left_units = summary.left_units,
        pairs = summary.pairs,
        workers,
        "Join costs precomputed"
    );
    Ok(summary)
}

/// Single writer: buffers out-of-order results and flushes each bucket as
/// soon as all lower-numbered buckets have been written.
fn flush_in_order<W: Write>(
    results: Receiver<(usize, Vec<LeftUnitCosts>)>,
    buckets: &[Bucket],
    writer: &mut JoinCostTableWriter<W>,
) -> Result<PrecomputeSummary> {
    let mut pending: BTreeMap<usize, Vec<LeftUnitCosts>> = BTreeMap::new();
    let mut summary = PrecomputeSummary::default();
    let mut next = 0;
    for (seq, records) in results {
        pending.insert(seq, records);
        while let Some(records) = pending.remove(&next) {
            for record in &records {
                writer.push(record)?;
                summary.pairs += record.candidates.len();
            }
            summary.left_units += records.len();
            next += 1;
        }
    }
    if next != buckets.len() {
        return Err(VoicebankError::state(format!(
            "only {next} of {} join-cost buckets were scored",
            buckets.len()
        )));
    }
    summary.buckets = next;
    Ok(summary)
}
