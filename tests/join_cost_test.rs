// tests/join_cost_test.rs
//! Join-cost precomputation over a half-phone feature file
//!
//! Covers the retention rule, equal-cost candidates at the retention
//! boundary, bucket ordering and agreement between worker counts.

use std::io::Cursor;
use voicebank::features::{FeatureDump, FeatureFile, FeatureFileWriter};
use voicebank::joincost::precompute::left_unit_count;
use voicebank::joincost::{
    JoinCostFunction, JoinCostTable, JoinCostTableWriter, JoinFeatures, JoinWeights,
    RetentionPolicy, bucket_units, precompute,
};
use voicebank::units::UnitEntry;
use voicebank::verify;

const POLICY: RetentionPolicy = RetentionPolicy {
    percent: 10,
    min: 20,
};

/// One utterance holding `phones`, split into half-phones.
fn feature_file(phones: &[&str]) -> FeatureFile {
    let mut text = String::from("edge byte 0|start|end\nphone byte 0|a|b|c\n\n");
    for phone in phones {
        text.push_str(&format!("0 {phone}\n"));
    }
    let dump = FeatureDump::parse("u1", &text).unwrap();

    let mut units = vec![UnitEntry::Edge { start: 0 }];
    for i in 0..phones.len() * 2 {
        units.push(UnitEntry::Real {
            start: i as u64 * 80,
            duration: 80,
        });
    }
    units.push(UnitEntry::Edge {
        start: phones.len() as u64 * 160,
    });

    let mut sink = Cursor::new(Vec::new());
    {
        let mut writer = FeatureFileWriter::new(&mut sink, dump.schema.clone(), true).unwrap();
        writer
            .append_utterance("u1", &dump.schema, &dump.vectors, &units)
            .unwrap();
        writer.close().unwrap();
    }
    FeatureFile::from_reader(&mut Cursor::new(sink.into_inner())).unwrap()
}

/// One coefficient plus F0 per unit, drawn from a seeded generator.
fn random_join_features(units: usize, seed: u64) -> JoinFeatures {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut frame = || vec![rng.f32() * 10.0, 100.0 + rng.f32() * 50.0];
    let left = (0..units).map(|_| frame()).collect();
    let right = (0..units).map(|_| frame()).collect();
    JoinFeatures::new(JoinWeights::uniform(2).unwrap(), left, right).unwrap()
}

fn run(file: &FeatureFile, cost: &JoinFeatures, workers: usize) -> JoinCostTable {
    let buckets = bucket_units(file).unwrap();
    let mut sink = Vec::new();
    {
        let mut writer = JoinCostTableWriter::new(&mut sink, left_unit_count(&buckets)).unwrap();
        precompute(&buckets, cost, POLICY, workers, &mut writer).unwrap();
        writer.close().unwrap();
    }
    JoinCostTable::from_reader(&mut Cursor::new(sink)).unwrap()
}

#[test]
fn test_retains_the_cheapest_candidates() {
    // 300 'a' phones: 300 left halves, 300 right halves, K = 30
    let phones = vec!["a"; 300];
    let file = feature_file(&phones);
    let cost = random_join_features(file.len(), 7);
    let table = run(&file, &cost, 4);

    assert_eq!(table.len(), 300);
    let rights: Vec<usize> = (0..300).map(|i| 2 + 2 * i).collect();
    for entry in table.entries() {
        assert_eq!(entry.candidates.len(), 30);
        let mut brute: Vec<f32> = rights
            .iter()
            .map(|&r| cost.cost(entry.unit as usize, r) as f32)
            .collect();
        brute.sort_by(f32::total_cmp);
        let kept: Vec<f32> = entry.candidates.iter().map(|c| c.1).collect();
        assert_eq!(kept, brute[..30].to_vec(), "left unit {}", entry.unit);
    }
}

#[test]
fn test_small_bucket_keeps_everything() {
    let file = feature_file(&["b", "b", "b"]);
    let cost = random_join_features(file.len(), 8);
    let table = run(&file, &cost, 1);
    assert_eq!(table.len(), 3);
    assert_eq!(table.pair_count(), 9);
}

#[test]
fn test_equal_costs_still_keep_k_candidates() {
    let phones = vec!["a"; 250];
    let file = feature_file(&phones);
    let units = file.len();
    let flat = vec![vec![1.0, 120.0]; units];
    let cost = JoinFeatures::new(JoinWeights::uniform(2).unwrap(), flat.clone(), flat).unwrap();
    let table = run(&file, &cost, 3);

    for entry in table.entries() {
        // K = max(250 * 10 / 100, 20) = 25
        assert_eq!(entry.candidates.len(), 25);
        assert!(entry.candidates.iter().all(|c| c.1 == 0.0));
        let mut seen: Vec<u32> = entry.candidates.iter().map(|c| c.0).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }
}

#[test]
fn test_buckets_follow_phone_value_order() {
    let file = feature_file(&["c", "a", "b", "a", "c"]);
    let cost = random_join_features(file.len(), 9);
    let table = run(&file, &cost, 2);

    // Left halves sit at odd unit indices: c=1, a=3, b=5, a=7, c=9
    let order: Vec<u32> = table.entries().iter().map(|e| e.unit).collect();
    assert_eq!(order, vec![3, 7, 5, 1, 9]);
    // Right candidates stay within the bucket
    assert_eq!(
        {
            let mut r: Vec<u32> = table.candidates(3).unwrap().iter().map(|c| c.0).collect();
            r.sort_unstable();
            r
        },
        vec![4, 8]
    );
    assert!(table.cost(3, 2).is_none());
}

#[test]
fn test_worker_count_does_not_change_output() {
    let phones: Vec<&str> = (0..240).map(|i| ["a", "b", "c"][i % 3]).collect();
    let file = feature_file(&phones);
    let cost = random_join_features(file.len(), 10);

    let sequential = run(&file, &cost, 1);
    for workers in [2, 3, 8] {
        assert_eq!(run(&file, &cost, workers), sequential, "{workers} workers");
    }
}

#[test]
fn test_table_references_only_real_units() {
    let file = feature_file(&["a", "b", "a", "b"]);
    let cost = random_join_features(file.len(), 11);
    let table = run(&file, &cost, 2);

    let units: Vec<UnitEntry> = file
        .vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if v.is_edge() {
                UnitEntry::Edge { start: i as u64 }
            } else {
                UnitEntry::Real {
                    start: i as u64,
                    duration: 1,
                }
            }
        })
        .collect();
    let refs = verify::check_unit_refs("join-cost table", table.unit_refs(), &units).unwrap();
    assert_eq!(refs, table.len() + table.pair_count());
}
