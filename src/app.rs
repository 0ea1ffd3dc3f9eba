//! Voice database build stages.
//!
//! Each stage reads the artifacts of the stages before it from the output
//! directory and writes its own:
//! units → timelines → features → join features → join costs
//!
//! The units stage decides which utterances are usable and writes
//! `accepted.lst`; every later stage iterates that list only.

use crate::basenames;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VoicebankError};
use crate::features::{FeatureDump, FeatureFile, FeatureFileWriter};
use crate::joincost::precompute::left_unit_count;
use crate::joincost::{
    JoinCostTable, JoinCostTableWriter, JoinFeatures, JoinWeights, PrecomputeSummary,
    bucket_units, precompute,
};
use crate::makers::{Waveform, feed_frames, feed_pitch_periods};
use crate::timeline::{TimelineReader, TimelineSummary, TimelineWriter};
use crate::track::{LabelTrack, Track, seconds_to_samples};
use crate::units::builder::UnitTableBuild;
use crate::units::{Granularity, Rejection, UnitTable, Utterance};
use crate::verify;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct UnitsReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    pub units: usize,
    pub edges: usize,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeaturesReport {
    pub utterances: usize,
    pub vectors: usize,
    pub halfphone: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct JoinFeaturesReport {
    pub units: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub units: usize,
    pub utterances: usize,
    pub join_features: Option<usize>,
    pub join_cost_refs: Option<usize>,
    pub timelines: Vec<(String, f64)>,
}

fn status(quiet: bool, message: impl std::fmt::Display) {
    if !quiet {
        eprintln!("{} {}", "✓".green(), message);
    }
}

fn step(quiet: bool, message: impl std::fmt::Display) {
    if !quiet {
        eprintln!("{} {}", "→".dimmed(), message.dimmed());
    }
}

fn output_file(config: &Config, file: &str) -> PathBuf {
    config.database.output_path(file)
}

fn ensure_output_dir(config: &Config) -> Result<()> {
    let dir = config.database.resolve(&config.database.output_dir);
    fs::create_dir_all(&dir)?;
    Ok(())
}

/// Utterances the units stage accepted.
fn accepted(config: &Config) -> Result<Vec<String>> {
    let names = basenames::load(&config.database.accepted_list())?;
    if names.is_empty() {
        return Err(VoicebankError::state("no accepted utterances"));
    }
    Ok(names)
}

/// Candidate utterances: the configured list, else every label file.
fn candidates(config: &Config) -> Result<Vec<String>> {
    match config.database.basenames_path() {
        Some(path) => basenames::load(&path),
        None => basenames::scan(&config.database.lab_dir(), &config.database.lab_ext),
    }
}

fn load_utterance(
    config: &Config,
    name: &str,
) -> std::result::Result<Utterance, Rejection> {
    let reject = |what: &str, e: VoicebankError| Rejection {
        utterance: name.to_string(),
        reason: format!("{what}: {e}"),
    };
    let db = &config.database;
    let labels = LabelTrack::load(&db.lab_path(name)).map_err(|e| reject("labels", e))?;
    let pitchmarks = Track::load(&db.pm_path(name))
        .map_err(|e| reject("pitch marks", e))?
        .sample_positions(config.units.sample_rate);
    let reference = FeatureDump::load(name, &db.features_path(name))
        .and_then(|dump| dump.phones())
        .map_err(|e| reject("feature dump", e))?;
    Ok(Utterance {
        name: name.to_string(),
        labels,
        pitchmarks,
        reference: Some(reference),
    })
}

/// Aligns labels to pitch marks, writes the unit table and `accepted.lst`.
pub fn run_units(config: &Config, quiet: bool) -> Result<UnitsReport> {
    config.validate()?;
    let started = Instant::now();
    let names = candidates(config)?;
    step(quiet, format!("Segmenting {} utterances", names.len()));

    let granularity = config.units.granularity;
    let build = names.iter().map(|name| load_utterance(config, name)).fold(
        UnitTableBuild::new(config.units.sample_rate),
        |mut build, loaded| match loaded {
            Ok(utterance) => build.with_utterance(utterance, granularity),
            Err(rejection) => {
                warn!(utterance = %rejection.utterance, reason = %rejection.reason, "Utterance excluded");
                build.rejected.push(rejection);
                build
            }
        },
    );
    if build.accepted.is_empty() {
        return Err(VoicebankError::state(format!(
            "none of the {} utterances could be aligned",
            names.len()
        )));
    }

    ensure_output_dir(config)?;
    let units = build
        .table
        .write(&output_file(config, defaults::UNITS_FILE))?;
    basenames::save(&config.database.accepted_list(), &build.accepted)?;

    let report = UnitsReport {
        accepted: build.accepted.len(),
        rejected: build.rejected,
        units,
        edges: build.table.edge_count(),
        granularity,
    };
    info!(
        accepted = report.accepted,
        rejected = report.rejected.len(),
        units,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Unit table written"
    );
    for rejection in &report.rejected {
        if !quiet {
            eprintln!(
                "  {} {}: {}",
                "excluded".yellow(),
                rejection.utterance,
                rejection.reason
            );
        }
    }
    status(
        quiet,
        format!(
            "Unit table: {} units from {} utterances ({} excluded)",
            report.units,
            report.accepted,
            report.rejected.len()
        ),
    );
    Ok(report)
}

/// Length of each utterance in samples at `rate`: its last pitch mark.
fn utterance_lengths(config: &Config, names: &[String], rate: u32) -> Result<Vec<u64>> {
    names
        .iter()
        .map(|name| {
            let marks = Track::load(&config.database.pm_path(name))?;
            Ok(marks.times.last().map_or(0, |&t| seconds_to_samples(t, rate)))
        })
        .collect()
}

/// Builds the waveform timeline: one datagram per pitch period.
pub fn run_wave_timeline(config: &Config, quiet: bool) -> Result<TimelineSummary> {
    config.validate()?;
    let names = accepted(config)?;
    step(quiet, format!("Cutting {} waveforms into pitch periods", names.len()));
    let path = output_file(config, defaults::WAVE_TIMELINE_FILE);
    let mut timeline = TimelineWriter::create(
        &path,
        config.timeline.sample_rate,
        config.timeline.index_interval_secs,
        defaults::WAVE_PROCESSING_HEADER,
    )?;
    for name in &names {
        let wave = Waveform::load(&config.database.wav_path(name))?;
        let marks = Track::load(&config.database.pm_path(name))?;
        let periods = feed_pitch_periods(&mut timeline, &wave, &marks.times)?;
        debug!(utterance = %name, periods, "Waveform fed");
    }
    let summary = timeline.close()?;
    status(quiet, timeline_line("Waveform timeline", &summary));
    Ok(summary)
}

/// Builds the parameter-frame timeline, padded to each utterance's last pitch mark.
pub fn run_frame_timeline(config: &Config, quiet: bool) -> Result<TimelineSummary> {
    config.validate()?;
    let names = accepted(config)?;
    step(quiet, format!("Feeding parameter frames of {} utterances", names.len()));
    let rate = config.timeline.sample_rate;
    let path = output_file(config, defaults::FRAME_TIMELINE_FILE);
    let mut timeline = TimelineWriter::create(
        &path,
        rate,
        config.timeline.index_interval_secs,
        defaults::FRAME_PROCESSING_HEADER,
    )?;
    for (name, end) in names.iter().zip(utterance_lengths(config, &names, rate)?) {
        let frames = Track::load(&config.database.mcep_path(name))?;
        let fed = feed_frames(&mut timeline, &frames, end)?;
        debug!(utterance = %name, frames = fed, end, "Frames fed");
    }
    let summary = timeline.close()?;
    status(quiet, timeline_line("Frame timeline", &summary));
    Ok(summary)
}

fn timeline_line(what: &str, summary: &TimelineSummary) -> String {
    format!(
        "{what}: {} datagrams, {:.1}s, {} index entries",
        summary.datagram_count,
        summary.total_duration as f64 / f64::from(summary.sample_rate),
        summary.index_entries
    )
}

/// Writes the feature vector file, checking every utterance against the unit table.
pub fn run_features(config: &Config, quiet: bool) -> Result<FeaturesReport> {
    config.validate()?;
    let names = accepted(config)?;
    let units = UnitTable::read(&output_file(config, defaults::UNITS_FILE))?;
    step(quiet, format!("Collecting feature vectors of {} utterances", names.len()));

    let db = &config.database;
    // The first accepted utterance defines the schema every other dump must match.
    let global = FeatureDump::load(&names[0], &db.features_path(&names[0]))?.schema;
    let halfphone = config.units.granularity == Granularity::Halfphone;
    let mut writer = FeatureFileWriter::create(
        &output_file(config, defaults::FEATURES_FILE),
        global,
        halfphone,
    )?;
    for name in &names {
        let dump = FeatureDump::load(name, &db.features_path(name))?;
        writer.append_utterance(name, &dump.schema, &dump.vectors, &units.entries)?;
    }
    let vectors = writer.close()?;
    verify::check_counts("feature file", units.len(), vectors)?;

    let report = FeaturesReport {
        utterances: names.len(),
        vectors,
        halfphone,
    };
    info!(vectors, halfphone, "Feature file written");
    status(quiet, format!("Feature file: {vectors} vectors"));
    Ok(report)
}

/// Frame width of a parameter-frame timeline, from the first real unit with frames.
fn first_frame_width<R: std::io::Read + std::io::Seek>(
    units: &UnitTable,
    frames: &mut TimelineReader<R>,
) -> Result<usize> {
    for unit in units.entries.iter().filter(|u| !u.is_edge()) {
        let found = frames
            .datagrams_for_unit(unit, units.sample_rate)?
            .into_iter()
            .find(|d| !d.payload.is_empty());
        if let Some(datagram) = found {
            return Ok(datagram.frame().len());
        }
    }
    Err(VoicebankError::state("frame timeline holds no parameter frames"))
}

/// Extracts left/right boundary frames of every unit.
pub fn run_join_features(config: &Config, quiet: bool) -> Result<JoinFeaturesReport> {
    config.validate()?;
    let units = UnitTable::read(&output_file(config, defaults::UNITS_FILE))?;
    let mut frames = TimelineReader::open(&output_file(config, defaults::FRAME_TIMELINE_FILE))?;
    let weights = match &config.join_cost.weights_file {
        Some(path) => JoinWeights::load(&config.database.resolve(path))?,
        None => {
            let width = first_frame_width(&units, &mut frames)?;
            debug!(width, "No weights file, using uniform weights");
            JoinWeights::uniform(width + 1)?
        }
    };
    step(quiet, format!("Extracting join features of {} units", units.len()));
    let features = JoinFeatures::compute(&units, &mut frames, weights)?;
    features.write(&output_file(config, defaults::JOIN_FEATURES_FILE))?;

    let report = JoinFeaturesReport {
        units: features.len(),
        width: features.width(),
    };
    info!(units = report.units, width = report.width, "Join features written");
    status(
        quiet,
        format!("Join features: {} units x {} values", report.units, report.width),
    );
    Ok(report)
}

/// Precomputes the pruned join-cost table.
pub fn run_join_costs(config: &Config, quiet: bool) -> Result<PrecomputeSummary> {
    config.validate()?;
    let started = Instant::now();
    let features = FeatureFile::read(&output_file(config, defaults::FEATURES_FILE))?;
    if !features.is_halfphone() {
        return Err(VoicebankError::state(
            "join costs are precomputed over half-phone units only",
        ));
    }
    let join = JoinFeatures::read(&output_file(config, defaults::JOIN_FEATURES_FILE))?;
    verify::check_counts("join-feature file", features.len(), join.len())?;

    let buckets = bucket_units(&features)?;
    step(
        quiet,
        format!(
            "Scoring {} phone buckets on {} workers",
            buckets.len(),
            crate::joincost::precompute::resolve_workers(config.join_cost.workers)
        ),
    );
    let path = output_file(config, defaults::JOIN_COSTS_FILE);
    let mut writer = JoinCostTableWriter::create(&path, left_unit_count(&buckets))?;
    let summary = precompute(
        &buckets,
        &join,
        config.join_cost.retention(),
        config.join_cost.workers,
        &mut writer,
    )?;
    writer.close()?;

    status(
        quiet,
        format!(
            "Join costs: {} pairs for {} left units in {:.1}s",
            summary.pairs,
            summary.left_units,
            started.elapsed().as_secs_f64()
        ),
    );
    Ok(summary)
}

/// Re-reads the written artifacts and checks them against each other.
///
/// The unit table and feature file are required; the join-feature file and
/// join-cost table are checked when present. Utterance offsets in the unit
/// table and the length of each present timeline must match the pitch marks
/// to the sample.
pub fn run_verify(config: &Config, quiet: bool) -> Result<VerifyReport> {
    config.validate()?;
    let names = accepted(config)?;
    let units = UnitTable::read(&output_file(config, defaults::UNITS_FILE))?;
    let features = FeatureFile::read(&output_file(config, defaults::FEATURES_FILE))?;
    let mut report = VerifyReport {
        units: verify::check_alignment(&units.entries, &features.vectors, &names)?,
        utterances: names.len(),
        ..VerifyReport::default()
    };
    verify::check_counts("unit table edges", names.len() * 2, units.edge_count())?;
    let lengths = utterance_lengths(config, &names, units.sample_rate)?;
    verify::check_utterance_offsets(&units.entries, &lengths, &names)?;

    let join_path = output_file(config, defaults::JOIN_FEATURES_FILE);
    if join_path.exists() {
        let join = JoinFeatures::read(&join_path)?;
        verify::check_counts("join-feature file", units.len(), join.len())?;
        report.join_features = Some(join.len());
    }

    let costs_path = output_file(config, defaults::JOIN_COSTS_FILE);
    if costs_path.exists() {
        let table = JoinCostTable::read(&costs_path)?;
        let refs = verify::check_unit_refs("join-cost table", table.unit_refs(), &units.entries)?;
        report.join_cost_refs = Some(refs);
    }

    for file in [defaults::WAVE_TIMELINE_FILE, defaults::FRAME_TIMELINE_FILE] {
        let path = output_file(config, file);
        if !path.exists() {
            continue;
        }
        let reader = TimelineReader::open(&path)?;
        let expected: u64 = utterance_lengths(config, &names, reader.sample_rate())?
            .iter()
            .sum();
        verify::check_duration(file, expected, reader.total_duration())?;
        report.timelines.push((file.to_string(), reader.total_duration_secs()));
    }

    info!(units = report.units, utterances = report.utterances, "Artifacts verified");
    status(
        quiet,
        format!(
            "Verified {} units over {} utterances",
            report.units, report.utterances
        ),
    );
    Ok(report)
}

/// Runs every stage in order, stopping at the first failure.
pub fn build_all(config: &Config, quiet: bool) -> Result<()> {
    run_units(config, quiet)?;
    run_wave_timeline(config, quiet)?;
    run_frame_timeline(config, quiet)?;
    run_features(config, quiet)?;
    run_join_features(config, quiet)?;
    if config.units.granularity == Granularity::Halfphone {
        run_join_costs(config, quiet)?;
    } else {
        warn!("Phone granularity: skipping join-cost precomputation");
    }
    run_verify(config, quiet)?;
    Ok(())
}

