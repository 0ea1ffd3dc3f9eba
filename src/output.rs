//! Artifact summaries for `voicebank inspect`.
//!
//! Every artifact is identified by its container header first; the rest of
//! the file is only read through the matching typed reader.

use crate::error::{Result, VoicebankError};
use crate::features::FeatureFile;
use crate::header::{self, ContentType};
use crate::joincost::{JoinCostTable, JoinFeatures};
use crate::timeline::TimelineReader;
use crate::units::UnitTable;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub path: String,
    pub content_type: ContentType,
    pub details: Details,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Details {
    Units {
        sample_rate: u32,
        units: usize,
        edges: usize,
        duration_secs: f64,
    },
    Features {
        halfphone: bool,
        vectors: usize,
        edges: usize,
        features: Vec<SchemaLine>,
    },
    Timeline {
        processing_header: String,
        sample_rate: u32,
        datagrams: u64,
        duration_secs: f64,
        index_entries: usize,
    },
    JoinFeatures {
        units: usize,
        width: usize,
        weights: Vec<String>,
    },
    JoinCosts {
        left_units: usize,
        pairs: usize,
    },
    /// Known header but no reader for the content.
    HeaderOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaLine {
    pub name: String,
    pub kind: &'static str,
    pub values: usize,
}

/// Reads the artifact at `path` and summarizes it.
pub fn inspect(path: &Path) -> Result<Inspection> {
    let content_type = header::peek(path)?;
    let details = match content_type {
        ContentType::Units => {
            let table = UnitTable::read(path)?;
            Details::Units {
                sample_rate: table.sample_rate,
                units: table.len(),
                edges: table.edge_count(),
                duration_secs: table.total_duration() as f64 / f64::from(table.sample_rate),
            }
        }
        ContentType::UnitFeatures | ContentType::HalfphoneUnitFeatures => {
            let file = FeatureFile::read(path)?;
            Details::Features {
                halfphone: file.is_halfphone(),
                vectors: file.len(),
                edges: file.vectors.iter().filter(|v| v.is_edge()).count(),
                features: file
                    .schema
                    .features()
                    .iter()
                    .map(|def| SchemaLine {
                        name: def.name.clone(),
                        kind: def.kind.name(),
                        values: def.values.len(),
                    })
                    .collect(),
            }
        }
        ContentType::Timeline => {
            let reader = TimelineReader::open(path)?;
            Details::Timeline {
                processing_header: reader.processing_header().to_string(),
                sample_rate: reader.sample_rate(),
                datagrams: reader.datagram_count(),
                duration_secs: reader.total_duration_secs(),
                index_entries: reader.index().len(),
            }
        }
        ContentType::JoinFeatures => {
            let features = JoinFeatures::read(path)?;
            Details::JoinFeatures {
                units: features.len(),
                width: features.width(),
                weights: features
                    .weights()
                    .iter()
                    .map(|w| format!("{:.4} {}", w.weight, w.function))
                    .collect(),
            }
        }
        ContentType::PrecomputedJoinCosts => {
            let table = JoinCostTable::read(path)?;
            Details::JoinCosts {
                left_units: table.len(),
                pairs: table.pair_count(),
            }
        }
        ContentType::Unknown | ContentType::Carts => Details::HeaderOnly,
    };
    Ok(Inspection {
        path: path.display().to_string(),
        content_type,
        details,
    })
}

pub fn render_json(inspection: &Inspection) -> Result<String> {
    serde_json::to_string_pretty(inspection).map_err(|e| VoicebankError::Other(e.to_string()))
}

/// Plain multi-line summary.
pub fn render_text(inspection: &Inspection) -> String {
    let mut out = vec![format!("{} ({})", inspection.path, inspection.content_type)];
    match &inspection.details {
        Details::Units {
            sample_rate,
            units,
            edges,
            duration_secs,
        } => {
            out.push(format!("  units:       {units} ({edges} edges)"));
            out.push(format!("  sample rate: {sample_rate} Hz"));
            out.push(format!("  duration:    {duration_secs:.3}s"));
        }
        Details::Features {
            halfphone,
            vectors,
            edges,
            features,
        } => {
            out.push(format!("  vectors:     {vectors} ({edges} edges)"));
            out.push(format!(
                "  unit size:   {}",
                if *halfphone { "half-phone" } else { "phone" }
            ));
            out.push(format!("  features:    {}", features.len()));
            for line in features {
                out.push(format!("    {:<24} {:<6} {}", line.name, line.kind, line.values));
            }
        }
        Details::Timeline {
            processing_header,
            sample_rate,
            datagrams,
            duration_secs,
            index_entries,
        } => {
            out.push(format!("  header:      {processing_header}"));
            out.push(format!("  sample rate: {sample_rate} Hz"));
            out.push(format!("  datagrams:   {datagrams}"));
            out.push(format!("  duration:    {duration_secs:.3}s"));
            out.push(format!("  index:       {index_entries} entries"));
        }
        Details::JoinFeatures {
            units,
            width,
            weights,
        } => {
            out.push(format!("  units:       {units}"));
            out.push(format!("  frame width: {width}"));
            for (i, weight) in weights.iter().enumerate() {
                out.push(format!("    {i:>3} : {weight}"));
            }
        }
        Details::JoinCosts { left_units, pairs } => {
            out.push(format!("  left units:  {left_units}"));
            out.push(format!("  pairs:       {pairs}"));
        }
        Details::HeaderOnly => {
            out.push("  (no summary for this content type)".to_string());
        }
    }
    out.push(String::new());
    out.join("\n")
}
