//! Segmentation of the timeline into synthesis units.

pub mod builder;
pub mod entry;
pub mod table;

pub use builder::{Rejection, Segment, UnitTableBuild, Utterance, build_unit_table};
pub use entry::UnitEntry;
pub use table::{UnitTable, UnitTableWriter};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a synthesis unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Phone,
    #[default]
    Halfphone,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Phone => f.write_str("phone"),
            Granularity::Halfphone => f.write_str("halfphone"),
        }
    }
}
