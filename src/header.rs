//! Container header shared by every binary artifact.
//!
//! Each file starts with a 12-byte tag: magic, format version, content type.
//! Nothing after the tag is interpreted until it has been validated.

use crate::binio::{read_u32, write_u32};
use crate::error::{Result, VoicebankError};
use serde::Serialize;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// "VBNK"
pub const MAGIC: u32 = 0x5642_4E4B;
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 12;

/// Kind of content stored after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Unknown,
    Carts,
    Units,
    UnitFeatures,
    HalfphoneUnitFeatures,
    JoinFeatures,
    PrecomputedJoinCosts,
    Timeline,
}

impl ContentType {
    pub const ALL: [ContentType; 8] = [
        ContentType::Unknown,
        ContentType::Carts,
        ContentType::Units,
        ContentType::UnitFeatures,
        ContentType::HalfphoneUnitFeatures,
        ContentType::JoinFeatures,
        ContentType::PrecomputedJoinCosts,
        ContentType::Timeline,
    ];

    pub fn code(self) -> u32 {
        match self {
            ContentType::Unknown => 0,
            ContentType::Carts => 100,
            ContentType::Units => 200,
            ContentType::UnitFeatures => 300,
            ContentType::HalfphoneUnitFeatures => 301,
            ContentType::JoinFeatures => 400,
            ContentType::PrecomputedJoinCosts => 450,
            ContentType::Timeline => 500,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentType::Unknown => "UNKNOWN",
            ContentType::Carts => "CARTS",
            ContentType::Units => "UNITS",
            ContentType::UnitFeatures => "UNIT_FEATURES",
            ContentType::HalfphoneUnitFeatures => "HALFPHONE_UNIT_FEATURES",
            ContentType::JoinFeatures => "JOIN_FEATURES",
            ContentType::PrecomputedJoinCosts => "PRECOMPUTED_JOIN_COSTS",
            ContentType::Timeline => "TIMELINE",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Writes the header tag, returning the number of bytes written.
pub fn write<W: Write>(writer: &mut W, content_type: ContentType) -> Result<u64> {
    write_u32(writer, MAGIC)?;
    write_u32(writer, FORMAT_VERSION)?;
    write_u32(writer, content_type.code())?;
    Ok(HEADER_SIZE)
}

/// Reads and validates the header tag.
pub fn read<R: Read>(reader: &mut R) -> Result<ContentType> {
    let magic = read_u32(reader)?;
    if magic != MAGIC {
        return Err(VoicebankError::format(format!(
            "magic mismatch: found {magic:#010x}"
        )));
    }
    let version = read_u32(reader)?;
    if version != FORMAT_VERSION {
        return Err(VoicebankError::format(format!(
            "unsupported format version {version}"
        )));
    }
    let code = read_u32(reader)?;
    ContentType::from_code(code)
        .ok_or_else(|| VoicebankError::format(format!("unknown content type code {code}")))
}

/// Reads the header and requires one specific content type.
pub fn read_expecting<R: Read>(reader: &mut R, expected: ContentType) -> Result<()> {
    let actual = read(reader)?;
    if actual != expected {
        return Err(VoicebankError::WrongContentType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Reads just the header of a file on disk.
pub fn peek(path: &Path) -> Result<ContentType> {
    let mut file = std::fs::File::open(path)?;
    read(&mut file)
}
