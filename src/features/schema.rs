//! Ordered, typed description of a feature vector.
//!
//! Text form, one feature per line:
//!
//! ```text
//! # comment
//! edge byte 0|start|end
//! phone byte 0|a|b|c 2.0
//! f0 float float 0.5
//! ```
//!
//! Embedded in a binary file the block is terminated by a blank line.

use crate::error::{Result, VoicebankError};
use serde::Serialize;
use std::fmt;
use std::io::Read;

pub const EDGE_FEATURE: &str = "edge";
pub const PHONE_FEATURE: &str = "phone";
pub const HALFPHONE_FEATURE: &str = "halfphone_lr";
pub const EDGE_VALUES: [&str; 3] = ["0", "start", "end"];
pub const HALFPHONE_VALUES: [&str; 3] = ["0", "L", "R"];

/// Upper bound on the text block read back from a binary file.
const MAX_SCHEMA_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Byte,
    Short,
    Float,
}

impl FeatureKind {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "byte" => Some(FeatureKind::Byte),
            "short" => Some(FeatureKind::Short),
            "float" => Some(FeatureKind::Float),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::Byte => "byte",
            FeatureKind::Short => "short",
            FeatureKind::Float => "float",
        }
    }

    /// Encoded size in bytes.
    pub fn width(self) -> usize {
        match self {
            FeatureKind::Byte => 1,
            FeatureKind::Short => 2,
            FeatureKind::Float => 4,
        }
    }

    fn max_values(self) -> usize {
        match self {
            FeatureKind::Byte => 1 << 8,
            FeatureKind::Short => 1 << 16,
            FeatureKind::Float => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
    /// Legal values of a categorical feature; empty for floats.
    pub values: Vec<String>,
    pub weight: Option<f32>,
}

impl FeatureDef {
    pub fn categorical(name: &str, kind: FeatureKind, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            values: values.iter().map(|v| v.to_string()).collect(),
            weight: None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.kind != FeatureKind::Float
    }

    pub fn value_index(&self, symbol: &str) -> Option<usize> {
        self.values.iter().position(|v| v == symbol)
    }

    pub fn value_name(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    fn to_line(&self) -> String {
        let values = if self.is_categorical() {
            self.values.join("|")
        } else {
            "float".to_string()
        };
        match self.weight {
            Some(w) => format!("{} {} {} {}", self.name, self.kind.name(), values, w),
            None => format!("{} {} {}", self.name, self.kind.name(), values),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSchema {
    features: Vec<FeatureDef>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureDef>) -> Result<Self> {
        let schema = Self { features };
        schema.check_definitions()?;
        Ok(schema)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut features = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            features.push(parse_line(line).map_err(|message| {
                VoicebankError::format(format!("schema line {}: {message}", n + 1))
            })?);
        }
        Self::new(features)
    }

    /// Reads a schema block terminated by a blank line.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if reader.read(&mut byte)? == 0 {
                return Err(VoicebankError::format("schema block is not terminated"));
            }
            bytes.push(byte[0]);
            if bytes.ends_with(b"\n\n") || bytes == b"\n" {
                break;
            }
            if bytes.len() > MAX_SCHEMA_BYTES {
                return Err(VoicebankError::format("schema block is too large"));
            }
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| VoicebankError::format("schema block is not valid UTF-8"))?;
        Self::parse(&text)
    }

    /// Text block including the terminating blank line.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for feature in &self.features {
            text.push_str(&feature.to_line());
            text.push('\n');
        }
        text.push('\n');
        text
    }

    pub fn features(&self) -> &[FeatureDef] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&FeatureDef> {
        self.features.get(index)
    }

    /// Encoded width of one vector in bytes.
    pub fn vector_width(&self) -> usize {
        self.features.iter().map(|f| f.kind.width()).sum()
    }

    pub fn edge_index(&self) -> Result<usize> {
        self.require(EDGE_FEATURE, &EDGE_VALUES)
    }

    pub fn phone_index(&self) -> Result<usize> {
        let index = self
            .index_of(PHONE_FEATURE)
            .ok_or_else(|| VoicebankError::format("schema has no 'phone' feature"))?;
        if !self.features[index].is_categorical() {
            return Err(VoicebankError::format("'phone' must be categorical"));
        }
        Ok(index)
    }

    pub fn halfphone_index(&self) -> Result<usize> {
        self.require(HALFPHONE_FEATURE, &HALFPHONE_VALUES)
    }

    /// Appends a feature, rejecting duplicate names.
    pub fn with_feature(mut self, feature: FeatureDef) -> Result<Self> {
        self.features.push(feature);
        self.check_definitions()?;
        Ok(self)
    }

    /// Checks that `other` describes exactly the same vectors.
    ///
    /// Names, kinds and legal values must match in order; weights may differ.
    pub fn compatibility(&self, other: &FeatureSchema) -> std::result::Result<(), String> {
        if self.len() != other.len() {
            return Err(format!(
                "{} features, expected {}",
                other.len(),
                self.len()
            ));
        }
        for (i, (ours, theirs)) in self.features.iter().zip(&other.features).enumerate() {
            if ours.name != theirs.name {
                return Err(format!(
                    "feature {i} is '{}', expected '{}'",
                    theirs.name, ours.name
                ));
            }
            if ours.kind != theirs.kind {
                return Err(format!(
                    "feature '{}' is {}, expected {}",
                    ours.name,
                    theirs.kind.name(),
                    ours.kind.name()
                ));
            }
            if ours.values != theirs.values {
                return Err(format!(
                    "feature '{}' has legal values {}, expected {}",
                    ours.name,
                    theirs.values.join("|"),
                    ours.values.join("|")
                ));
            }
        }
        Ok(())
    }

    fn require(&self, name: &str, values: &[&str]) -> Result<usize> {
        let index = self
            .index_of(name)
            .ok_or_else(|| VoicebankError::format(format!("schema has no '{name}' feature")))?;
        let feature = &self.features[index];
        if feature.values.len() != values.len()
            || feature.values.iter().zip(values).any(|(a, b)| a != b)
        {
            return Err(VoicebankError::format(format!(
                "'{name}' must have legal values {}",
                values.join("|")
            )));
        }
        Ok(index)
    }

    fn check_definitions(&self) -> Result<()> {
        for (i, feature) in self.features.iter().enumerate() {
            if self.features[..i].iter().any(|f| f.name == feature.name) {
                return Err(VoicebankError::format(format!(
                    "duplicate feature '{}'",
                    feature.name
                )));
            }
            if feature.is_categorical() {
                if feature.values.is_empty() {
                    return Err(VoicebankError::format(format!(
                        "feature '{}' has no legal values",
                        feature.name
                    )));
                }
                if feature.values.len() > feature.kind.max_values() {
                    return Err(VoicebankError::format(format!(
                        "feature '{}' has {} values, too many for {}",
                        feature.name,
                        feature.values.len(),
                        feature.kind.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for feature in &self.features {
            writeln!(f, "{}", feature.to_line())?;
        }
        Ok(())
    }
}

fn parse_line(line: &str) -> std::result::Result<FeatureDef, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (name, kind, values, weight) = match fields.as_slice() {
        [name, kind, values] => (*name, *kind, *values, None),
        [name, kind, values, weight] => (*name, *kind, *values, Some(*weight)),
        _ => return Err(format!("expected 'name kind values [weight]', got '{line}'")),
    };
    let kind = FeatureKind::parse(kind).ok_or_else(|| format!("unknown kind '{kind}'"))?;
    let weight = weight
        .map(|w| w.parse::<f32>().map_err(|_| format!("bad weight '{w}'")))
        .transpose()?;
    let values = match kind {
        FeatureKind::Float if values == "float" => Vec::new(),
        FeatureKind::Float => return Err(format!("float feature '{name}' must list 'float'")),
        _ => values.split('|').map(str::to_string).collect(),
    };
    Ok(FeatureDef {
        name: name.to_string(),
        kind,
        values,
        weight,
    })
}
