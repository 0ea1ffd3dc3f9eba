//! Fixed-width feature vectors.

use crate::binio::{read_f32, read_u8, read_u16, write_f32, write_u8, write_u16};
use crate::error::{Result, VoicebankError};
use crate::features::schema::{FeatureKind, FeatureSchema};
use serde::Serialize;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Byte(u8),
    Short(u16),
    Float(f32),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Byte(_) => FeatureKind::Byte,
            FeatureValue::Short(_) => FeatureKind::Short,
            FeatureValue::Float(_) => FeatureKind::Float,
        }
    }

    /// Index of a categorical value; `None` for floats.
    pub fn category(&self) -> Option<usize> {
        match *self {
            FeatureValue::Byte(v) => Some(usize::from(v)),
            FeatureValue::Short(v) => Some(usize::from(v)),
            FeatureValue::Float(_) => None,
        }
    }

    pub fn zero(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Byte => FeatureValue::Byte(0),
            FeatureKind::Short => FeatureValue::Short(0),
            FeatureKind::Float => FeatureValue::Float(0.0),
        }
    }

    /// Categorical value with index `index` in a feature of `kind`.
    pub fn categorical(kind: FeatureKind, index: usize) -> Option<Self> {
        match kind {
            FeatureKind::Byte => u8::try_from(index).ok().map(FeatureValue::Byte),
            FeatureKind::Short => u16::try_from(index).ok().map(FeatureValue::Short),
            FeatureKind::Float => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMarker {
    Start,
    End,
}

impl EdgeMarker {
    /// Index of the marker in the `edge` feature's legal values.
    pub fn value_index(self) -> usize {
        match self {
            EdgeMarker::Start => 1,
            EdgeMarker::End => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FeatureVector {
    Real(Vec<FeatureValue>),
    Edge(EdgeMarker),
}

impl FeatureVector {
    pub fn is_edge(&self) -> bool {
        matches!(self, FeatureVector::Edge(_))
    }

    pub fn values(&self) -> Option<&[FeatureValue]> {
        match self {
            FeatureVector::Real(values) => Some(values),
            FeatureVector::Edge(_) => None,
        }
    }

    /// Value of feature `index`, with edges reading as their encoded form.
    pub fn value(&self, schema: &FeatureSchema, index: usize) -> Result<FeatureValue> {
        match self {
            FeatureVector::Real(values) => values.get(index).copied().ok_or_else(|| {
                VoicebankError::format(format!("vector has no feature {index}"))
            }),
            FeatureVector::Edge(marker) => {
                let feature = schema.get(index).ok_or_else(|| {
                    VoicebankError::format(format!("schema has no feature {index}"))
                })?;
                if index == schema.edge_index()? {
                    FeatureValue::categorical(feature.kind, marker.value_index())
                        .ok_or_else(|| VoicebankError::format("edge feature cannot be float"))
                } else {
                    Ok(FeatureValue::zero(feature.kind))
                }
            }
        }
    }

    /// Encodes the vector in schema order.
    pub fn write_to<W: Write>(&self, schema: &FeatureSchema, writer: &mut W) -> Result<()> {
        if let FeatureVector::Real(values) = self {
            check_real(schema, values)?;
        }
        for (index, feature) in schema.features().iter().enumerate() {
            match (self.value(schema, index)?, feature.kind) {
                (FeatureValue::Byte(v), FeatureKind::Byte) => write_u8(writer, v)?,
                (FeatureValue::Short(v), FeatureKind::Short) => write_u16(writer, v)?,
                (FeatureValue::Float(v), FeatureKind::Float) => write_f32(writer, v)?,
                (value, kind) => {
                    return Err(VoicebankError::format(format!(
                        "feature '{}' expects {}, got {}",
                        feature.name,
                        kind.name(),
                        value.kind().name()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(schema: &FeatureSchema, reader: &mut R) -> Result<Self> {
        let mut values = Vec::with_capacity(schema.len());
        for feature in schema.features() {
            values.push(match feature.kind {
                FeatureKind::Byte => FeatureValue::Byte(read_u8(reader)?),
                FeatureKind::Short => FeatureValue::Short(read_u16(reader)?),
                FeatureKind::Float => FeatureValue::Float(read_f32(reader)?),
            });
        }
        let edge = schema.edge_index()?;
        match values[edge].category() {
            Some(0) => {
                check_real(schema, &values)?;
                Ok(FeatureVector::Real(values))
            }
            Some(1) => Ok(FeatureVector::Edge(EdgeMarker::Start)),
            Some(2) => Ok(FeatureVector::Edge(EdgeMarker::End)),
            _ => Err(VoicebankError::format("invalid edge marker in vector")),
        }
    }
}

/// Width, kinds, category bounds and a zero edge field.
fn check_real(schema: &FeatureSchema, values: &[FeatureValue]) -> Result<()> {
    if values.len() != schema.len() {
        return Err(VoicebankError::format(format!(
            "vector has {} values, schema has {} features",
            values.len(),
            schema.len()
        )));
    }
    for (feature, value) in schema.features().iter().zip(values) {
        if value.kind() != feature.kind {
            return Err(VoicebankError::format(format!(
                "feature '{}' expects {}, got {}",
                feature.name,
                feature.kind.name(),
                value.kind().name()
            )));
        }
        if let Some(category) = value.category()
            && category >= feature.values.len()
        {
            return Err(VoicebankError::format(format!(
                "value {category} out of range for feature '{}'",
                feature.name
            )));
        }
    }
    if values[schema.edge_index()?].category() != Some(0) {
        return Err(VoicebankError::format(
            "real vector must have edge value 0",
        ));
    }
    Ok(())
}
