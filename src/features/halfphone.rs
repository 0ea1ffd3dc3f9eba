//! Half-phone specialization of phone-level feature vectors.

use crate::error::{Result, VoicebankError};
use crate::features::schema::{
    FeatureDef, FeatureKind, FeatureSchema, HALFPHONE_FEATURE, HALFPHONE_VALUES,
};
use crate::features::vector::{FeatureValue, FeatureVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Left,
    Right,
}

impl Half {
    pub fn value_index(self) -> usize {
        match self {
            Half::Left => 1,
            Half::Right => 2,
        }
    }

    pub fn from_value_index(index: usize) -> Option<Self> {
        match index {
            1 => Some(Half::Left),
            2 => Some(Half::Right),
            _ => None,
        }
    }
}

/// Half-phone schema for a phone-level one.
///
/// Appends `halfphone_lr` unless the schema already carries it.
pub fn extend_schema(schema: &FeatureSchema) -> Result<FeatureSchema> {
    schema.phone_index()?;
    if schema.index_of(HALFPHONE_FEATURE).is_some() {
        schema.halfphone_index()?;
        return Ok(schema.clone());
    }
    schema.clone().with_feature(FeatureDef::categorical(
        HALFPHONE_FEATURE,
        FeatureKind::Byte,
        &HALFPHONE_VALUES,
    ))
}

/// Turns one phone-level vector into its left and right halves.
///
/// `schema` is the half-phone schema; `values` may omit a trailing
/// `halfphone_lr` field. The halves differ only in `halfphone_lr`.
pub fn split(schema: &FeatureSchema, values: &[FeatureValue]) -> Result<[FeatureVector; 2]> {
    let lr = schema.halfphone_index()?;
    let kind = schema.features()[lr].kind;
    let mut base = values.to_vec();
    if base.len() + 1 == schema.len() && lr + 1 == schema.len() {
        base.push(FeatureValue::zero(kind));
    }
    if base.len() != schema.len() {
        return Err(VoicebankError::format(format!(
            "vector has {} values, half-phone schema has {} features",
            values.len(),
            schema.len()
        )));
    }
    let with_half = |half: Half| -> Result<FeatureVector> {
        let mut values = base.clone();
        values[lr] = FeatureValue::categorical(kind, half.value_index())
            .ok_or_else(|| VoicebankError::format("'halfphone_lr' cannot be float"))?;
        Ok(FeatureVector::Real(values))
    };
    Ok([with_half(Half::Left)?, with_half(Half::Right)?])
}

/// Which half a vector describes; `None` for edges.
pub fn half_of(schema: &FeatureSchema, vector: &FeatureVector) -> Result<Option<Half>> {
    let lr = schema.halfphone_index()?;
    Ok(match vector {
        FeatureVector::Real(values) => values
            .get(lr)
            .and_then(FeatureValue::category)
            .and_then(Half::from_value_index),
        FeatureVector::Edge(_) => None,
    })
}
