//! Per-utterance symbolic feature dumps.
//!
//! A dump is a schema block, a blank line, and one line per unit holding
//! the unit's values in schema order: legal-value names for categorical
//! features and decimal numbers for floats.

use crate::error::{Result, VoicebankError};
use crate::features::schema::FeatureSchema;
use crate::features::vector::{FeatureValue, FeatureVector};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDump {
    pub utterance: String,
    pub schema: FeatureSchema,
    pub vectors: Vec<FeatureVector>,
}

impl FeatureDump {
    pub fn load(utterance: &str, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(utterance, &text)
    }

    pub fn parse(utterance: &str, text: &str) -> Result<Self> {
        let err = |line: usize, message: String| VoicebankError::Dump {
            utterance: utterance.to_string(),
            line,
            message,
        };

        let lines: Vec<&str> = text.lines().collect();
        let split = lines
            .iter()
            .position(|l| l.trim().is_empty())
            .ok_or_else(|| err(0, "no blank line after the schema block".to_string()))?;
        let schema = FeatureSchema::parse(&lines[..split].join("\n"))
            .map_err(|e| err(0, e.to_string()))?;
        let edge = schema.edge_index().map_err(|e| err(0, e.to_string()))?;

        let mut vectors = Vec::new();
        for (n, line) in lines.iter().enumerate().skip(split + 1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != schema.len() {
                return Err(err(
                    n + 1,
                    format!("{} values, schema has {} features", tokens.len(), schema.len()),
                ));
            }
            let mut values = Vec::with_capacity(tokens.len());
            for (feature, token) in schema.features().iter().zip(&tokens) {
                let value = if feature.is_categorical() {
                    feature
                        .value_index(token)
                        .and_then(|i| FeatureValue::categorical(feature.kind, i))
                        .ok_or_else(|| {
                            err(
                                n + 1,
                                format!("'{token}' is not a legal value of '{}'", feature.name),
                            )
                        })?
                } else {
                    let v: f32 = token.parse().map_err(|_| {
                        err(n + 1, format!("'{token}' is not a number for '{}'", feature.name))
                    })?;
                    FeatureValue::Float(v)
                };
                values.push(value);
            }
            if values[edge].category() != Some(0) {
                return Err(err(n + 1, "unit lines must have edge value 0".to_string()));
            }
            vectors.push(FeatureVector::Real(values));
        }

        Ok(Self {
            utterance: utterance.to_string(),
            schema,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Phone symbol of every unit line.
    pub fn phones(&self) -> Result<Vec<String>> {
        let index = self.schema.phone_index()?;
        let feature = &self.schema.features()[index];
        self.vectors
            .iter()
            .map(|vector| {
                let value = vector.value(&self.schema, index)?;
                value
                    .category()
                    .and_then(|i| feature.value_name(i))
                    .map(str::to_string)
                    .ok_or_else(|| VoicebankError::format("phone value out of range"))
            })
            .collect()
    }
}
