//! Join-cost feature weights and weighting functions.
//!
//! Weights file format, one line per join feature:
//!
//! ```text
//! # mcep
//! 0 : 1.0 linear
//! 1 : 1.0 linear
//! # F0
//! 2 : 2.0 step 20
//! ```
//!
//! Text after `#` is ignored. The leading index is informative only; lines
//! are taken in order. Weights are normalised so that they sum to one.

use crate::error::{Result, VoicebankError};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Per-feature distance between two frame values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "function", rename_all = "lowercase")]
pub enum WeightFunction {
    /// `|a - b|`
    Linear,
    /// 1 when the relative difference reaches `percent`, else 0.
    Step { percent: f64 },
}

impl WeightFunction {
    pub fn cost(&self, a: f64, b: f64) -> f64 {
        match *self {
            WeightFunction::Linear => (a - b).abs(),
            WeightFunction::Step { percent } => {
                let mean = (a + b).abs() / 2.0;
                if mean == 0.0 {
                    return if a == b { 0.0 } else { 1.0 };
                }
                if (a - b).abs() / mean * 100.0 >= percent {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl FromStr for WeightFunction {
    type Err = VoicebankError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("linear"), None, _) | (None, _, _) => Ok(WeightFunction::Linear),
            (Some("step"), Some(percent), None) => {
                let percent: f64 = percent.parse().map_err(|_| {
                    VoicebankError::format(format!("bad step percentage '{percent}'"))
                })?;
                if !percent.is_finite() || percent < 0.0 {
                    return Err(VoicebankError::format(format!(
                        "step percentage must be non-negative, got {percent}"
                    )));
                }
                Ok(WeightFunction::Step { percent })
            }
            _ => Err(VoicebankError::format(format!(
                "unknown weighting function '{s}'"
            ))),
        }
    }
}

impl fmt::Display for WeightFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightFunction::Linear => f.write_str("linear"),
            WeightFunction::Step { percent } => write!(f, "step {percent}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureWeight {
    pub weight: f32,
    pub function: WeightFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinWeights {
    weights: Vec<FeatureWeight>,
}

impl JoinWeights {
    /// Normalises the weights to sum to one.
    pub fn new(weights: Vec<FeatureWeight>) -> Result<Self> {
        if weights.is_empty() {
            return Err(VoicebankError::format("no join-cost weights"));
        }
        let sum: f32 = weights.iter().map(|w| w.weight).sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(VoicebankError::format(format!(
                "join-cost weights must sum to a positive value, got {sum}"
            )));
        }
        let weights = weights
            .into_iter()
            .map(|w| FeatureWeight {
                weight: w.weight / sum,
                ..w
            })
            .collect();
        Ok(Self { weights })
    }

    /// Uniform linear weights for `count` features.
    pub fn uniform(count: usize) -> Result<Self> {
        Self::new(vec![
            FeatureWeight {
                weight: 1.0,
                function: WeightFunction::Linear,
            };
            count
        ])
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut weights = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |message: String| {
                VoicebankError::format(format!("weights line {}: {message}", n + 1))
            };
            let (_, spec) = line
                .split_once(':')
                .ok_or_else(|| err(format!("expected 'index : weight function', got '{line}'")))?;
            let spec = spec.trim();
            let (weight, function) = spec.split_once(char::is_whitespace).unwrap_or((spec, ""));
            let weight: f32 = weight
                .parse()
                .map_err(|_| err(format!("bad weight '{weight}'")))?;
            if weight < 0.0 {
                return Err(err(format!("negative weight {weight}")));
            }
            let function = function.trim().parse().map_err(|e: VoicebankError| err(e.to_string()))?;
            weights.push(FeatureWeight { weight, function });
        }
        Self::new(weights)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureWeight> {
        self.weights.iter()
    }

    /// Weighted distance between two frames; NaN pairs contribute nothing.
    pub fn distance(&self, right: &[f32], left: &[f32]) -> f64 {
        self.weights
            .iter()
            .zip(right.iter().zip(left))
            .filter(|(_, (a, b))| !a.is_nan() && !b.is_nan())
            .map(|(w, (a, b))| f64::from(w.weight) * w.function.cost(f64::from(*a), f64::from(*b)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_normalise() {
        let text = "# header\n0 : 1.0 linear\n1 : 1.0 linear # trailing\n\n2 : 2.0 step 20\n";
        let weights = JoinWeights::parse(text).unwrap();
        assert_eq!(weights.len(), 3);
        let w: Vec<f32> = weights.iter().map(|w| w.weight).collect();
        assert_eq!(w, vec![0.25, 0.25, 0.5]);
        assert_eq!(
            weights.iter().nth(2).unwrap().function,
            WeightFunction::Step { percent: 20.0 }
        );
    }

    #[test]
    fn test_missing_function_defaults_to_linear() {
        let weights = JoinWeights::parse("0 : 3\n").unwrap();
        assert_eq!(weights.iter().next().unwrap().function, WeightFunction::Linear);
    }

    #[test]
    fn test_parse_errors() {
        assert!(JoinWeights::parse("").is_err());
        assert!(JoinWeights::parse("0 1.0 linear\n").is_err());
        assert!(JoinWeights::parse("0 : heavy linear\n").is_err());
        assert!(JoinWeights::parse("0 : 1.0 cubic\n").is_err());
        assert!(JoinWeights::parse("0 : 0\n1 : 0\n").is_err());
        assert!(JoinWeights::parse("0 : -1 linear\n").is_err());
    }

    #[test]
    fn test_step_function() {
        let step = WeightFunction::Step { percent: 20.0 };
        // |110 - 100| / 105 = 9.5%
        assert_eq!(step.cost(110.0, 100.0), 0.0);
        // |130 - 100| / 115 = 26%
        assert_eq!(step.cost(130.0, 100.0), 1.0);
        assert_eq!(step.cost(0.0, 0.0), 0.0);
        assert_eq!(step.to_string(), "step 20");
    }

    #[test]
    fn test_distance_skips_nan() {
        let weights = JoinWeights::uniform(2).unwrap();
        assert_eq!(weights.distance(&[1.0, 5.0], &[3.0, 1.0]), 3.0);
        assert_eq!(weights.distance(&[f32::NAN, 5.0], &[3.0, 1.0]), 2.0);
    }
}
