//! Target-cost feature vectors.

pub mod dump;
pub mod file;
pub mod halfphone;
pub mod schema;
pub mod vector;

pub use dump::FeatureDump;
pub use file::{FeatureFile, FeatureFileWriter};
pub use schema::{FeatureDef, FeatureKind, FeatureSchema};
pub use vector::{EdgeMarker, FeatureValue, FeatureVector};
