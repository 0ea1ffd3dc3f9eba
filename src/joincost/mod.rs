//! Join costs: boundary features, weighting and the precomputed table.

pub mod features;
pub mod precompute;
pub mod table;
pub mod weights;

pub use features::{JoinCostFunction, JoinFeatures};
pub use precompute::{
    Bucket, PrecomputeSummary, RetentionPolicy, bucket_units, precompute, score_bucket,
};
pub use table::{JoinCostTable, JoinCostTableWriter, LeftUnitCosts};
pub use weights::{JoinWeights, WeightFunction};
