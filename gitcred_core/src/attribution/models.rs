use crate::models::Bucket;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Credit a single author earned inside one bucket.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketCredit {
    pub count: u64,
    pub pct: f64,
}

/// One author's share of a snapshot. `pct` values across a snapshot's ranking
/// sum to 1.0 (within floating error) whenever any score is in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorCredit {
    pub author: String,
    pub pct: f64,
    pub per_bucket: [BucketCredit; Bucket::COUNT],
}

/// Per-bucket aggregate over one snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuartileStat {
    pub count: u64,
    pub aggregate_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

/// A full attribution computation over one fixed set of classified scores.
/// Derived on every request; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    /// Authors sorted descending by `pct`; ties broken by author name.
    pub ranking: Vec<AuthorCredit>,
    pub quartiles: [QuartileStat; Bucket::COUNT],
}

impl AttributionSnapshot {
    pub fn empty() -> Self {
        Self {
            ranking: Vec::new(),
            quartiles: [QuartileStat::default(); Bucket::COUNT],
        }
    }
}

/// Externally supplied per-bucket target shares.
///
/// Values need not sum to 1: the engine renormalizes over the buckets present
/// in the input, so the conservation invariant holds regardless of what the
/// caller provides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributionOverrides {
    pub bucket_pct: [f64; Bucket::COUNT],
}

impl AttributionOverrides {
    #[tracing::instrument(level = "debug")]
    pub fn new(bucket_pct: [f64; Bucket::COUNT]) -> Result<Self> {
        for (index, pct) in bucket_pct.iter().enumerate() {
            if !pct.is_finite() || *pct < 0.0 {
                return Err(Error::Validation(format!(
                    "override share for bucket {index} must be finite and >= 0"
                )));
            }
        }
        if bucket_pct.iter().sum::<f64>() <= 0.0 {
            return Err(Error::Validation(
                "at least one override share must be positive".to_string(),
            ));
        }
        Ok(Self { bucket_pct })
    }
}
