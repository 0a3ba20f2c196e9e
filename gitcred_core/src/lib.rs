//! gitcred core library: incremental pull-request sync and contributor
//! attribution scoring.
//!
//! The sync engine keeps a local SQLite mirror of an external, paginated,
//! mutable collection consistent without full rescans; the attribution
//! engine converts classified scores into percentage credit per contributor,
//! reproduced identically for whole-history aggregates and scrubbable
//! timeline snapshots.

pub mod attribution;
pub mod classify;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use attribution::engine::attribute;
pub use attribution::models::{
    AttributionOverrides, AttributionSnapshot, AuthorCredit, BucketCredit, QuartileStat,
};
pub use attribution::timeline::{
    snapshot_at, weighted_snapshot_at, WeightedSource, SNAPSHOT_RANKING_LIMIT,
};
pub use classify::{Classification, ClassificationRunner, Classifier};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use jobs::{Acquired, JobKind, JobLock, JobLockManager, JobStatus};
pub use models::{
    Bucket, ClassifiedScore, Contribution, ContributionState, RepoRef, SyncOutcome,
};
pub use storage::sqlite::SqliteStore;
pub use storage::traits::{ContributionStore, JobLockStore, ScoreStore};
pub use sync::engine::SyncEngine;
pub use sync::fetcher::RetryingFetcher;
pub use sync::models::{PageRequest, SortDirection, SortKey};
pub use sync::staleness::StalenessDetector;
pub use sync::traits::{PageFetcher, PageTransport};
