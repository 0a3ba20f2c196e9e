use crate::jobs::{JobKind, JobLock, JobStatus};
use crate::models::{ClassifiedScore, Contribution, RepoRef};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Mirror of the external collection. Contributions are created and updated
/// only through `upsert_contribution`; they are never deleted.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    /// Insert-or-update keyed by `(owner, repo, number)`. Must be safe to
    /// call with the same item any number of times: retries and overlapping
    /// batches deliver duplicates.
    async fn upsert_contribution(&self, contribution: &Contribution) -> Result<()>;

    async fn get_contribution(&self, repo: &RepoRef, number: u64) -> Result<Option<Contribution>>;

    /// Highest locally stored contribution number.
    async fn highest_number(&self, repo: &RepoRef) -> Result<Option<u64>>;

    /// Count of locally stored contributions with number <= `number`.
    async fn count_up_to(&self, repo: &RepoRef, number: u64) -> Result<u64>;

    /// Most recent `updated_at` across locally stored contributions.
    async fn latest_updated_at(&self, repo: &RepoRef) -> Result<Option<DateTime<Utc>>>;

    async fn count_contributions(&self, repo: &RepoRef) -> Result<u64>;
}

/// Classified scores derived from merged contributions.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Insert-or-update keyed by `(owner, repo, number)`.
    async fn upsert_score(&self, score: &ClassifiedScore) -> Result<()>;

    /// Scores for one repository in merge order, optionally restricted to a
    /// `merged_at` window (inclusive on both ends).
    async fn list_scores(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClassifiedScore>>;

    /// Merged contributions that have no classified score yet, in number
    /// order, capped at `limit`.
    async fn list_unclassified_merged(
        &self,
        repo: &RepoRef,
        limit: usize,
    ) -> Result<Vec<Contribution>>;
}

/// Durable job-lock rows backing `JobLockManager`.
#[async_trait]
pub trait JobLockStore: Send + Sync {
    async fn find_running(&self, subject: &str, kind: JobKind) -> Result<Option<JobLock>>;

    async fn insert(&self, lock: &JobLock) -> Result<()>;

    async fn update(
        &self,
        lock_id: Uuid,
        status: JobStatus,
        completed_at: Option<DateTime<Utc>>,
        detail: Option<String>,
    ) -> Result<()>;
}
