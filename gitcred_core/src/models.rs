use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A repository coordinate on the external code host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    #[tracing::instrument(level = "debug")]
    pub fn new(
        owner: impl Into<String> + std::fmt::Debug,
        name: impl Into<String> + std::fmt::Debug,
    ) -> Result<Self> {
        let owner = owner.into();
        if owner.trim().is_empty() {
            return Err(Error::Validation("repo owner is empty".to_string()));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Validation("repo name is empty".to_string()));
        }
        Ok(Self { owner, name })
    }

    /// Canonical `owner/name` form, used as the job-lock subject.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionState {
    Open,
    Closed,
    Merged,
}

impl ContributionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ContributionState::Open => "open",
            ContributionState::Closed => "closed",
            ContributionState::Merged => "merged",
        }
    }
}

impl FromStr for ContributionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(ContributionState::Open),
            "closed" => Ok(ContributionState::Closed),
            "merged" => Ok(ContributionState::Merged),
            other => Err(Error::Validation(format!(
                "unknown contribution state '{other}'"
            ))),
        }
    }
}

/// One pull request as mirrored from the external API.
///
/// Identity is `(owner, name, number)`; everything else is mutable upstream
/// and overwritten on upsert. Contributions are never deleted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub repo: RepoRef,
    pub number: u64,
    pub state: ContributionState,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl Contribution {
    #[tracing::instrument(level = "debug", skip(title, body))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: RepoRef,
        number: u64,
        state: ContributionState,
        title: impl Into<String>,
        body: Option<String>,
        author: impl Into<String> + std::fmt::Debug,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if number == 0 {
            return Err(Error::Validation(
                "contribution number must be >= 1".to_string(),
            ));
        }
        let author = author.into();
        if author.trim().is_empty() {
            return Err(Error::Validation("contribution author is empty".to_string()));
        }
        Ok(Self {
            repo,
            number,
            state,
            title: title.into(),
            body,
            author,
            created_at,
            updated_at,
            merged_at,
        })
    }
}

/// Complexity tier assigned by the external classifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Low,
    Moderate,
    High,
    Exceptional,
}

impl Bucket {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Bucket::Low => 0,
            Bucket::Moderate => 1,
            Bucket::High => 2,
            Bucket::Exceptional => 3,
        }
    }

    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Bucket::Low),
            1 => Ok(Bucket::Moderate),
            2 => Ok(Bucket::High),
            3 => Ok(Bucket::Exceptional),
            other => Err(Error::Validation(format!(
                "bucket index {other} out of range 0..=3"
            ))),
        }
    }

    /// Midpoint of the classifier's fixed score scale (bucket 0 -> -2.0,
    /// bucket 3 -> +2.0, evenly spaced).
    pub fn midpoint_score(self) -> f64 {
        -2.0 + self.index() as f64 * (4.0 / 3.0)
    }
}

/// A classified, merged contribution ready for attribution.
///
/// One record exists per merged contribution the external classifier has
/// seen; unclassified contributions are simply absent and carry no credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedScore {
    pub repo: RepoRef,
    pub number: u64,
    pub author: String,
    pub bucket: Bucket,
    pub score: f64,
    pub merged_at: DateTime<Utc>,
    pub classified_at: DateTime<Utc>,
}

impl ClassifiedScore {
    #[tracing::instrument(level = "debug")]
    pub fn new(
        repo: RepoRef,
        number: u64,
        author: impl Into<String> + std::fmt::Debug,
        bucket: Bucket,
        score: f64,
        merged_at: DateTime<Utc>,
        classified_at: DateTime<Utc>,
    ) -> Result<Self> {
        if number == 0 {
            return Err(Error::Validation(
                "classified score number must be >= 1".to_string(),
            ));
        }
        let author = author.into();
        if author.trim().is_empty() {
            return Err(Error::Validation(
                "classified score author is empty".to_string(),
            ));
        }
        if !score.is_finite() {
            return Err(Error::Validation(
                "classified score must be finite".to_string(),
            ));
        }
        Ok(Self {
            repo,
            number,
            author,
            bucket,
            score,
            merged_at,
            classified_at,
        })
    }
}

/// Result of a sync call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Number of contributions upserted across both sync phases.
    pub total_synced: u64,
    /// Highest-numbered locally stored contribution after the run.
    pub latest: Option<Contribution>,
}
