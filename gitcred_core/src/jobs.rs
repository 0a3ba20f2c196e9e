//! Per-(subject, kind) job locks.
//!
//! A cooperative, store-backed mutual-exclusion marker: concurrent duplicate
//! triggers for the same repository are rejected while a run is in flight.
//! This is not a distributed lock — there is no lease expiry — and the store
//! stays safe without it because every sync write is an idempotent upsert;
//! the lock only prevents wasted duplicate work.

use crate::storage::traits::JobLockStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Classify,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Sync => "sync",
            JobKind::Classify => "classify",
        }
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sync" => Ok(JobKind::Sync),
            "classify" => Ok(JobKind::Classify),
            other => Err(Error::Validation(format!("unknown job kind '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// One durable lock row. At most one row per `(subject, kind)` may be
/// `running` at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLock {
    pub lock_id: Uuid,
    /// Canonical `owner/repo` the job operates on.
    pub subject: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Error text on failure, optional outcome summary on completion.
    pub detail: Option<String>,
}

impl JobLock {
    #[tracing::instrument(level = "debug")]
    pub fn new_running(
        subject: impl Into<String> + std::fmt::Debug,
        kind: JobKind,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(Error::Validation("job lock subject is empty".to_string()));
        }
        Ok(Self {
            lock_id: Uuid::new_v4(),
            subject,
            kind,
            status: JobStatus::Running,
            started_at,
            completed_at: None,
            detail: None,
        })
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    pub lock: JobLock,
    /// When true, `lock` is the pre-existing running row and the caller must
    /// not proceed.
    pub already_running: bool,
}

#[derive(Clone)]
pub struct JobLockManager {
    store: Arc<dyn JobLockStore>,
}

impl JobLockManager {
    #[tracing::instrument(level = "debug", skip(store))]
    pub fn new(store: Arc<dyn JobLockStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn acquire(&self, subject: &str, kind: JobKind) -> Result<Acquired> {
        if let Some(existing) = self.store.find_running(subject, kind).await? {
            return Ok(Acquired {
                lock: existing,
                already_running: true,
            });
        }
        let lock = JobLock::new_running(subject, kind, Utc::now())?;
        self.store.insert(&lock).await?;
        Ok(Acquired {
            lock,
            already_running: false,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, detail))]
    pub async fn release(
        &self,
        lock_id: Uuid,
        outcome: JobStatus,
        detail: Option<String>,
    ) -> Result<()> {
        if outcome == JobStatus::Running {
            return Err(Error::Validation(
                "release outcome must be completed or failed".to_string(),
            ));
        }
        self.store
            .update(lock_id, outcome, Some(Utc::now()), detail)
            .await
    }
}
