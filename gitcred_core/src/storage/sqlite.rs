//! SQLite-backed store implementation.
//!
//! Persists mirrored contributions, classified scores, and job locks across
//! restarts. Single WAL-mode SQLite file; every write is an `ON CONFLICT`
//! upsert keyed by natural identity so retries and overlapping batches are
//! harmless.
//!
//! Usage:
//! ```ignore
//! let store = SqliteStore::new("/path/to/gitcred.db").await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::jobs::{JobKind, JobLock, JobStatus};
use crate::models::{ClassifiedScore, Contribution, ContributionState, RepoRef};
use crate::storage::traits::{ContributionStore, JobLockStore, ScoreStore};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// A durable, file-backed store (WAL mode). Suitable for single-node
/// deployments and local development.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create (or open) the store at the given file path.
    ///
    /// Creates the file and parent directories if they don't exist and runs
    /// the internal schema migration on startup.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage("sqlite_store", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(|e| Error::storage("sqlite_store", e))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::storage("sqlite_store", e))?;

        // `execute` is per-statement; split conservatively.
        for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .map_err(|e| Error::storage("sqlite_store_migration", e))?;
        }

        Ok(Self { pool })
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contributions (
    owner TEXT NOT NULL,
    repo TEXT NOT NULL,
    number INTEGER NOT NULL,
    state TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT,
    author TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    merged_at TEXT,
    PRIMARY KEY (owner, repo, number)
);

CREATE INDEX IF NOT EXISTS contributions_updated_idx
    ON contributions(owner, repo, updated_at);

CREATE TABLE IF NOT EXISTS classified_scores (
    owner TEXT NOT NULL,
    repo TEXT NOT NULL,
    number INTEGER NOT NULL,
    author TEXT NOT NULL,
    bucket INTEGER NOT NULL,
    score REAL NOT NULL,
    merged_at TEXT NOT NULL,
    classified_at TEXT NOT NULL,
    PRIMARY KEY (owner, repo, number)
);

CREATE INDEX IF NOT EXISTS classified_scores_merged_idx
    ON classified_scores(owner, repo, merged_at);

CREATE TABLE IF NOT EXISTS job_locks (
    lock_id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS job_locks_subject_idx
    ON job_locks(subject, kind, status);
"#;

// ── Helpers ─────────────────────────────────────────────────────

fn db_err(e: sqlx::Error) -> Error {
    Error::storage("sqlite_store", e)
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn row_to_contribution(r: &sqlx::sqlite::SqliteRow) -> Result<Contribution> {
    let owner: String = r.get("owner");
    let repo: String = r.get("repo");
    let number: i64 = r.get("number");
    let state_str: String = r.get("state");
    let title: String = r.get("title");
    let body: Option<String> = r.get("body");
    let author: String = r.get("author");
    let created_at_str: String = r.get("created_at");
    let updated_at_str: String = r.get("updated_at");
    let merged_at_str: Option<String> = r.get("merged_at");

    Contribution::new(
        RepoRef::new(owner, repo)?,
        number as u64,
        ContributionState::from_str(&state_str)?,
        title,
        body,
        author,
        parse_dt(&created_at_str),
        parse_dt(&updated_at_str),
        merged_at_str.as_deref().map(parse_dt),
    )
}

fn row_to_score(r: &sqlx::sqlite::SqliteRow) -> Result<ClassifiedScore> {
    let owner: String = r.get("owner");
    let repo: String = r.get("repo");
    let number: i64 = r.get("number");
    let author: String = r.get("author");
    let bucket: i64 = r.get("bucket");
    let score: f64 = r.get("score");
    let merged_at_str: String = r.get("merged_at");
    let classified_at_str: String = r.get("classified_at");

    ClassifiedScore::new(
        RepoRef::new(owner, repo)?,
        number as u64,
        author,
        crate::models::Bucket::from_index(bucket as usize)?,
        score,
        parse_dt(&merged_at_str),
        parse_dt(&classified_at_str),
    )
}

fn row_to_lock(r: &sqlx::sqlite::SqliteRow) -> Result<JobLock> {
    let lock_id_str: String = r.get("lock_id");
    let subject: String = r.get("subject");
    let kind_str: String = r.get("kind");
    let status_str: String = r.get("status");
    let started_at_str: String = r.get("started_at");
    let completed_at_str: Option<String> = r.get("completed_at");
    let detail: Option<String> = r.get("detail");

    Ok(JobLock {
        lock_id: Uuid::parse_str(&lock_id_str).unwrap_or(Uuid::nil()),
        subject,
        kind: JobKind::from_str(&kind_str)?,
        status: JobStatus::from_str(&status_str)?,
        started_at: parse_dt(&started_at_str),
        completed_at: completed_at_str.as_deref().map(parse_dt),
        detail,
    })
}

// ── ContributionStore impl ─────────────────────────────────────

#[async_trait]
impl ContributionStore for SqliteStore {
    async fn upsert_contribution(&self, contribution: &Contribution) -> Result<()> {
        sqlx::query(
            "INSERT INTO contributions
               (owner, repo, number, state, title, body, author, created_at, updated_at, merged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(owner, repo, number) DO UPDATE SET
               state = excluded.state,
               title = excluded.title,
               body = excluded.body,
               author = excluded.author,
               updated_at = excluded.updated_at,
               merged_at = excluded.merged_at",
        )
        .bind(&contribution.repo.owner)
        .bind(&contribution.repo.name)
        .bind(contribution.number as i64)
        .bind(contribution.state.as_str())
        .bind(&contribution.title)
        .bind(&contribution.body)
        .bind(&contribution.author)
        .bind(contribution.created_at.to_rfc3339())
        .bind(contribution.updated_at.to_rfc3339())
        .bind(contribution.merged_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_contribution(&self, repo: &RepoRef, number: u64) -> Result<Option<Contribution>> {
        let row = sqlx::query(
            "SELECT owner, repo, number, state, title, body, author, created_at, updated_at, merged_at
             FROM contributions WHERE owner = ?1 AND repo = ?2 AND number = ?3",
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| row_to_contribution(&r)).transpose()
    }

    async fn highest_number(&self, repo: &RepoRef) -> Result<Option<u64>> {
        let row = sqlx::query(
            "SELECT MAX(number) AS highest FROM contributions WHERE owner = ?1 AND repo = ?2",
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let highest: Option<i64> = row.get("highest");
        Ok(highest.map(|n| n as u64))
    }

    async fn count_up_to(&self, repo: &RepoRef, number: u64) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM contributions
             WHERE owner = ?1 AND repo = ?2 AND number <= ?3",
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(number as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    async fn latest_updated_at(&self, repo: &RepoRef) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(updated_at) AS latest FROM contributions WHERE owner = ?1 AND repo = ?2",
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let latest: Option<String> = row.get("latest");
        Ok(latest.as_deref().map(parse_dt))
    }

    async fn count_contributions(&self, repo: &RepoRef) -> Result<u64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM contributions WHERE owner = ?1 AND repo = ?2")
                .bind(&repo.owner)
                .bind(&repo.name)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}

// ── ScoreStore impl ────────────────────────────────────────────

#[async_trait]
impl ScoreStore for SqliteStore {
    async fn upsert_score(&self, score: &ClassifiedScore) -> Result<()> {
        sqlx::query(
            "INSERT INTO classified_scores
               (owner, repo, number, author, bucket, score, merged_at, classified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(owner, repo, number) DO UPDATE SET
               author = excluded.author,
               bucket = excluded.bucket,
               score = excluded.score,
               merged_at = excluded.merged_at,
               classified_at = excluded.classified_at",
        )
        .bind(&score.repo.owner)
        .bind(&score.repo.name)
        .bind(score.number as i64)
        .bind(&score.author)
        .bind(score.bucket.index() as i64)
        .bind(score.score)
        .bind(score.merged_at.to_rfc3339())
        .bind(score.classified_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_scores(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClassifiedScore>> {
        let mut conditions = vec!["owner = ?1 AND repo = ?2".to_string()];
        let mut next_param = 3;

        if since.is_some() {
            conditions.push(format!("merged_at >= ?{next_param}"));
            next_param += 1;
        }
        if until.is_some() {
            conditions.push(format!("merged_at <= ?{next_param}"));
        }

        let sql = format!(
            "SELECT owner, repo, number, author, bucket, score, merged_at, classified_at
             FROM classified_scores WHERE {}
             ORDER BY merged_at, number",
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql).bind(&repo.owner).bind(&repo.name);
        if let Some(since) = since {
            query = query.bind(since.to_rfc3339());
        }
        if let Some(until) = until {
            query = query.bind(until.to_rfc3339());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_score).collect()
    }

    async fn list_unclassified_merged(
        &self,
        repo: &RepoRef,
        limit: usize,
    ) -> Result<Vec<Contribution>> {
        let rows = sqlx::query(
            "SELECT c.owner, c.repo, c.number, c.state, c.title, c.body, c.author,
                    c.created_at, c.updated_at, c.merged_at
             FROM contributions c
             LEFT JOIN classified_scores s
               ON s.owner = c.owner AND s.repo = c.repo AND s.number = c.number
             WHERE c.owner = ?1 AND c.repo = ?2
               AND c.merged_at IS NOT NULL
               AND s.number IS NULL
             ORDER BY c.number
             LIMIT ?3",
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_contribution).collect()
    }
}

// ── JobLockStore impl ──────────────────────────────────────────

#[async_trait]
impl JobLockStore for SqliteStore {
    async fn find_running(&self, subject: &str, kind: JobKind) -> Result<Option<JobLock>> {
        let row = sqlx::query(
            "SELECT lock_id, subject, kind, status, started_at, completed_at, detail
             FROM job_locks
             WHERE subject = ?1 AND kind = ?2 AND status = 'running'
             LIMIT 1",
        )
        .bind(subject)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| row_to_lock(&r)).transpose()
    }

    async fn insert(&self, lock: &JobLock) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_locks
               (lock_id, subject, kind, status, started_at, completed_at, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(lock.lock_id.to_string())
        .bind(&lock.subject)
        .bind(lock.kind.as_str())
        .bind(lock.status.as_str())
        .bind(lock.started_at.to_rfc3339())
        .bind(lock.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&lock.detail)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(
        &self,
        lock_id: Uuid,
        status: JobStatus,
        completed_at: Option<DateTime<Utc>>,
        detail: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_locks SET status = ?2, completed_at = ?3, detail = ?4
             WHERE lock_id = ?1",
        )
        .bind(lock_id.to_string())
        .bind(status.as_str())
        .bind(completed_at.map(|dt| dt.to_rfc3339()))
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("job lock {lock_id}")));
        }
        Ok(())
    }
}
