//! Shared in-memory stubs for the trait seams, used across module tests.

use crate::jobs::{JobKind, JobLock, JobStatus};
use crate::models::{ClassifiedScore, Contribution, ContributionState, RepoRef};
use crate::storage::traits::{ContributionStore, JobLockStore, ScoreStore};
use crate::sync::models::{PageRequest, SortDirection, SortKey};
use crate::sync::traits::PageFetcher;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub(crate) fn contribution(
    repo: &RepoRef,
    number: u64,
    updated_at: DateTime<Utc>,
    state: ContributionState,
) -> Contribution {
    let merged_at = match state {
        ContributionState::Merged => Some(updated_at),
        _ => None,
    };
    Contribution::new(
        repo.clone(),
        number,
        state,
        format!("change #{number}"),
        None,
        "alice",
        updated_at,
        updated_at,
        merged_at,
    )
    .expect("test contribution")
}

type ContributionKey = (String, String, u64);

/// In-memory store implementing all three storage seams.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    contributions: Mutex<HashMap<ContributionKey, Contribution>>,
    scores: Mutex<HashMap<ContributionKey, ClassifiedScore>>,
    locks: Mutex<Vec<JobLock>>,
    pub(crate) fail_upserts: AtomicBool,
}

impl InMemoryStore {
    fn key(repo: &RepoRef, number: u64) -> ContributionKey {
        (repo.owner.clone(), repo.name.clone(), number)
    }

    pub(crate) fn contribution_count(&self) -> usize {
        self.contributions.lock().expect("lock").len()
    }

    pub(crate) fn lock_rows(&self) -> Vec<JobLock> {
        self.locks.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ContributionStore for InMemoryStore {
    async fn upsert_contribution(&self, contribution: &Contribution) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::StorageMessage("stubbed upsert failure".to_string()));
        }
        self.contributions
            .lock()
            .expect("lock")
            .insert(Self::key(&contribution.repo, contribution.number), contribution.clone());
        Ok(())
    }

    async fn get_contribution(&self, repo: &RepoRef, number: u64) -> Result<Option<Contribution>> {
        Ok(self
            .contributions
            .lock()
            .expect("lock")
            .get(&Self::key(repo, number))
            .cloned())
    }

    async fn highest_number(&self, repo: &RepoRef) -> Result<Option<u64>> {
        Ok(self
            .contributions
            .lock()
            .expect("lock")
            .values()
            .filter(|c| c.repo == *repo)
            .map(|c| c.number)
            .max())
    }

    async fn count_up_to(&self, repo: &RepoRef, number: u64) -> Result<u64> {
        Ok(self
            .contributions
            .lock()
            .expect("lock")
            .values()
            .filter(|c| c.repo == *repo && c.number <= number)
            .count() as u64)
    }

    async fn latest_updated_at(&self, repo: &RepoRef) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .contributions
            .lock()
            .expect("lock")
            .values()
            .filter(|c| c.repo == *repo)
            .map(|c| c.updated_at)
            .max())
    }

    async fn count_contributions(&self, repo: &RepoRef) -> Result<u64> {
        Ok(self
            .contributions
            .lock()
            .expect("lock")
            .values()
            .filter(|c| c.repo == *repo)
            .count() as u64)
    }
}

#[async_trait]
impl ScoreStore for InMemoryStore {
    async fn upsert_score(&self, score: &ClassifiedScore) -> Result<()> {
        self.scores
            .lock()
            .expect("lock")
            .insert(Self::key(&score.repo, score.number), score.clone());
        Ok(())
    }

    async fn list_scores(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClassifiedScore>> {
        let mut out: Vec<ClassifiedScore> = self
            .scores
            .lock()
            .expect("lock")
            .values()
            .filter(|s| s.repo == *repo)
            .filter(|s| since.map(|t| s.merged_at >= t).unwrap_or(true))
            .filter(|s| until.map(|t| s.merged_at <= t).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.merged_at.cmp(&b.merged_at).then(a.number.cmp(&b.number)));
        Ok(out)
    }

    async fn list_unclassified_merged(
        &self,
        repo: &RepoRef,
        limit: usize,
    ) -> Result<Vec<Contribution>> {
        let scores = self.scores.lock().expect("lock");
        let mut out: Vec<Contribution> = self
            .contributions
            .lock()
            .expect("lock")
            .values()
            .filter(|c| {
                c.repo == *repo
                    && c.merged_at.is_some()
                    && !scores.contains_key(&Self::key(&c.repo, c.number))
            })
            .cloned()
            .collect();
        out.sort_by_key(|c| c.number);
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait]
impl JobLockStore for InMemoryStore {
    async fn find_running(&self, subject: &str, kind: JobKind) -> Result<Option<JobLock>> {
        Ok(self
            .locks
            .lock()
            .expect("lock")
            .iter()
            .find(|l| l.subject == subject && l.kind == kind && l.status == JobStatus::Running)
            .cloned())
    }

    async fn insert(&self, lock: &JobLock) -> Result<()> {
        self.locks.lock().expect("lock").push(lock.clone());
        Ok(())
    }

    async fn update(
        &self,
        lock_id: Uuid,
        status: JobStatus,
        completed_at: Option<DateTime<Utc>>,
        detail: Option<String>,
    ) -> Result<()> {
        let mut locks = self.locks.lock().expect("lock");
        let Some(row) = locks.iter_mut().find(|l| l.lock_id == lock_id) else {
            return Err(Error::NotFound(format!("job lock {lock_id}")));
        };
        row.status = status;
        row.completed_at = completed_at;
        row.detail = detail;
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedState {
    number_probe: Vec<Contribution>,
    updated_probe: Vec<Contribution>,
    number_pages: HashMap<u32, Vec<Contribution>>,
    updated_pages: HashMap<u32, Vec<Contribution>>,
    failing_number_pages: Vec<u32>,
    requests: Vec<PageRequest>,
}

/// Scripted page source: probes and pages are seeded up front, every request
/// is recorded so tests can assert how much fetching a sync actually did.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    state: Mutex<ScriptedState>,
    fail_all: AtomicBool,
}

impl ScriptedFetcher {
    pub(crate) fn failing() -> Self {
        let fetcher = Self::default();
        fetcher.fail_all.store(true, Ordering::SeqCst);
        fetcher
    }

    pub(crate) fn push_probe_results(
        &self,
        number_probe: Vec<Contribution>,
        updated_probe: Vec<Contribution>,
    ) {
        let mut state = self.state.lock().expect("lock");
        state.number_probe = number_probe;
        state.updated_probe = updated_probe;
    }

    pub(crate) fn set_number_page(&self, page: u32, items: Vec<Contribution>) {
        self.state
            .lock()
            .expect("lock")
            .number_pages
            .insert(page, items);
    }

    pub(crate) fn set_updated_page(&self, page: u32, items: Vec<Contribution>) {
        self.state
            .lock()
            .expect("lock")
            .updated_pages
            .insert(page, items);
    }

    pub(crate) fn fail_number_page(&self, page: u32) {
        self.state
            .lock()
            .expect("lock")
            .failing_number_pages
            .push(page);
    }

    pub(crate) fn requests(&self) -> Vec<PageRequest> {
        self.state.lock().expect("lock").requests.clone()
    }

    /// Requests that were actual sync-phase page fetches, not watermark probes.
    pub(crate) fn page_fetch_count(&self) -> usize {
        self.requests().iter().filter(|r| r.per_page > 1).count()
    }

    pub(crate) fn updated_page_fetch_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.per_page > 1 && r.sort == SortKey::Updated)
            .count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, _repo: &RepoRef, request: &PageRequest) -> Result<Vec<Contribution>> {
        let mut state = self.state.lock().expect("lock");
        state.requests.push(request.clone());
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::UpstreamMessage("stubbed fetch failure".to_string()));
        }

        let is_probe = request.per_page == 1 && request.direction == SortDirection::Desc;
        let items = match (request.sort, is_probe) {
            (SortKey::Number, true) => state.number_probe.clone(),
            (SortKey::Updated, true) => state.updated_probe.clone(),
            (SortKey::Number, false) => {
                if state.failing_number_pages.contains(&request.page) {
                    return Err(Error::UpstreamMessage(format!(
                        "stubbed failure on page {}",
                        request.page
                    )));
                }
                state.number_pages.get(&request.page).cloned().unwrap_or_default()
            }
            (SortKey::Updated, false) => state
                .updated_pages
                .get(&request.page)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(items)
    }
}
