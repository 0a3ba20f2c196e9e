use crate::config::SyncConfig;
use crate::jobs::{JobKind, JobLockManager, JobStatus};
use crate::models::{RepoRef, SyncOutcome};
use crate::storage::traits::ContributionStore;
use crate::sync::models::PageRequest;
use crate::sync::staleness::StalenessDetector;
use crate::sync::traits::PageFetcher;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Two-phase incremental sync of one repository's contribution history.
///
/// Phase 1 catches up on numbers the local mirror has never seen, fetching
/// number-ascending pages in fixed-size concurrent batches. Phase 2 walks
/// updated-descending pages one at a time until it crosses the update
/// watermark captured before phase 1 ran, bounding its cost to the items
/// that actually changed since the last successful sync.
///
/// Partial progress survives failures: all writes are idempotent upserts and
/// both phase boundaries are recomputed from local state on the next run.
pub struct SyncEngine {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ContributionStore>,
    locks: JobLockManager,
    staleness: StalenessDetector,
    config: SyncConfig,
}

impl SyncEngine {
    #[tracing::instrument(level = "debug", skip(fetcher, store, locks))]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ContributionStore>,
        locks: JobLockManager,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let staleness = StalenessDetector::new(fetcher.clone(), store.clone());
        Ok(Self {
            fetcher,
            store,
            locks,
            staleness,
            config,
        })
    }

    /// Run one sync. Rejected with `Error::Conflict` when a sync for the
    /// same repository is already in flight.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn sync(&self, repo: &RepoRef) -> Result<SyncOutcome> {
        let acquired = self.locks.acquire(&repo.full_name(), JobKind::Sync).await?;
        if acquired.already_running {
            return Err(Error::Conflict(format!(
                "sync already running for {repo} (started {})",
                acquired.lock.started_at
            )));
        }
        let lock_id = acquired.lock.lock_id;

        let result = match tokio::time::timeout(self.config.run_ceiling, self.run(repo)).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamMessage(format!(
                "sync run for {repo} exceeded the {}s ceiling",
                self.config.run_ceiling.as_secs()
            ))),
        };

        match &result {
            Ok(outcome) => {
                let detail = serde_json::json!({ "total_synced": outcome.total_synced });
                self.locks
                    .release(lock_id, JobStatus::Completed, Some(detail.to_string()))
                    .await?;
            }
            Err(e) => {
                // The sync error wins over a release failure.
                if let Err(release_err) = self
                    .locks
                    .release(lock_id, JobStatus::Failed, Some(e.to_string()))
                    .await
                {
                    tracing::warn!(
                        error = %release_err,
                        %repo,
                        "failed to mark job lock failed after sync error"
                    );
                }
            }
        }
        result
    }

    async fn run(&self, repo: &RepoRef) -> Result<SyncOutcome> {
        if !self.staleness.is_stale(repo).await? {
            tracing::debug!(%repo, "local mirror is current, skipping sync");
            return self.outcome(repo, 0).await;
        }

        // Captured before phase 1: items phase 1 writes carry fresh update
        // timestamps that would otherwise mask older mutations from phase 2.
        let watermark = self.store.latest_updated_at(repo).await?;

        let mut total = self.catch_up_new(repo).await?;
        total += self.catch_up_updated(repo, watermark).await?;
        self.outcome(repo, total).await
    }

    /// Phase 1: fetch every number-ascending page from the first page not
    /// fully covered locally through the page holding the remote highest
    /// number, in concurrent batches of `config.batch_pages`.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn catch_up_new(&self, repo: &RepoRef) -> Result<u64> {
        let Some(remote_highest) = self.staleness.remote_highest_number(repo).await? else {
            return Ok(0);
        };
        let page_size = u64::from(self.config.page_size);
        let local_count = match self.store.highest_number(repo).await? {
            Some(highest) => self.store.count_up_to(repo, highest).await?,
            None => 0,
        };

        let first_page = (local_count / page_size + 1) as u32;
        let last_page = (remote_highest / page_size + 1) as u32;
        let batch_pages = self.config.batch_pages as u32;

        let mut upserted = 0u64;
        let mut batch_start = first_page;
        while batch_start <= last_page {
            let batch_end = (batch_start + batch_pages - 1).min(last_page);
            let batch_items = self.fetch_batch(repo, batch_start, batch_end).await?;
            let fetched = batch_items.len() as u64;
            for item in &batch_items {
                self.store.upsert_contribution(item).await?;
            }
            upserted += fetched;

            let requested = u64::from(batch_end - batch_start + 1) * page_size;
            if fetched < requested {
                // Short batch: the collection is exhausted.
                break;
            }
            batch_start = batch_end + 1;
        }

        tracing::debug!(%repo, upserted, first_page, last_page, "phase 1 complete");
        Ok(upserted)
    }

    /// Fetch pages `[start, end]` concurrently, failing the whole batch on
    /// the first page error. Batches never overlap: the next batch is not
    /// submitted until this one fully completes.
    async fn fetch_batch(
        &self,
        repo: &RepoRef,
        start: u32,
        end: u32,
    ) -> Result<Vec<crate::models::Contribution>> {
        let mut set = JoinSet::new();
        for page in start..=end {
            let fetcher = self.fetcher.clone();
            let repo = repo.clone();
            let request = PageRequest::numbers_ascending(page, self.config.page_size)?;
            set.spawn(async move { fetcher.fetch_page(&repo, &request).await });
        }

        let mut items = Vec::new();
        while let Some(joined) = set.join_next().await {
            let page_items = joined
                .map_err(|e| Error::UpstreamMessage(format!("page fetch task failed: {e}")))??;
            items.extend(page_items);
        }
        Ok(items)
    }

    /// Phase 2: walk updated-descending pages strictly sequentially, upserting
    /// until an item at or below the watermark is encountered. The stopping
    /// condition depends on seeing items in strict order, so this phase is
    /// never parallelized.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn catch_up_updated(
        &self,
        repo: &RepoRef,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let Some(watermark) = watermark else {
            return Ok(0);
        };

        let mut upserted = 0u64;
        let mut page = 1u32;
        loop {
            let request = PageRequest::updated_descending(page, self.config.page_size)?;
            let items = self.fetcher.fetch_page(repo, &request).await?;
            let fetched = items.len() as u64;

            for item in items {
                if item.updated_at <= watermark {
                    tracing::debug!(%repo, upserted, page, "phase 2 reached watermark");
                    return Ok(upserted);
                }
                self.store.upsert_contribution(&item).await?;
                upserted += 1;
            }

            if fetched < u64::from(self.config.page_size) {
                // End of collection without crossing the watermark.
                tracing::debug!(%repo, upserted, page, "phase 2 exhausted collection");
                return Ok(upserted);
            }
            page += 1;
        }
    }

    async fn outcome(&self, repo: &RepoRef, total_synced: u64) -> Result<SyncOutcome> {
        let latest = match self.store.highest_number(repo).await? {
            Some(number) => self.store.get_contribution(repo, number).await?,
            None => None,
        };
        Ok(SyncOutcome {
            total_synced,
            latest,
        })
    }
}
