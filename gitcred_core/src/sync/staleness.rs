use crate::models::RepoRef;
use crate::storage::traits::ContributionStore;
use crate::sync::models::{PageRequest, SortKey};
use crate::sync::traits::PageFetcher;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Decides whether a sync is necessary at all by comparing local and remote
/// high-water marks, so an up-to-date mirror costs two one-item probes
/// instead of a history scan.
pub struct StalenessDetector {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ContributionStore>,
}

impl StalenessDetector {
    #[tracing::instrument(level = "debug", skip(fetcher, store))]
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn ContributionStore>) -> Self {
        Self { fetcher, store }
    }

    /// Highest contribution number on the remote, read via a one-item probe.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remote_highest_number(&self, repo: &RepoRef) -> Result<Option<u64>> {
        let request = PageRequest::probe(SortKey::Number);
        Ok(self
            .fetcher
            .fetch_page(repo, &request)
            .await?
            .into_iter()
            .next()
            .map(|c| c.number))
    }

    /// Most recent `updated_at` on the remote, read via a one-item probe.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remote_latest_updated(&self, repo: &RepoRef) -> Result<Option<DateTime<Utc>>> {
        let request = PageRequest::probe(SortKey::Updated);
        Ok(self
            .fetcher
            .fetch_page(repo, &request)
            .await?
            .into_iter()
            .next()
            .map(|c| c.updated_at))
    }

    /// Returns `false` only when both the number and the update watermarks
    /// agree nothing changed. Probe fetch errors are treated as stale: it is
    /// cheaper to re-sync than to silently skip a divergence.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn is_stale(&self, repo: &RepoRef) -> Result<bool> {
        let local_highest = self.store.highest_number(repo).await?;
        let number_signal = match self.remote_highest_number(repo).await {
            Ok(remote) => match (local_highest, remote) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(local), Some(remote)) => remote > local,
            },
            Err(e) => {
                tracing::warn!(error = %e, %repo, "remote number probe failed, treating as stale");
                true
            }
        };
        if number_signal {
            return Ok(true);
        }

        let local_latest = self.store.latest_updated_at(repo).await?;
        let updated_signal = match self.remote_latest_updated(repo).await {
            Ok(remote) => match (local_latest, remote) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(local), Some(remote)) => remote > local,
            },
            Err(e) => {
                tracing::warn!(error = %e, %repo, "remote update probe failed, treating as stale");
                true
            }
        };
        Ok(updated_signal)
    }
}
