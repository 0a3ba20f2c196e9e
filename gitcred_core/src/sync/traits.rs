use crate::models::{Contribution, RepoRef};
use crate::sync::models::PageRequest;
use crate::Result;
use async_trait::async_trait;

/// One attempt against the external paginated collection, no retry.
///
/// Transport implementations live in `gitcred_integrations` or caller code.
/// A transport maps its protocol failures onto the error taxonomy: auth
/// failures to `Error::Auth` (never retried), transient API faults to
/// `Error::Upstream*` (retryable).
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch_page(&self, repo: &RepoRef, request: &PageRequest) -> Result<Vec<Contribution>>;
}

/// A page source with the retry contract already applied.
///
/// This is the seam the sync engine and staleness detector consume;
/// `RetryingFetcher` adapts any `PageTransport` into one.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, repo: &RepoRef, request: &PageRequest) -> Result<Vec<Contribution>>;
}
