use crate::models::{Contribution, RepoRef};
use crate::sync::models::PageRequest;
use crate::sync::traits::{PageFetcher, PageTransport};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Applies the per-page retry contract to any transport.
///
/// Transient failures are retried against the same page with linear backoff
/// (`backoff * attempt`); auth failures surface immediately because retrying
/// cannot recover them.
pub struct RetryingFetcher<T> {
    transport: T,
    attempts: u32,
    backoff: Duration,
}

impl<T: PageTransport> RetryingFetcher<T> {
    #[tracing::instrument(level = "debug", skip(transport))]
    pub fn new(transport: T, attempts: u32, backoff: Duration) -> Result<Self> {
        if attempts == 0 {
            return Err(Error::Validation(
                "retry attempts must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            transport,
            attempts,
            backoff,
        })
    }
}

#[async_trait]
impl<T: PageTransport> PageFetcher for RetryingFetcher<T> {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, repo: &RepoRef, request: &PageRequest) -> Result<Vec<Contribution>> {
        for attempt in 1..=self.attempts {
            match self.transport.fetch_page(repo, request).await {
                Ok(items) => return Ok(items),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.attempts {
                        return Err(e);
                    }
                    let delay = self.backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        page = request.page,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "page fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(Error::UpstreamMessage(
            "unreachable retry loop".to_string(),
        ))
    }
}
