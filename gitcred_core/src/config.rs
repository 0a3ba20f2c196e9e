use crate::{Error, Result};
use std::time::Duration;

/// Tunables for the incremental sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items requested per page. The upstream API caps this at 100.
    pub page_size: u32,
    /// Pages fetched concurrently per phase-1 batch.
    pub batch_pages: usize,
    /// Attempts per page before the fetch error is surfaced.
    pub retry_attempts: u32,
    /// Linear backoff base between attempts (`base * attempt`).
    pub retry_backoff: Duration,
    /// Wall-clock ceiling for one whole sync run.
    pub run_ceiling: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_pages: 10,
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            run_ceiling: Duration::from_secs(10 * 60),
        }
    }
}

impl SyncConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let page_size = std::env::var("GITCRED_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.page_size);
        let batch_pages = std::env::var("GITCRED_BATCH_PAGES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.batch_pages);
        let retry_attempts = std::env::var("GITCRED_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.retry_attempts);
        let retry_backoff_ms = std::env::var("GITCRED_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);
        let run_ceiling_secs = std::env::var("GITCRED_RUN_CEILING_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.run_ceiling);

        let cfg = Self {
            page_size,
            batch_pages,
            retry_attempts,
            retry_backoff: retry_backoff_ms,
            run_ceiling: run_ceiling_secs,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Validation(
                "page_size must be in 1..=100".to_string(),
            ));
        }
        if self.batch_pages == 0 {
            return Err(Error::Validation("batch_pages must be >= 1".to_string()));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Validation("retry_attempts must be >= 1".to_string()));
        }
        if self.run_ceiling.is_zero() {
            return Err(Error::Validation("run_ceiling must be > 0".to_string()));
        }
        Ok(())
    }
}
