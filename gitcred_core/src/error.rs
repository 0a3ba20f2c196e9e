use std::error::Error as StdError;

/// Common error type for `gitcred_core`.
///
/// Variants map to caller-visible outcomes: `Auth` means the installation
/// token must be reissued before anything else is attempted, `Upstream` means
/// the external API misbehaved and the call may be retried later, `Storage`
/// means the local store failed and repeating the same write is unlikely to
/// help. Concrete transports and store backends should preserve the
/// underlying error chain via `Error::upstream` / `Error::storage`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("upstream api error: {context}")]
    Upstream {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("upstream api error: {0}")]
    UpstreamMessage(String),

    #[error("storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("storage error: {0}")]
    StorageMessage(String),
}

impl Error {
    #[tracing::instrument(level = "debug", name = "gitcred.error.upstream", skip(source))]
    pub fn upstream(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Convenience: wrap any transport error into `Upstream` with "reqwest" context.
    pub fn upstream_reqwest(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Upstream {
            context: "reqwest".into(),
            source: Box::new(source),
        }
    }

    #[tracing::instrument(level = "debug", name = "gitcred.error.storage", skip(source))]
    pub fn storage(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether a failed page fetch may be retried against the same page.
    ///
    /// Auth failures are not recoverable by retrying, and storage faults are
    /// not fixed by repeating the same idempotent write.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream { .. } | Error::UpstreamMessage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_taxonomy() {
        assert!(Error::UpstreamMessage("503".to_string()).is_retryable());
        assert!(Error::upstream("probe", std::fmt::Error).is_retryable());
        assert!(!Error::Auth("bad token".to_string()).is_retryable());
        assert!(!Error::storage("upsert", std::fmt::Error).is_retryable());
        assert!(!Error::Validation("empty owner".to_string()).is_retryable());
    }
}
