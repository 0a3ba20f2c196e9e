//! External classifier seam.
//!
//! The classifier itself — the LLM pipeline that reads a contribution's diff
//! and metadata and assigns a complexity bucket plus a raw score — lives
//! outside this crate. This module owns the trait it is consumed through and
//! the runner that walks unclassified merged contributions under a job lock.

use crate::jobs::{JobKind, JobLockManager, JobStatus};
use crate::models::{Bucket, ClassifiedScore, Contribution, RepoRef};
use crate::storage::traits::ScoreStore;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Classifier output for one contribution. The score sits on the fixed
/// bucket scale (bucket 0 -> -2.0 ... bucket 3 -> +2.0) and is assigned
/// once; this crate never recomputes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub bucket: Bucket,
    pub score: f64,
}

impl Classification {
    #[tracing::instrument(level = "debug")]
    pub fn new(bucket: Bucket, score: f64) -> Result<Self> {
        if !score.is_finite() {
            return Err(Error::Validation(
                "classification score must be finite".to_string(),
            ));
        }
        Ok(Self { bucket, score })
    }
}

/// Assigns a complexity bucket and raw score to one merged contribution.
///
/// Implementations fetch whatever context they need (diff, linked issues)
/// themselves; this crate only hands over the mirrored metadata.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, contribution: &Contribution) -> Result<Classification>;
}

/// Walks merged-but-unclassified contributions and persists one
/// `ClassifiedScore` per item, under a `classify` job lock.
pub struct ClassificationRunner {
    classifier: Arc<dyn Classifier>,
    scores: Arc<dyn ScoreStore>,
    locks: JobLockManager,
    batch_size: usize,
    run_ceiling: Duration,
}

impl ClassificationRunner {
    #[tracing::instrument(level = "debug", skip(classifier, scores, locks))]
    pub fn new(
        classifier: Arc<dyn Classifier>,
        scores: Arc<dyn ScoreStore>,
        locks: JobLockManager,
        run_ceiling: Duration,
    ) -> Result<Self> {
        if run_ceiling.is_zero() {
            return Err(Error::Validation("run_ceiling must be > 0".to_string()));
        }
        Ok(Self {
            classifier,
            scores,
            locks,
            batch_size: 100,
            run_ceiling,
        })
    }

    /// Classify every pending merged contribution for one repository.
    /// Returns the number of scores written.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn classify_pending(&self, repo: &RepoRef) -> Result<u64> {
        let acquired = self
            .locks
            .acquire(&repo.full_name(), JobKind::Classify)
            .await?;
        if acquired.already_running {
            return Err(Error::Conflict(format!(
                "classification already running for {repo}"
            )));
        }
        let lock_id = acquired.lock.lock_id;

        let result = match tokio::time::timeout(self.run_ceiling, self.run(repo)).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamMessage(format!(
                "classification run for {repo} exceeded the {}s ceiling",
                self.run_ceiling.as_secs()
            ))),
        };

        match &result {
            Ok(classified) => {
                let detail = serde_json::json!({ "classified": classified });
                self.locks
                    .release(lock_id, JobStatus::Completed, Some(detail.to_string()))
                    .await?;
            }
            Err(e) => {
                if let Err(release_err) = self
                    .locks
                    .release(lock_id, JobStatus::Failed, Some(e.to_string()))
                    .await
                {
                    tracing::warn!(
                        error = %release_err,
                        %repo,
                        "failed to mark job lock failed after classification error"
                    );
                }
            }
        }
        result
    }

    async fn run(&self, repo: &RepoRef) -> Result<u64> {
        let mut classified = 0u64;
        loop {
            let pending = self
                .scores
                .list_unclassified_merged(repo, self.batch_size)
                .await?;
            if pending.is_empty() {
                return Ok(classified);
            }

            for contribution in pending {
                let Some(merged_at) = contribution.merged_at else {
                    continue;
                };
                let classification = self.classifier.classify(&contribution).await?;
                let score = ClassifiedScore::new(
                    contribution.repo.clone(),
                    contribution.number,
                    contribution.author.clone(),
                    classification.bucket,
                    classification.score,
                    merged_at,
                    Utc::now(),
                )?;
                self.scores.upsert_score(&score).await?;
                classified += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContributionState;
    use crate::storage::traits::{ContributionStore as _, ScoreStore as _};
    use crate::test_support::{contribution, InMemoryStore};

    struct ScaleClassifier;

    #[async_trait]
    impl Classifier for ScaleClassifier {
        async fn classify(&self, contribution: &Contribution) -> Result<Classification> {
            let bucket = Bucket::from_index((contribution.number % 4) as usize)?;
            Classification::new(bucket, bucket.midpoint_score())
        }
    }

    fn repo() -> RepoRef {
        RepoRef::new("octo", "credits").expect("repo ref")
    }

    #[tokio::test]
    async fn pending_merged_contributions_are_classified_once() {
        let repo = repo();
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::default());
        for n in 1..=5 {
            let state = if n == 5 {
                ContributionState::Open
            } else {
                ContributionState::Merged
            };
            store
                .upsert_contribution(&contribution(&repo, n, now, state))
                .await
                .expect("seed");
        }

        let runner = ClassificationRunner::new(
            Arc::new(ScaleClassifier),
            store.clone(),
            JobLockManager::new(store.clone()),
            Duration::from_secs(5),
        )
        .expect("runner");

        let classified = runner.classify_pending(&repo).await.expect("classify");
        assert_eq!(classified, 4);

        // Re-running finds nothing left to do.
        let again = runner.classify_pending(&repo).await.expect("re-classify");
        assert_eq!(again, 0);

        let scores = store.list_scores(&repo, None, None).await.expect("scores");
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| s.number != 5));
    }

    #[tokio::test]
    async fn duplicate_classification_run_is_rejected() {
        let repo = repo();
        let store = Arc::new(InMemoryStore::default());
        let lock = crate::jobs::JobLock::new_running(repo.full_name(), JobKind::Classify, Utc::now())
            .expect("lock");
        crate::storage::traits::JobLockStore::insert(store.as_ref(), &lock)
            .await
            .expect("insert lock");

        let runner = ClassificationRunner::new(
            Arc::new(ScaleClassifier),
            store.clone(),
            JobLockManager::new(store),
            Duration::from_secs(5),
        )
        .expect("runner");

        let err = runner
            .classify_pending(&repo)
            .await
            .expect_err("duplicate run");
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn classifier_failure_marks_the_lock_failed() {
        struct FailingClassifier;

        #[async_trait]
        impl Classifier for FailingClassifier {
            async fn classify(&self, _contribution: &Contribution) -> Result<Classification> {
                Err(Error::UpstreamMessage("model unavailable".to_string()))
            }
        }

        let repo = repo();
        let store = Arc::new(InMemoryStore::default());
        store
            .upsert_contribution(&contribution(&repo, 1, Utc::now(), ContributionState::Merged))
            .await
            .expect("seed");

        let runner = ClassificationRunner::new(
            Arc::new(FailingClassifier),
            store.clone(),
            JobLockManager::new(store.clone()),
            Duration::from_secs(5),
        )
        .expect("runner");

        let err = runner
            .classify_pending(&repo)
            .await
            .expect_err("classifier failure");
        assert!(matches!(err, Error::UpstreamMessage(_)));
        assert_eq!(store.lock_rows()[0].status, JobStatus::Failed);
    }
}
