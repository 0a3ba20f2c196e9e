use crate::attribution::engine::attribute;
use crate::attribution::models::{AttributionOverrides, AuthorCredit};
use crate::models::ClassifiedScore;
use crate::{Error, Result};

/// Authors returned per timeline snapshot.
pub const SNAPSHOT_RANKING_LIMIT: usize = 10;

/// One source in a multi-source timeline, with its emphasis weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSource {
    pub scores: Vec<ClassifiedScore>,
    pub weight: f64,
}

impl WeightedSource {
    #[tracing::instrument(level = "debug", skip(scores))]
    pub fn new(scores: Vec<ClassifiedScore>, weight: f64) -> Result<Self> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::Validation(
                "source weight must be finite and > 0".to_string(),
            ));
        }
        Ok(Self { scores, weight })
    }

    /// The neutral weight applied when a caller does not care about emphasis.
    pub fn unweighted(scores: Vec<ClassifiedScore>) -> Self {
        Self {
            scores,
            weight: 1.0,
        }
    }
}

/// Chronological order used for scrubbing: merge time, ties broken by repo
/// and number so replays are deterministic.
fn chronological(a: &ClassifiedScore, b: &ClassifiedScore) -> std::cmp::Ordering {
    a.merged_at
        .cmp(&b.merged_at)
        .then_with(|| a.repo.full_name().cmp(&b.repo.full_name()))
        .then_with(|| a.number.cmp(&b.number))
}

/// Attribution over the first `prefix_len` merged items of one source,
/// recomputed from scratch for every prefix requested.
///
/// Returns the top ten authors by credit. The exact pipeline from
/// [`attribute`] runs over the prefix — this is the same math as the bulk
/// aggregate, just scoped to a growing slice of history.
#[tracing::instrument(level = "debug", skip(scores, overrides), fields(scores = scores.len()))]
pub fn snapshot_at(
    scores: &[ClassifiedScore],
    prefix_len: usize,
    overrides: Option<&AttributionOverrides>,
) -> Result<Vec<AuthorCredit>> {
    let mut ordered = scores.to_vec();
    ordered.sort_by(chronological);
    ordered.truncate(prefix_len);

    let snapshot = attribute(&ordered, overrides)?;
    Ok(top_ranking(snapshot.ranking))
}

/// Attribution over the first `prefix_len` items of a multi-source timeline,
/// merged chronologically across all sources regardless of origin.
///
/// Every score is shifted by `+|global minimum|` before its source weight is
/// multiplied in. The ordering matters: weighting a still-negative score by
/// anything > 1 would push it further negative and invert the emphasis, so
/// all scores are made non-negative first.
#[tracing::instrument(level = "debug", skip(sources, overrides), fields(sources = sources.len()))]
pub fn weighted_snapshot_at(
    sources: &[WeightedSource],
    prefix_len: usize,
    overrides: Option<&AttributionOverrides>,
) -> Result<Vec<AuthorCredit>> {
    let mut merged: Vec<(ClassifiedScore, f64)> = Vec::new();
    for source in sources {
        if !source.weight.is_finite() || source.weight <= 0.0 {
            return Err(Error::Validation(
                "source weight must be finite and > 0".to_string(),
            ));
        }
        for score in &source.scores {
            merged.push((score.clone(), source.weight));
        }
    }
    merged.sort_by(|a, b| chronological(&a.0, &b.0));
    merged.truncate(prefix_len);

    if merged.is_empty() {
        return Ok(Vec::new());
    }

    let global_min = merged
        .iter()
        .map(|(s, _)| s.score)
        .fold(f64::INFINITY, f64::min);
    let shift = global_min.abs();

    let weighted: Vec<ClassifiedScore> = merged
        .into_iter()
        .map(|(mut score, weight)| {
            score.score = (score.score + shift) * weight;
            score
        })
        .collect();

    let snapshot = attribute(&weighted, overrides)?;
    Ok(top_ranking(snapshot.ranking))
}

fn top_ranking(mut ranking: Vec<AuthorCredit>) -> Vec<AuthorCredit> {
    ranking.truncate(SNAPSHOT_RANKING_LIMIT);
    ranking
}
