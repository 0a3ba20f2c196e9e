use crate::attribution::models::{
    AttributionOverrides, AttributionSnapshot, AuthorCredit, BucketCredit, QuartileStat,
};
use crate::models::{Bucket, ClassifiedScore};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Floor applied to attribution weights. Guarantees every item carries a
/// strictly positive, comparable weight: low-bucket items are never fully
/// erased and the per-bucket divisions below never see a zero denominator.
const ATTRIB_EPSILON: f64 = 1e-9;

/// Distribute 100% of credit across the authors of `items`.
///
/// The scoring contract, applied to one fixed set of classified scores:
///
/// 1. min-max normalize raw scores over the whole set (all-equal degenerates
///    to 0 for every item),
/// 2. square the normalized score and floor it at epsilon — squaring
///    concentrates credit on higher-normalized items,
/// 3. aggregate attribution mass per bucket and derive each bucket's target
///    share of the total,
/// 4. renormalize bucket shares (identity unless `overrides` replaces them),
/// 5. split each bucket's share across its items proportionally to their
///    attribution weight, and
/// 6. sum per-item credit by author, ranking authors descending.
///
/// Pure and total: no I/O, always terminates, and for any non-empty input the
/// returned percentages sum to 1 within floating error.
#[tracing::instrument(level = "debug", skip(items, overrides), fields(items = items.len()))]
pub fn attribute(
    items: &[ClassifiedScore],
    overrides: Option<&AttributionOverrides>,
) -> Result<AttributionSnapshot> {
    for item in items {
        if !item.score.is_finite() {
            return Err(Error::Validation(format!(
                "score for {}#{} is not finite",
                item.repo, item.number
            )));
        }
        if item.author.trim().is_empty() {
            return Err(Error::Validation(format!(
                "author for {}#{} is empty",
                item.repo, item.number
            )));
        }
    }
    if items.is_empty() {
        return Ok(AttributionSnapshot::empty());
    }

    let lo = items.iter().map(|i| i.score).fold(f64::INFINITY, f64::min);
    let hi = items
        .iter()
        .map(|i| i.score)
        .fold(f64::NEG_INFINITY, f64::max);

    let attribs: Vec<f64> = items
        .iter()
        .map(|item| {
            let norm = if hi > lo {
                (item.score - lo) / (hi - lo)
            } else {
                0.0
            };
            (norm * norm).max(ATTRIB_EPSILON)
        })
        .collect();

    let mut bucket_sum = [0.0f64; Bucket::COUNT];
    let mut bucket_count = [0u64; Bucket::COUNT];
    for (item, attrib) in items.iter().zip(&attribs) {
        let b = item.bucket.index();
        bucket_sum[b] += attrib;
        bucket_count[b] += 1;
    }

    let total_attrib: f64 = attribs.iter().sum();
    let mut target_pct = [0.0f64; Bucket::COUNT];
    for b in 0..Bucket::COUNT {
        if bucket_count[b] > 0 {
            target_pct[b] = bucket_sum[b] / total_attrib;
        }
    }

    // Renormalization hook: an identity under the default target shares (they
    // already sum to 1), but override shares need not — only buckets present
    // in the input participate, so credit always lands on real items.
    let shares = overrides.map(|o| o.bucket_pct).unwrap_or(target_pct);
    let share_total: f64 = (0..Bucket::COUNT)
        .filter(|b| bucket_count[*b] > 0)
        .map(|b| shares[b])
        .sum();
    let mut final_bucket_pct = [0.0f64; Bucket::COUNT];
    for b in 0..Bucket::COUNT {
        if bucket_count[b] > 0 && share_total > 0.0 {
            final_bucket_pct[b] = shares[b] / share_total;
        }
    }

    let item_pcts: Vec<f64> = items
        .iter()
        .zip(&attribs)
        .map(|(item, attrib)| {
            let b = item.bucket.index();
            if bucket_sum[b] > 0.0 {
                attrib / bucket_sum[b] * final_bucket_pct[b]
            } else {
                // Only reachable without the epsilon floor; split evenly.
                final_bucket_pct[b] / bucket_count[b] as f64
            }
        })
        .collect();

    let mut by_author: BTreeMap<&str, AuthorCredit> = BTreeMap::new();
    for (item, pct) in items.iter().zip(&item_pcts) {
        let entry = by_author
            .entry(item.author.as_str())
            .or_insert_with(|| AuthorCredit {
                author: item.author.clone(),
                pct: 0.0,
                per_bucket: [BucketCredit::default(); Bucket::COUNT],
            });
        entry.pct += pct;
        let b = item.bucket.index();
        entry.per_bucket[b].count += 1;
        entry.per_bucket[b].pct += pct;
    }
    let mut ranking: Vec<AuthorCredit> = by_author.into_values().collect();
    ranking.sort_by(|a, b| {
        b.pct
            .partial_cmp(&a.pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.author.cmp(&b.author))
    });

    let mut quartiles = [QuartileStat::default(); Bucket::COUNT];
    for (item, pct) in items.iter().zip(&item_pcts) {
        let stat = &mut quartiles[item.bucket.index()];
        if stat.count == 0 {
            stat.min_pct = *pct;
            stat.max_pct = *pct;
        } else {
            stat.min_pct = stat.min_pct.min(*pct);
            stat.max_pct = stat.max_pct.max(*pct);
        }
        stat.count += 1;
        stat.aggregate_pct += pct;
    }

    Ok(AttributionSnapshot { ranking, quartiles })
}
