//! Top-K ranking metrics: Recall, Precision and NDCG at K.
use std::cmp::Ordering;

use rayon::prelude::*;

use super::{ItemId, PredictionError, RankingModel};
use crate::data::CompressedInteractions;

/// Ranking metrics averaged over evaluated users.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean `|top-K ∩ G| / |G|`.
    pub recall: f32,
    /// Mean `|top-K ∩ G| / K`.
    pub precision: f32,
    /// Mean normalised discounted cumulative gain.
    pub ndcg: f32,
    /// Number of users with non-empty ground truth.
    pub num_users: usize,
}

/// Indices of the `k` largest finite scores, best first.
///
/// Non-finite scores (used to mask excluded items) are never returned, so the
/// result can be shorter than `k`. Equal scores are ordered by ascending index.
pub fn top_k(scores: &[f32], k: usize) -> Vec<ItemId> {
    let mut candidates: Vec<(ItemId, f32)> = scores
        .iter()
        .cloned()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .collect();

    let by_rank = |a: &(ItemId, f32), b: &(ItemId, f32)| -> Ordering {
        b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
    };

    if k == 0 {
        return Vec::new();
    }

    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, by_rank);
        candidates.truncate(k);
    }

    candidates.sort_unstable_by(by_rank);
    candidates.into_iter().map(|(item_id, _)| item_id).collect()
}

fn discount(rank: usize) -> f32 {
    1.0 / ((rank + 2) as f32).log2()
}

/// Recall, precision and NDCG of one ranking against sorted ground truth.
fn user_metrics(ranked: &[ItemId], ground_truth: &[ItemId], k: usize) -> (f32, f32, f32) {
    if ground_truth.is_empty() || k == 0 {
        return (0.0, 0.0, 0.0);
    }

    let mut hits = 0;
    let mut dcg = 0.0;

    for (rank, item_id) in ranked.iter().take(k).enumerate() {
        if ground_truth.binary_search(item_id).is_ok() {
            hits += 1;
            dcg += discount(rank);
        }
    }

    let idcg: f32 = (0..ground_truth.len().min(k)).map(discount).sum();

    let recall = hits as f32 / ground_truth.len() as f32;
    let precision = hits as f32 / k as f32;
    let ndcg = if idcg > 0.0 { dcg / idcg } else { 0.0 };

    (recall, precision, ndcg)
}

/// Evaluate `model` on held-out `test` interactions.
///
/// For every user with held-out items `G`, all items are scored, the user's
/// `train` items are excluded unless they are also in `G`, and the top `k`
/// remaining items are compared against `G`. Users are processed in chunks
/// of `batch_size` (scored in parallel within a chunk); results are averaged
/// in user order, so they do not depend on `batch_size`.
pub fn evaluate<T: RankingModel + Sync>(
    model: &T,
    test: &CompressedInteractions,
    train: &CompressedInteractions,
    k: usize,
    batch_size: usize,
) -> Result<Metrics, PredictionError> {
    let item_ids: Vec<ItemId> = (0..model.num_items()).collect();
    let users: Vec<_> = test.iter_users().filter(|user| !user.is_empty()).collect();

    let mut totals = (0.0f64, 0.0f64, 0.0f64);

    for chunk in users.chunks(batch_size.max(1)) {
        let chunk_metrics: Vec<(f32, f32, f32)> = chunk
            .par_iter()
            .map(|test_user| -> Result<(f32, f32, f32), PredictionError> {
                let user = model.user_representation(test_user.user_id)?;
                let mut scores = model.predict(&user, &item_ids)?;

                if let Some(train_user) = train.get_user(test_user.user_id) {
                    for &item_id in train_user.item_ids {
                        if test_user.contains(item_id) {
                            continue;
                        }
                        if let Some(score) = scores.get_mut(item_id) {
                            *score = std::f32::NEG_INFINITY;
                        }
                    }
                }

                let ranked = top_k(&scores, k);

                Ok(user_metrics(&ranked, test_user.item_ids, k))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (recall, precision, ndcg) in chunk_metrics {
            totals.0 += f64::from(recall);
            totals.1 += f64::from(precision);
            totals.2 += f64::from(ndcg);
        }
    }

    if users.is_empty() {
        return Ok(Metrics::default());
    }

    let num_users = users.len() as f64;

    Ok(Metrics {
        recall: (totals.0 / num_users) as f32,
        precision: (totals.1 / num_users) as f32,
        ndcg: (totals.2 / num_users) as f32,
        num_users: users.len(),
    })
}
