//! Linear neighbourhood propagation over the normalized adjacency.
//!
//! Layer `l + 1` is `Â · E_l`, with no weight matrices and no nonlinearity,
//! and the final representation is the unweighted mean of layers `0..=L`.
//! The whole operator is therefore the symmetric matrix
//! `P = (I + Â + … + Â^L) / (L + 1)`, which is also what maps gradients on
//! final embeddings back onto layer-0 embeddings.
use ndarray::{Array2, ArrayView1, ArrayView2};

use super::embedding::{split_nodes, EmbeddingStore};
use crate::graph::NormalizedAdjacency;
use crate::{ItemId, PredictionError, RankingModel, UserId};

/// Apply `P` to a node matrix.
///
/// Only the running sum and the current layer are held in memory.
pub fn mean_propagate(
    adjacency: &NormalizedAdjacency,
    nodes: ArrayView2<f32>,
    num_layers: usize,
) -> Array2<f32> {
    let mut layer = nodes.to_owned();
    let mut sum = layer.clone();

    for _ in 0..num_layers {
        layer = adjacency.spmm(layer.view());
        sum += &layer;
    }

    if num_layers > 0 {
        sum /= (num_layers + 1) as f32;
    }

    sum
}

/// Compute final user and item embeddings from the current layer-0 embeddings.
///
/// Nothing is cached: every call reflects the current parameters.
pub fn propagate(
    embeddings: &EmbeddingStore,
    adjacency: &NormalizedAdjacency,
    num_layers: usize,
) -> PropagatedEmbeddings {
    let nodes = mean_propagate(adjacency, embeddings.stacked().view(), num_layers);
    let (user_embeddings, item_embeddings) = split_nodes(nodes, embeddings.num_users());

    PropagatedEmbeddings {
        user_embeddings,
        item_embeddings,
    }
}

/// Final (propagated) user and item embeddings.
#[derive(Clone, Debug)]
pub struct PropagatedEmbeddings {
    user_embeddings: Array2<f32>,
    item_embeddings: Array2<f32>,
}

/// The user representation used by [`PropagatedEmbeddings`].
#[derive(Clone, Debug)]
pub struct PropagatedUser {
    user_embedding: Vec<f32>,
}

impl PropagatedEmbeddings {
    /// Final user embeddings.
    pub fn user_embeddings(&self) -> ArrayView2<f32> {
        self.user_embeddings.view()
    }

    /// Final item embeddings.
    pub fn item_embeddings(&self) -> ArrayView2<f32> {
        self.item_embeddings.view()
    }

    /// Score every item for `user_id`.
    pub fn user_scores(&self, user_id: UserId) -> Result<Vec<f32>, PredictionError> {
        if user_id >= self.user_embeddings.nrows() {
            return Err(PredictionError::UnknownUser { user_id });
        }

        let scores = self.item_embeddings.dot(&self.user_embeddings.row(user_id));

        if scores.iter().all(|x| x.is_finite()) {
            Ok(scores.to_vec())
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }

    /// The `k` highest-scoring items for `user_id`, best first, skipping `exclude`.
    ///
    /// Ties are broken by ascending item id.
    pub fn recommend(
        &self,
        user_id: UserId,
        k: usize,
        exclude: &[ItemId],
    ) -> Result<Vec<ItemId>, PredictionError> {
        let mut scores = self.user_scores(user_id)?;

        for &item_id in exclude {
            if let Some(score) = scores.get_mut(item_id) {
                *score = std::f32::NEG_INFINITY;
            }
        }

        Ok(crate::evaluation::top_k(&scores, k))
    }
}

fn dot(x: ArrayView1<f32>, y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

impl RankingModel for PropagatedEmbeddings {
    type UserRepresentation = PropagatedUser;

    fn num_items(&self) -> usize {
        self.item_embeddings.nrows()
    }

    fn user_representation(
        &self,
        user_id: UserId,
    ) -> Result<Self::UserRepresentation, PredictionError> {
        if user_id >= self.user_embeddings.nrows() {
            return Err(PredictionError::UnknownUser { user_id });
        }

        Ok(PropagatedUser {
            user_embedding: self.user_embeddings.row(user_id).to_vec(),
        })
    }

    fn predict(
        &self,
        user: &Self::UserRepresentation,
        item_ids: &[ItemId],
    ) -> Result<Vec<f32>, PredictionError> {
        item_ids
            .iter()
            .map(|&item_id| {
                if item_id >= self.item_embeddings.nrows() {
                    return Err(PredictionError::UnknownItem { item_id });
                }

                let prediction = dot(self.item_embeddings.row(item_id), &user.user_embedding);

                if prediction.is_finite() {
                    Ok(prediction)
                } else {
                    Err(PredictionError::InvalidPredictionValue)
                }
            })
            .collect()
    }
}
