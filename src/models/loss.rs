//! Bayesian Personalised Ranking loss with layer-0 L2 regularisation.
use ndarray::Array2;

use super::embedding::{split_nodes, EmbeddingStore};
use super::propagation::{mean_propagate, propagate};
use crate::data::TripletMinibatch;
use crate::graph::NormalizedAdjacency;
use crate::FittingError;

/// `ln(1 + e^x)` without overflow.
pub fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// The logistic function, stable for large `|x|`.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Loss value and gradients for one minibatch.
#[derive(Clone, Debug)]
pub struct BprOutput {
    /// Total objective: ranking loss plus scaled regularisation.
    pub loss: f32,
    /// Mean of `softplus(s_neg - s_pos)`.
    pub ranking_loss: f32,
    /// `½ Σ ‖e0‖² / batch_size` over the batch's layer-0 rows, before scaling.
    pub regularization: f32,
    /// Gradient with respect to the layer-0 user table.
    pub user_gradient: Array2<f32>,
    /// Gradient with respect to the layer-0 item table.
    pub item_gradient: Array2<f32>,
}

/// Evaluate the objective on `batch` and differentiate it with respect to the
/// layer-0 embeddings.
///
/// Scores use propagated embeddings; the L2 term only touches the layer-0
/// rows of the users and items in the batch.
pub fn bpr_loss(
    embeddings: &EmbeddingStore,
    adjacency: &NormalizedAdjacency,
    num_layers: usize,
    reg_lambda: f32,
    batch: &TripletMinibatch,
) -> Result<BprOutput, FittingError> {
    if batch.is_empty() {
        return Err(FittingError::EmptyBatch);
    }

    let num_users = embeddings.num_users();
    let num_items = embeddings.num_items();

    for &user_id in batch.user_ids {
        if user_id >= num_users {
            return Err(FittingError::Shape {
                index: user_id,
                num_nodes: num_users,
            });
        }
    }
    for &item_id in batch.positive_item_ids.iter().chain(batch.negative_item_ids) {
        if item_id >= num_items {
            return Err(FittingError::Shape {
                index: num_users + item_id,
                num_nodes: num_users + num_items,
            });
        }
    }

    let batch_size = batch.len() as f32;
    let propagated = propagate(embeddings, adjacency, num_layers);
    let users = propagated.user_embeddings();
    let items = propagated.item_embeddings();

    let mut node_gradient = Array2::<f32>::zeros((num_users + num_items, embeddings.dim()));
    let mut ranking_loss = 0.0;

    for (&user_id, &positive_id, &negative_id) in izip!(
        batch.user_ids,
        batch.positive_item_ids,
        batch.negative_item_ids
    ) {
        let user = users.row(user_id);
        let positive = items.row(positive_id);
        let negative = items.row(negative_id);

        let score_diff = user.dot(&negative) - user.dot(&positive);
        ranking_loss += softplus(score_diff);

        let weight = sigmoid(score_diff) / batch_size;

        node_gradient
            .row_mut(user_id)
            .scaled_add(weight, &(&negative - &positive));
        node_gradient
            .row_mut(num_users + positive_id)
            .scaled_add(-weight, &user);
        node_gradient
            .row_mut(num_users + negative_id)
            .scaled_add(weight, &user);
    }

    // P is symmetric, so the gradient on layer-0 rows is P applied to the
    // gradient on final rows.
    let mut gradient = mean_propagate(adjacency, node_gradient.view(), num_layers);

    let user_table = embeddings.user_embeddings();
    let item_table = embeddings.item_embeddings();
    let reg_weight = reg_lambda / batch_size;
    let mut regularization = 0.0;

    for (&user_id, &positive_id, &negative_id) in izip!(
        batch.user_ids,
        batch.positive_item_ids,
        batch.negative_item_ids
    ) {
        let user = user_table.row(user_id);
        let positive = item_table.row(positive_id);
        let negative = item_table.row(negative_id);

        regularization += 0.5 * (user.dot(&user) + positive.dot(&positive) + negative.dot(&negative));

        gradient.row_mut(user_id).scaled_add(reg_weight, &user);
        gradient
            .row_mut(num_users + positive_id)
            .scaled_add(reg_weight, &positive);
        gradient
            .row_mut(num_users + negative_id)
            .scaled_add(reg_weight, &negative);
    }

    let ranking_loss = ranking_loss / batch_size;
    let regularization = regularization / batch_size;
    let (user_gradient, item_gradient) = split_nodes(gradient, num_users);

    Ok(BprOutput {
        loss: ranking_loss + reg_lambda * regularization,
        ranking_loss,
        regularization,
        user_gradient,
        item_gradient,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::data::Triplets;

    fn fixture() -> (EmbeddingStore, NormalizedAdjacency, Triplets) {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let store = EmbeddingStore::initialize(3, 4, 4, &mut rng);
        let adjacency =
            NormalizedAdjacency::build(vec![(0, 1), (0, 2), (1, 0), (2, 3)], 3, 4).unwrap();

        let mut triplets = Triplets::with_capacity(3);
        triplets.push(0, 1, 3);
        triplets.push(1, 0, 2);
        triplets.push(0, 2, 0);

        (store, adjacency, triplets)
    }

    fn loss_at(store: &EmbeddingStore, adjacency: &NormalizedAdjacency, triplets: &Triplets) -> f32 {
        let batch = triplets.iter_minibatch(triplets.len()).next().unwrap();
        bpr_loss(store, adjacency, 2, 0.1, &batch).unwrap().loss
    }

    #[test]
    fn softplus_and_sigmoid_are_stable() {
        assert_abs_diff_eq!(softplus(0.0), 2.0f32.ln(), epsilon = 1e-6);
        assert_abs_diff_eq!(softplus(100.0), 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(softplus(-100.0), 0.0, epsilon = 1e-6);
        assert!(softplus(1e30).is_finite());

        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(sigmoid(-100.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sigmoid(100.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_batch_fails_fast() {
        let (store, adjacency, _) = fixture();
        let empty = Triplets::default();
        let batch = TripletMinibatch {
            user_ids: &[],
            positive_item_ids: &[],
            negative_item_ids: &[],
        };

        assert!(empty.iter_minibatch(4).next().is_none());
        match bpr_loss(&store, &adjacency, 2, 0.0, &batch) {
            Err(FittingError::EmptyBatch) => {}
            other => panic!("Expected empty batch error, got {:?}", other),
        }
    }

    #[test]
    fn single_sample_batch_is_valid() {
        let (store, adjacency, _) = fixture();
        let mut triplets = Triplets::default();
        triplets.push(2, 3, 1);
        let batch = triplets.iter_minibatch(1).next().unwrap();

        let output = bpr_loss(&store, &adjacency, 2, 1e-4, &batch).unwrap();

        assert!(output.loss.is_finite());
        assert!(output.loss > 0.0);
        assert_eq!(output.user_gradient.dim(), (3, 4));
        assert_eq!(output.item_gradient.dim(), (4, 4));
    }

    #[test]
    fn regularization_uses_layer_zero_rows() {
        let (store, adjacency, triplets) = fixture();
        let batch = triplets.iter_minibatch(3).next().unwrap();

        let output = bpr_loss(&store, &adjacency, 2, 0.5, &batch).unwrap();

        let users = store.user_embeddings();
        let items = store.item_embeddings();
        let mut expected = 0.0;
        for idx in 0..3 {
            let (user, positive, negative) = triplets.get(idx).unwrap();
            expected += 0.5
                * (users.row(user).dot(&users.row(user))
                    + items.row(positive).dot(&items.row(positive))
                    + items.row(negative).dot(&items.row(negative)));
        }

        assert_abs_diff_eq!(output.regularization, expected / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            output.loss,
            output.ranking_loss + 0.5 * output.regularization,
            epsilon = 1e-6
        );
    }

    #[test]
    fn gradients_match_finite_differences() {
        let (store, adjacency, triplets) = fixture();
        let batch = triplets.iter_minibatch(3).next().unwrap();
        let output = bpr_loss(&store, &adjacency, 2, 0.1, &batch).unwrap();

        let step = 1e-2;

        for &(row, col) in &[(0, 0), (1, 3), (2, 1)] {
            let mut plus = store.clone();
            plus.tables_mut().0[(row, col)] += step;
            let mut minus = store.clone();
            minus.tables_mut().0[(row, col)] -= step;

            let numeric =
                (loss_at(&plus, &adjacency, &triplets) - loss_at(&minus, &adjacency, &triplets))
                    / (2.0 * step);
            assert_abs_diff_eq!(output.user_gradient[(row, col)], numeric, epsilon = 2e-3);
        }

        for &(row, col) in &[(0, 2), (1, 1), (3, 0)] {
            let mut plus = store.clone();
            plus.tables_mut().1[(row, col)] += step;
            let mut minus = store.clone();
            minus.tables_mut().1[(row, col)] -= step;

            let numeric =
                (loss_at(&plus, &adjacency, &triplets) - loss_at(&minus, &adjacency, &triplets))
                    / (2.0 * step);
            assert_abs_diff_eq!(output.item_gradient[(row, col)], numeric, epsilon = 2e-3);
        }
    }
}
