//! Trainable layer-0 user and item embeddings.
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::{ItemId, UserId};

/// Glorot/Xavier uniform initialisation: samples in `±sqrt(6 / (fan_in + fan_out))`.
fn xavier_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let bound = (6.0 / (rows + cols).max(1) as f32).sqrt();
    let uniform = Uniform::new_inclusive(-bound, bound);

    Array2::from_shape_simple_fn((rows, cols), || uniform.sample(rng))
}

/// The user table (`num_users × dim`) and the item table (`num_items × dim`).
///
/// Row `u` of the user table is graph node `u`; row `i` of the item table is
/// graph node `num_users + i`. Shapes never change after construction.
#[derive(Clone, Debug)]
pub struct EmbeddingStore {
    user_embeddings: Array2<f32>,
    item_embeddings: Array2<f32>,
}

impl EmbeddingStore {
    /// Initialise both tables independently.
    pub fn initialize<R: Rng>(num_users: usize, num_items: usize, dim: usize, rng: &mut R) -> Self {
        EmbeddingStore {
            user_embeddings: xavier_uniform(num_users, dim, rng),
            item_embeddings: xavier_uniform(num_items, dim, rng),
        }
    }

    /// Wrap existing tables. Both must have the same number of columns.
    pub fn from_tables(user_embeddings: Array2<f32>, item_embeddings: Array2<f32>) -> Self {
        assert_eq!(
            user_embeddings.ncols(),
            item_embeddings.ncols(),
            "User and item embeddings must share a dimension"
        );

        EmbeddingStore {
            user_embeddings,
            item_embeddings,
        }
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.user_embeddings.nrows()
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.item_embeddings.nrows()
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.user_embeddings.ncols()
    }

    /// The user table.
    pub fn user_embeddings(&self) -> ArrayView2<f32> {
        self.user_embeddings.view()
    }

    /// The item table.
    pub fn item_embeddings(&self) -> ArrayView2<f32> {
        self.item_embeddings.view()
    }

    /// Copies of the user rows for `user_ids`, in order.
    pub fn get_user_rows(&self, user_ids: &[UserId]) -> Array2<f32> {
        self.user_embeddings.select(Axis(0), user_ids)
    }

    /// Copies of the item rows for `item_ids`, in order.
    pub fn get_item_rows(&self, item_ids: &[ItemId]) -> Array2<f32> {
        self.item_embeddings.select(Axis(0), item_ids)
    }

    /// Both tables stacked into one `(num_users + num_items) × dim` node matrix.
    pub fn stacked(&self) -> Array2<f32> {
        let num_users = self.num_users();
        let mut nodes = Array2::zeros((num_users + self.num_items(), self.dim()));

        nodes
            .slice_mut(s![..num_users, ..])
            .assign(&self.user_embeddings);
        nodes
            .slice_mut(s![num_users.., ..])
            .assign(&self.item_embeddings);

        nodes
    }

    /// Mutable access to both tables, for the optimizer.
    pub fn tables_mut(&mut self) -> (&mut Array2<f32>, &mut Array2<f32>) {
        (&mut self.user_embeddings, &mut self.item_embeddings)
    }
}

/// Split a node matrix into its user block and item block.
pub fn split_nodes(nodes: Array2<f32>, num_users: usize) -> (Array2<f32>, Array2<f32>) {
    let users = nodes.slice(s![..num_users, ..]).to_owned();
    let items = nodes.slice(s![num_users.., ..]).to_owned();

    (users, items)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    #[test]
    fn initialisation_respects_glorot_bounds() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let store = EmbeddingStore::initialize(30, 50, 16, &mut rng);

        assert_eq!(store.user_embeddings().dim(), (30, 16));
        assert_eq!(store.item_embeddings().dim(), (50, 16));

        let user_bound = (6.0f32 / (30 + 16) as f32).sqrt();
        let item_bound = (6.0f32 / (50 + 16) as f32).sqrt();

        assert!(store.user_embeddings().iter().all(|x| x.abs() <= user_bound));
        assert!(store.item_embeddings().iter().all(|x| x.abs() <= item_bound));
        assert!(store.user_embeddings().iter().any(|&x| x != 0.0));
    }

    #[test]
    fn rows_map_to_node_indices() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let store = EmbeddingStore::initialize(3, 4, 5, &mut rng);
        let stacked = store.stacked();

        assert_eq!(stacked.dim(), (7, 5));
        assert_eq!(stacked.row(1), store.get_user_rows(&[1]).row(0));
        assert_eq!(stacked.row(3 + 2), store.get_item_rows(&[2]).row(0));

        let (users, items) = split_nodes(stacked, 3);
        assert_eq!(users, store.user_embeddings());
        assert_eq!(items, store.item_embeddings());
    }
}
