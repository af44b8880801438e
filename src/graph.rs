//! The symmetric, degree-normalized user-item adjacency matrix.
//!
//! Users occupy node indices `[0, num_users)` and items occupy
//! `[num_users, num_users + num_items)`. The matrix is stored in compressed
//! sparse row form and multiplied against dense embedding matrices by
//! [`NormalizedAdjacency::spmm`].
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Axis};
use tracing::debug;

use super::{FittingError, ItemId, UserId};

/// Added to every degree before taking the inverse square root, so that
/// isolated nodes never divide by zero.
pub const DEGREE_EPSILON: f32 = 1e-7;

/// `D^-1/2 A D^-1/2` for the bipartite interaction graph `A = R + R^T`.
#[derive(Clone, Debug)]
pub struct NormalizedAdjacency {
    num_users: usize,
    num_items: usize,
    num_edges: usize,
    degrees: Vec<usize>,
    row_pointers: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f32>,
}

impl NormalizedAdjacency {
    /// Build the normalized adjacency from `(user, item)` pairs.
    ///
    /// Repeated pairs contribute a single edge. Fails with
    /// [`FittingError::Shape`] if a user id is not below `num_users` or an
    /// item id is not below `num_items`.
    pub fn build<I>(interactions: I, num_users: usize, num_items: usize) -> Result<Self, FittingError>
    where
        I: IntoIterator<Item = (UserId, ItemId)>,
    {
        let num_nodes = num_users + num_items;

        let mut edges = Vec::new();
        for (user_id, item_id) in interactions {
            if user_id >= num_users {
                return Err(FittingError::Shape {
                    index: user_id,
                    num_nodes: num_users,
                });
            }

            if item_id >= num_items {
                return Err(FittingError::Shape {
                    index: num_users.saturating_add(item_id),
                    num_nodes,
                });
            }

            edges.push((user_id, num_users + item_id));
        }

        edges.sort_unstable();
        edges.dedup();

        let mut degrees = vec![0; num_nodes];
        for &(user_node, item_node) in &edges {
            degrees[user_node] += 1;
            degrees[item_node] += 1;
        }

        let mut row_pointers = vec![0; num_nodes + 1];
        for (node, &degree) in degrees.iter().enumerate() {
            row_pointers[node + 1] = row_pointers[node] + degree;
        }

        // Edges are sorted by (user, item), so filling rows in edge order leaves
        // every row's column indices sorted.
        let mut cursors = row_pointers[..num_nodes].to_vec();
        let mut col_indices = vec![0; row_pointers[num_nodes]];
        for &(user_node, item_node) in &edges {
            col_indices[cursors[user_node]] = item_node;
            cursors[user_node] += 1;
            col_indices[cursors[item_node]] = user_node;
            cursors[item_node] += 1;
        }

        let inverse_sqrt_degrees: Vec<f32> = degrees
            .iter()
            .map(|&degree| (degree as f32 + DEGREE_EPSILON).powf(-0.5))
            .collect();

        let mut values = Vec::with_capacity(col_indices.len());
        for row in 0..num_nodes {
            for &col in &col_indices[row_pointers[row]..row_pointers[row + 1]] {
                values.push(inverse_sqrt_degrees[row] * inverse_sqrt_degrees[col]);
            }
        }

        let adjacency = NormalizedAdjacency {
            num_users,
            num_items,
            num_edges: edges.len(),
            degrees,
            row_pointers,
            col_indices,
            values,
        };

        debug!(
            num_users,
            num_items,
            num_edges = adjacency.num_edges,
            isolated_nodes = adjacency.num_isolated_nodes(),
            "Built normalized adjacency"
        );

        Ok(adjacency)
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of nodes (users plus items).
    pub fn num_nodes(&self) -> usize {
        self.num_users + self.num_items
    }

    /// Number of distinct undirected user-item edges.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Number of stored entries; every edge is stored in both directions.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row sum of the unnormalized matrix, i.e. the node's number of distinct edges.
    pub fn degree(&self, node: usize) -> usize {
        self.degrees[node]
    }

    /// Number of nodes without any edges.
    pub fn num_isolated_nodes(&self) -> usize {
        self.degrees.iter().filter(|&&degree| degree == 0).count()
    }

    /// Column indices and normalized weights of row `node`.
    pub fn row(&self, node: usize) -> (&[usize], &[f32]) {
        let start = self.row_pointers[node];
        let stop = self.row_pointers[node + 1];

        (&self.col_indices[start..stop], &self.values[start..stop])
    }

    /// The normalized weight at `(row, col)`, zero if there is no edge.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let (cols, values) = self.row(row);

        match cols.binary_search(&col) {
            Ok(idx) => values[idx],
            Err(_) => 0.0,
        }
    }

    /// Sparse-dense product `self · dense`.
    ///
    /// Output rows are computed in parallel; each row is accumulated in
    /// column order, so results do not depend on the thread schedule.
    pub fn spmm(&self, dense: ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(
            dense.nrows(),
            self.num_nodes(),
            "Dense operand must have one row per node"
        );

        let mut output = Array2::zeros((self.num_nodes(), dense.ncols()));

        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut output_row)| {
                let (cols, values) = self.row(row);

                for (&col, &value) in cols.iter().zip(values) {
                    output_row.scaled_add(value, &dense.row(col));
                }
            });

        output
    }
}
