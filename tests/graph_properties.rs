//! Property-based tests for the normalized adjacency and propagation.

extern crate approx;
extern crate lightgcn;
extern crate ndarray;
extern crate proptest;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use proptest::prelude::*;

use lightgcn::graph::NormalizedAdjacency;
use lightgcn::models::propagation::mean_propagate;

/// A shape and a list of in-range `(user, item)` pairs, possibly repeated.
fn arb_graph() -> impl Strategy<Value = (usize, usize, Vec<(usize, usize)>)> {
    (1usize..12, 1usize..12).prop_flat_map(|(num_users, num_items)| {
        (
            Just(num_users),
            Just(num_items),
            prop::collection::vec((0..num_users, 0..num_items), 0..40),
        )
    })
}

fn build(num_users: usize, num_items: usize, edges: &[(usize, usize)]) -> NormalizedAdjacency {
    NormalizedAdjacency::build(edges.iter().cloned(), num_users, num_items).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn adjacency_is_symmetric((num_users, num_items, edges) in arb_graph()) {
        let adjacency = build(num_users, num_items, &edges);

        for a in 0..adjacency.num_nodes() {
            for b in 0..adjacency.num_nodes() {
                prop_assert_eq!(adjacency.get(a, b), adjacency.get(b, a));
            }
        }
    }

    #[test]
    fn degrees_sum_to_twice_the_edges((num_users, num_items, edges) in arb_graph()) {
        let adjacency = build(num_users, num_items, &edges);

        let total: usize = (0..adjacency.num_nodes()).map(|node| adjacency.degree(node)).sum();
        prop_assert_eq!(total, 2 * adjacency.num_edges());
        prop_assert_eq!(adjacency.nnz(), 2 * adjacency.num_edges());

        let mut distinct = edges.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(adjacency.num_edges(), distinct.len());
    }

    #[test]
    fn row_sums_match_distinct_edge_counts((num_users, num_items, edges) in arb_graph()) {
        let adjacency = build(num_users, num_items, &edges);

        let mut distinct = edges.clone();
        distinct.sort();
        distinct.dedup();

        let expected_degree = |node: usize| {
            distinct
                .iter()
                .filter(|&&(user_id, item_id)| user_id == node || num_users + item_id == node)
                .count()
        };

        for node in 0..adjacency.num_nodes() {
            let degree = expected_degree(node);
            prop_assert_eq!(adjacency.degree(node), degree);

            let (cols, values) = adjacency.row(node);
            prop_assert_eq!(cols.len(), degree);

            // Every stored weight is 1/sqrt(d_row * d_col), so the row sum follows
            // from the independently counted degrees.
            let expected_sum: f32 = cols
                .iter()
                .map(|&col| 1.0 / ((degree * expected_degree(col)) as f32).sqrt())
                .sum();
            let sum: f32 = values.iter().sum();
            assert_abs_diff_eq!(sum, expected_sum, epsilon = 1e-4);

            for &col in cols {
                prop_assert!((node < num_users) != (col < num_users));
            }
        }
    }

    #[test]
    fn entries_follow_degree_normalization((num_users, num_items, edges) in arb_graph()) {
        let adjacency = build(num_users, num_items, &edges);

        for &(user_id, item_id) in &edges {
            let item_node = num_users + item_id;
            let expected = 1.0
                / ((adjacency.degree(user_id) as f32) * (adjacency.degree(item_node) as f32)).sqrt();

            assert_abs_diff_eq!(adjacency.get(user_id, item_node), expected, epsilon = 1e-5);
        }

        // No user-user or item-item entries.
        for a in 0..num_users {
            for b in 0..num_users {
                prop_assert_eq!(adjacency.get(a, b), 0.0);
            }
        }
    }

    #[test]
    fn isolated_nodes_propagate_to_their_own_scaled_embedding(
        (num_users, num_items, edges) in arb_graph(),
        num_layers in 0usize..4,
    ) {
        let adjacency = build(num_users, num_items, &edges);
        let num_nodes = adjacency.num_nodes();
        let nodes = Array2::from_shape_fn((num_nodes, 3), |(row, col)| (row * 3 + col) as f32 + 1.0);

        let output = mean_propagate(&adjacency, nodes.view(), num_layers);

        prop_assert!(output.iter().all(|value| value.is_finite()));

        for node in (0..num_nodes).filter(|&node| adjacency.degree(node) == 0) {
            let (cols, _) = adjacency.row(node);
            prop_assert!(cols.is_empty());

            let scale = 1.0 / (num_layers + 1) as f32;
            for col in 0..3 {
                assert_abs_diff_eq!(output[[node, col]], nodes[[node, col]] * scale, epsilon = 1e-5);
            }
        }
    }
}
