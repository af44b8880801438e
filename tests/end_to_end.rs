extern crate approx;
extern crate lightgcn;

use approx::assert_abs_diff_eq;

use lightgcn::data::{Interaction, Interactions};
use lightgcn::evaluation::top_k;
use lightgcn::models::lightgcn::Hyperparameters;
use lightgcn::models::Optimizer;

fn tiny() -> Interactions {
    let mut data = Interactions::new(3, 4);

    for &(user_id, item_id) in &[(0, 1), (0, 2), (1, 0), (2, 3)] {
        data.push(Interaction::new(user_id, item_id));
    }

    data
}

#[test]
fn tiny_graph_has_expected_weights() {
    let model = Hyperparameters::default()
        .embedding_dim(8)
        .num_layers(2)
        .build(&tiny())
        .unwrap();
    let adjacency = model.adjacency();

    // User 0 has degree 2, item 1 (node 4) has degree 1.
    assert_abs_diff_eq!(adjacency.get(0, 4), 1.0 / 2.0f32.sqrt(), epsilon = 1e-5);
    assert_abs_diff_eq!(adjacency.get(4, 0), 1.0 / 2.0f32.sqrt(), epsilon = 1e-5);
    // User 1 and item 0 (node 3) form an isolated pair.
    assert_abs_diff_eq!(adjacency.get(1, 3), 1.0, epsilon = 1e-5);
    assert_eq!(adjacency.get(0, 1), 0.0);
    assert_eq!(adjacency.num_edges(), 4);
}

#[test]
fn one_epoch_then_evaluate() {
    let mut model = Hyperparameters::default()
        .embedding_dim(8)
        .num_layers(2)
        .batch_size(2)
        .learning_rate(0.01)
        .eval_k(2)
        .build(&tiny())
        .unwrap();

    let before = model.embeddings().clone();
    let loss = model.fit_epoch().unwrap();

    assert!(loss.is_finite());
    assert!(loss > 0.0);
    assert_ne!(model.embeddings().user_embeddings(), before.user_embeddings());
    assert_ne!(model.embeddings().item_embeddings(), before.item_embeddings());

    let mut test = Interactions::new(3, 4);
    test.push(Interaction::new(0, 3));
    test.push(Interaction::new(1, 2));

    let metrics = model.evaluate(&test.to_compressed()).unwrap();

    assert_eq!(metrics.num_users, 2);
    for value in &[metrics.recall, metrics.precision, metrics.ndcg] {
        assert!(*value >= 0.0 && *value <= 1.0, "Metric out of range: {}", value);
    }
}

#[test]
fn recommendations_skip_training_items() {
    let mut model = Hyperparameters::default()
        .embedding_dim(8)
        .num_layers(2)
        .optimizer(Optimizer::Adagrad)
        .learning_rate(0.05)
        .build(&tiny())
        .unwrap();

    for _ in 0..5 {
        model.fit_epoch().unwrap();
    }

    let train = model.train_interactions().get_user(0).unwrap().item_ids.to_vec();
    let recommendations = model.propagate().recommend(0, 4, &train).unwrap();

    assert_eq!(recommendations.len(), 2);
    assert!(recommendations.iter().all(|item_id| !train.contains(item_id)));
}

#[test]
fn perfect_ranking_scores_one() {
    // Scores that rank items 3, 0, 1, 2 when no item is masked.
    let scores = [0.5, 0.1, -1.0, 2.0];

    assert_eq!(top_k(&scores, 2), vec![3, 0]);
    assert_eq!(top_k(&scores, 10), vec![3, 0, 1, 2]);
}

#[test]
fn full_fit_on_tiny_graph() {
    let mut test = Interactions::new(3, 4);
    test.push(Interaction::new(0, 0));
    test.push(Interaction::new(2, 1));

    let mut model = Hyperparameters::default()
        .embedding_dim(8)
        .num_layers(2)
        .num_epochs(5)
        .patience(1)
        .eval_k(2)
        .build(&tiny())
        .unwrap();

    let report = model.fit(&test.to_compressed()).unwrap();

    assert!(report.epochs >= 1 && report.epochs <= 5);
    assert_eq!(report.losses.len(), report.epochs);
    assert_eq!(report.history.len(), report.epochs);
    assert!(report.best.is_some());
    assert!(!report.interrupted);
}
