//! LightGCN: collaborative filtering by linear embedding propagation over the
//! user-item graph, trained with BPR.
//!
//! ## Example
//!
//! ```rust
//! # extern crate lightgcn;
//! use lightgcn::data::{Interaction, Interactions};
//! use lightgcn::models::lightgcn::Hyperparameters;
//!
//! let train = Interactions::from(vec![
//!     Interaction::new(0, 1),
//!     Interaction::new(0, 2),
//!     Interaction::new(1, 0),
//!     Interaction::new(2, 3),
//! ]);
//!
//! let mut model = Hyperparameters::default()
//!     .embedding_dim(8)
//!     .num_layers(2)
//!     .build(&train)
//!     .unwrap();
//!
//! let loss = model.fit_epoch().unwrap();
//! let recommendations = model.propagate().recommend(0, 2, &[1, 2]).unwrap();
//!
//! println!("Loss {}, recommendations {:?}", loss, recommendations);
//! ```
use std::sync::atomic::{AtomicBool, Ordering};

use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use tracing::{debug, info, warn};

use super::early_stopping::EarlyStopping;
use super::embedding::EmbeddingStore;
use super::loss::{bpr_loss, BprOutput};
use super::optim::OptimizerState;
use super::propagation::{propagate, PropagatedEmbeddings};
use super::sampler::sample_triplets;
use super::Optimizer;
use crate::data::{CompressedInteractions, Interactions, TripletMinibatch};
use crate::evaluation::{evaluate, Metrics};
use crate::graph::NormalizedAdjacency;
use crate::{FittingError, PredictionError, UserId};

/// Hyperparameters describing the LightGCN model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Hyperparameters {
    embedding_dim: usize,
    num_layers: usize,
    learning_rate: f32,
    batch_size: usize,
    num_epochs: usize,
    patience: usize,
    min_delta: f32,
    eval_k: usize,
    eval_batch_size: usize,
    reg_lambda: f32,
    optimizer: Optimizer,
    seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            embedding_dim: 64,
            num_layers: 3,
            learning_rate: 1e-3,
            batch_size: 2048,
            num_epochs: 1000,
            patience: 10,
            min_delta: 0.0,
            eval_k: 20,
            eval_batch_size: 100,
            reg_lambda: 1e-4,
            optimizer: Optimizer::Adam,
            seed: 42,
        }
    }
}

fn invalid(name: &'static str, reason: &str) -> FittingError {
    FittingError::InvalidHyperparameter {
        name,
        reason: reason.to_owned(),
    }
}

impl Hyperparameters {
    /// Set the embedding dimension.
    pub fn embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    /// Set the number of propagation layers.
    pub fn num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the training minibatch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the maximum number of epochs.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the number of non-improving epochs tolerated before stopping.
    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Set the minimum recall gain that counts as an improvement.
    pub fn min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Set the cutoff used for per-epoch evaluation.
    pub fn eval_k(mut self, eval_k: usize) -> Self {
        self.eval_k = eval_k;
        self
    }

    /// Set the number of users scored per evaluation chunk.
    pub fn eval_batch_size(mut self, eval_batch_size: usize) -> Self {
        self.eval_batch_size = eval_batch_size;
        self
    }

    /// Set the L2 penalty on layer-0 embeddings.
    pub fn reg_lambda(mut self, reg_lambda: f32) -> Self {
        self.reg_lambda = reg_lambda;
        self
    }

    /// Set the optimizer.
    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Draw a random configuration for hyperparameter search.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let log_uniform = |low: f32, high: f32, rng: &mut R| {
            10.0f32.powf(Uniform::new(low, high).sample(rng))
        };

        Hyperparameters {
            embedding_dim: *[16, 32, 64, 128].choose(rng).unwrap_or(&64),
            num_layers: Uniform::new_inclusive(1, 4).sample(rng),
            learning_rate: log_uniform(-4.0, -1.5, rng),
            batch_size: *[256, 512, 1024, 2048, 4096].choose(rng).unwrap_or(&2048),
            reg_lambda: log_uniform(-6.0, -2.0, rng),
            optimizer: *[Optimizer::Adam, Optimizer::Adagrad]
                .choose(rng)
                .unwrap_or(&Optimizer::Adam),
            seed: rng.gen(),
            ..Hyperparameters::default()
        }
    }

    /// Check every value against its valid range.
    pub fn validate(&self) -> Result<(), FittingError> {
        if self.embedding_dim == 0 {
            return Err(invalid("embedding_dim", "must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", "must be positive and finite"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        if self.num_epochs == 0 {
            return Err(invalid("num_epochs", "must be positive"));
        }
        if self.eval_k == 0 {
            return Err(invalid("eval_k", "must be positive"));
        }
        if self.eval_batch_size == 0 {
            return Err(invalid("eval_batch_size", "must be positive"));
        }
        if !(self.reg_lambda.is_finite() && self.reg_lambda >= 0.0) {
            return Err(invalid("reg_lambda", "must be non-negative and finite"));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(invalid("min_delta", "must be non-negative and finite"));
        }

        Ok(())
    }

    /// Validate the configuration and build a model over `interactions`.
    ///
    /// The model keeps its own snapshot of the interaction sets.
    pub fn build(self, interactions: &Interactions) -> Result<ImplicitLightGcnModel, FittingError> {
        self.validate()?;

        if interactions.is_empty() {
            return Err(FittingError::NoInteractions);
        }

        let (num_users, num_items) = interactions.shape();
        let adjacency = NormalizedAdjacency::build(
            interactions
                .data()
                .iter()
                .map(|x| (x.user_id(), x.item_id())),
            num_users,
            num_items,
        )?;

        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let embeddings =
            EmbeddingStore::initialize(num_users, num_items, self.embedding_dim, &mut rng);
        let optimizer = OptimizerState::new(self.optimizer, self.learning_rate, &embeddings);

        info!(
            num_users,
            num_items,
            num_edges = adjacency.num_edges(),
            embedding_dim = self.embedding_dim,
            num_layers = self.num_layers,
            "Built LightGCN model"
        );

        Ok(ImplicitLightGcnModel {
            train: interactions.to_compressed(),
            hyper: self,
            adjacency,
            embeddings,
            optimizer,
            rng,
        })
    }
}

/// Outcome of a multi-epoch training run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FitReport {
    /// Number of completed epochs.
    pub epochs: usize,
    /// Mean minibatch loss of each epoch.
    pub losses: Vec<f32>,
    /// Validation metrics after each epoch.
    pub history: Vec<Metrics>,
    /// Metrics of the epoch with the best recall.
    pub best: Option<Metrics>,
    /// Zero-based index of that epoch.
    pub best_epoch: Option<usize>,
    /// Whether early stopping ended the run.
    pub stopped_early: bool,
    /// Whether the run was interrupted between epochs.
    pub interrupted: bool,
}

/// A LightGCN model bound to its training interactions.
#[derive(Clone, Debug)]
pub struct ImplicitLightGcnModel {
    hyper: Hyperparameters,
    train: CompressedInteractions,
    adjacency: NormalizedAdjacency,
    embeddings: EmbeddingStore,
    optimizer: OptimizerState,
    rng: XorShiftRng,
}

impl ImplicitLightGcnModel {
    /// The model's hyperparameters.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.embeddings.num_users()
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.embeddings.num_items()
    }

    /// The layer-0 embeddings.
    pub fn embeddings(&self) -> &EmbeddingStore {
        &self.embeddings
    }

    /// The normalized interaction graph.
    pub fn adjacency(&self) -> &NormalizedAdjacency {
        &self.adjacency
    }

    /// The training interaction sets.
    pub fn train_interactions(&self) -> &CompressedInteractions {
        &self.train
    }

    /// Final embeddings under the current parameters.
    pub fn propagate(&self) -> PropagatedEmbeddings {
        propagate(&self.embeddings, &self.adjacency, self.hyper.num_layers)
    }

    /// Objective value and gradients for one minibatch.
    pub fn loss(&self, batch: &TripletMinibatch) -> Result<BprOutput, FittingError> {
        bpr_loss(
            &self.embeddings,
            &self.adjacency,
            self.hyper.num_layers,
            self.hyper.reg_lambda,
            batch,
        )
    }

    /// Run one epoch and return the mean minibatch loss.
    ///
    /// Users are shuffled and each contributes at most one sample; the samples
    /// are shuffled again before being cut into minibatches, and every
    /// minibatch is one optimizer step.
    pub fn fit_epoch(&mut self) -> Result<f32, FittingError> {
        let mut users: Vec<UserId> = (0..self.num_users()).collect();
        users.shuffle(&mut self.rng);

        let mut triplets = sample_triplets(&self.train, &users, &mut self.rng);
        triplets.shuffle(&mut self.rng);

        if triplets.is_empty() {
            warn!("No users could be sampled; skipping epoch");
            return Ok(0.0);
        }

        let batch_size = self.hyper.batch_size;
        let num_batches = triplets.num_minibatches(batch_size);
        let mut loss_value = 0.0;

        for batch in triplets.iter_minibatch(batch_size) {
            let output = self.loss(&batch)?;

            self.optimizer.step(
                &mut self.embeddings,
                &output.user_gradient,
                &output.item_gradient,
            );
            loss_value += output.loss;
        }

        debug!(
            num_samples = triplets.len(),
            num_batches,
            steps = self.optimizer.num_steps(),
            "Finished training epoch"
        );

        Ok(loss_value / num_batches as f32)
    }

    /// Recall, precision and NDCG at the configured cutoff on `test`.
    pub fn evaluate(&self, test: &CompressedInteractions) -> Result<Metrics, PredictionError> {
        evaluate(
            &self.propagate(),
            test,
            &self.train,
            self.hyper.eval_k,
            self.hyper.eval_batch_size,
        )
    }

    /// Train until early stopping triggers or the epoch budget runs out.
    pub fn fit(&mut self, validation: &CompressedInteractions) -> Result<FitReport, FittingError> {
        let interrupt = AtomicBool::new(false);

        self.fit_interruptible(validation, &interrupt)
    }

    /// Like [`fit`](Self::fit), but checks `interrupt` before every epoch.
    ///
    /// The returned report always carries the best metrics seen so far.
    pub fn fit_interruptible(
        &mut self,
        validation: &CompressedInteractions,
        interrupt: &AtomicBool,
    ) -> Result<FitReport, FittingError> {
        let mut stopping = EarlyStopping::new(self.hyper.patience).min_delta(self.hyper.min_delta);
        let mut report = FitReport::default();

        for epoch in 0..self.hyper.num_epochs {
            if interrupt.load(Ordering::SeqCst) {
                info!(epoch, "Training interrupted");
                report.interrupted = true;
                break;
            }

            let loss = self.fit_epoch()?;
            let metrics = self.evaluate(validation)?;

            report.epochs += 1;
            report.losses.push(loss);
            report.history.push(metrics);

            let stop = stopping.observe(metrics.recall);

            if stopping.improved_last() {
                report.best = Some(metrics);
                report.best_epoch = Some(epoch);
            }

            info!(
                epoch,
                loss,
                recall = metrics.recall,
                precision = metrics.precision,
                ndcg = metrics.ndcg,
                k = self.hyper.eval_k,
                "Finished epoch"
            );

            if stop {
                report.stopped_early = true;
                break;
            }
        }

        Ok(report)
    }
}
