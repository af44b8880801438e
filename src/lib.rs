#![deny(missing_docs)]
//! # lightgcn
//!
//! `lightgcn` implements graph-based collaborative filtering for implicit
//! feedback: user and item embeddings are propagated over the normalized
//! user-item interaction graph, trained with a pairwise (BPR) ranking
//! objective, and evaluated with Recall, Precision and NDCG at K.
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
//! let test = Interactions::from(vec![Interaction::new(0, 3), Interaction::new(1, 2)]);
//!
//! let mut model = Hyperparameters::default()
//!     .embedding_dim(8)
//!     .num_layers(2)
//!     .num_epochs(5)
//!     .batch_size(2)
//!     .eval_k(2)
//!     .build(&train)
//!     .unwrap();
//!
//! let report = model.fit(&test.to_compressed()).unwrap();
//! println!("Best metrics {:?} after {} epochs", report.best, report.epochs);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[cfg(feature = "datasets")]
extern crate csv;
#[macro_use]
extern crate failure;
extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate siphasher;

pub mod data;
#[cfg(feature = "datasets")]
pub mod datasets;
pub mod evaluation;
pub mod graph;
pub mod models;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
    /// The user is outside the model's user range.
    #[fail(display = "Unknown user {}.", user_id)]
    UnknownUser {
        /// The offending user id.
        user_id: UserId,
    },
    /// The item is outside the model's item range.
    #[fail(display = "Unknown item {}.", item_id)]
    UnknownItem {
        /// The offending item id.
        item_id: ItemId,
    },
}

/// Fitting error types.
#[derive(Debug, Fail)]
pub enum FittingError {
    /// An interaction refers to a node outside the declared node range.
    #[fail(display = "Node index {} out of range for {} nodes.", index, num_nodes)]
    Shape {
        /// The offending node index.
        index: usize,
        /// Size of the index range the node had to fall in.
        num_nodes: usize,
    },
    /// A zero-length minibatch reached the objective.
    #[fail(display = "Empty minibatch.")]
    EmptyBatch,
    /// A hyperparameter is outside its valid range.
    #[fail(display = "Invalid hyperparameter {}: {}", name, reason)]
    InvalidHyperparameter {
        /// Name of the hyperparameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// No interactions supplied.
    #[fail(display = "No interactions to fit on.")]
    NoInteractions,
    /// Evaluation during fitting failed.
    #[fail(display = "Evaluation failed: {}", _0)]
    Prediction(#[cause] PredictionError),
}

impl From<PredictionError> for FittingError {
    fn from(err: PredictionError) -> Self {
        FittingError::Prediction(err)
    }
}

/// Trait describing models that can rank items for known users.
pub trait RankingModel {
    /// The representation the model computes for a user.
    type UserRepresentation: std::fmt::Debug;
    /// Number of items the model can score.
    fn num_items(&self) -> usize;
    /// Compute the representation of a user seen during training.
    fn user_representation(
        &self,
        user_id: UserId,
    ) -> Result<Self::UserRepresentation, PredictionError>;
    /// Given a user representation, score `item_ids` according
    /// to how likely the user is to interact with them in the future.
    fn predict(
        &self,
        user: &Self::UserRepresentation,
        item_ids: &[ItemId],
    ) -> Result<Vec<f32>, PredictionError>;
}
