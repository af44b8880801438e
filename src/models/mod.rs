//! Models module.
pub mod early_stopping;
pub mod embedding;
pub mod lightgcn;
pub mod loss;
pub mod optim;
pub mod propagation;
pub mod sampler;

/// Optimizer used to train the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Optimizer {
    /// Adam.
    Adam,
    /// Adagrad.
    Adagrad,
    /// Plain stochastic gradient descent.
    Sgd,
}
