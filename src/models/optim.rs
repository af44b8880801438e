//! Dense first-order optimizers over the two embedding tables.
use ndarray::{Array2, Zip};

use super::embedding::EmbeddingStore;
use super::Optimizer;

const ADAM_BETA_1: f32 = 0.9;
const ADAM_BETA_2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;
const ADAGRAD_EPSILON: f32 = 1e-10;

/// Per-parameter accumulators for one table.
#[derive(Clone, Debug)]
struct Moments {
    first: Array2<f32>,
    second: Array2<f32>,
}

impl Moments {
    fn zeros(shape: (usize, usize)) -> Self {
        Moments {
            first: Array2::zeros(shape),
            second: Array2::zeros(shape),
        }
    }
}

/// Optimizer state for an [`EmbeddingStore`].
///
/// Each call to [`OptimizerState::step`] applies exactly one update to both
/// tables; steps must not be interleaved.
#[derive(Clone, Debug)]
pub struct OptimizerState {
    optimizer: Optimizer,
    learning_rate: f32,
    num_steps: i32,
    user_moments: Moments,
    item_moments: Moments,
}

impl OptimizerState {
    /// Fresh state matching the shapes of `embeddings`.
    pub fn new(optimizer: Optimizer, learning_rate: f32, embeddings: &EmbeddingStore) -> Self {
        OptimizerState {
            optimizer,
            learning_rate,
            num_steps: 0,
            user_moments: Moments::zeros(embeddings.user_embeddings().dim()),
            item_moments: Moments::zeros(embeddings.item_embeddings().dim()),
        }
    }

    /// Number of steps taken so far.
    pub fn num_steps(&self) -> usize {
        self.num_steps as usize
    }

    /// Apply one update in place.
    pub fn step(
        &mut self,
        embeddings: &mut EmbeddingStore,
        user_gradient: &Array2<f32>,
        item_gradient: &Array2<f32>,
    ) {
        self.num_steps += 1;

        let (user_table, item_table) = embeddings.tables_mut();

        self.update(user_table, user_gradient, true);
        self.update(item_table, item_gradient, false);
    }

    fn update(&mut self, parameters: &mut Array2<f32>, gradient: &Array2<f32>, users: bool) {
        let learning_rate = self.learning_rate;
        let num_steps = self.num_steps;
        let moments = if users {
            &mut self.user_moments
        } else {
            &mut self.item_moments
        };

        match self.optimizer {
            Optimizer::Adam => {
                let first_correction = 1.0 - ADAM_BETA_1.powi(num_steps);
                let second_correction = 1.0 - ADAM_BETA_2.powi(num_steps);

                Zip::from(parameters)
                    .and(&mut moments.first)
                    .and(&mut moments.second)
                    .and(gradient)
                    .for_each(|param, first, second, &grad| {
                        *first = ADAM_BETA_1 * *first + (1.0 - ADAM_BETA_1) * grad;
                        *second = ADAM_BETA_2 * *second + (1.0 - ADAM_BETA_2) * grad * grad;

                        let first_hat = *first / first_correction;
                        let second_hat = *second / second_correction;

                        *param -= learning_rate * first_hat / (second_hat.sqrt() + ADAM_EPSILON);
                    });
            }
            Optimizer::Adagrad => {
                Zip::from(parameters)
                    .and(&mut moments.second)
                    .and(gradient)
                    .for_each(|param, accumulator, &grad| {
                        *accumulator += grad * grad;
                        *param -= learning_rate * grad / (accumulator.sqrt() + ADAGRAD_EPSILON);
                    });
            }
            Optimizer::Sgd => {
                parameters.scaled_add(-learning_rate, gradient);
            }
        }
    }
}
