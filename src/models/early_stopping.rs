//! Patience-based early stopping on a validation score.
use tracing::info;

/// Tracks the best score seen so far and stops after `patience`
/// consecutive observations that fail to beat it by more than `min_delta`.
///
/// Once stopped, further observations are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best_score: Option<f32>,
    best_epoch: Option<usize>,
    num_observations: usize,
    epochs_since_improvement: usize,
    stopped: bool,
}

impl EarlyStopping {
    /// Create a controller requiring strict improvement.
    pub fn new(patience: usize) -> Self {
        EarlyStopping {
            patience,
            min_delta: 0.0,
            best_score: None,
            best_epoch: None,
            num_observations: 0,
            epochs_since_improvement: 0,
            stopped: false,
        }
    }

    /// Require improvements larger than `min_delta`.
    pub fn min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Record a score. Returns `true` if training should stop.
    pub fn observe(&mut self, score: f32) -> bool {
        if self.stopped {
            return true;
        }

        let epoch = self.num_observations;
        self.num_observations += 1;

        let improved = match self.best_score {
            None => true,
            Some(best) => score > best + self.min_delta,
        };

        if improved {
            self.best_score = Some(score);
            self.best_epoch = Some(epoch);
            self.epochs_since_improvement = 0;
        } else {
            self.epochs_since_improvement += 1;

            if self.epochs_since_improvement >= self.patience {
                info!(
                    epoch,
                    best_epoch = ?self.best_epoch,
                    best_score = ?self.best_score,
                    "Early stopping"
                );
                self.stopped = true;
            }
        }

        self.stopped
    }

    /// Whether training should stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether the most recent observation set a new best.
    pub fn improved_last(&self) -> bool {
        self.num_observations > 0 && self.epochs_since_improvement == 0
    }

    /// The best score observed so far.
    pub fn best_score(&self) -> Option<f32> {
        self.best_score
    }

    /// Zero-based index of the observation that produced the best score.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Consecutive observations without improvement.
    pub fn epochs_since_improvement(&self) -> usize {
        self.epochs_since_improvement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_plateaus() {
        let mut stopping = EarlyStopping::new(2);

        assert!(!stopping.observe(0.1));
        assert!(!stopping.observe(0.1));
        assert!(stopping.observe(0.1));

        assert_eq!(stopping.best_score(), Some(0.1));
        assert_eq!(stopping.best_epoch(), Some(0));
    }

    #[test]
    fn improvement_resets_the_counter() {
        let mut stopping = EarlyStopping::new(2);

        for &score in &[0.1, 0.05, 0.2, 0.1] {
            assert!(!stopping.observe(score));
        }

        assert_eq!(stopping.best_score(), Some(0.2));
        assert_eq!(stopping.best_epoch(), Some(2));
        assert_eq!(stopping.epochs_since_improvement(), 1);
        assert!(stopping.observe(0.2));
    }

    #[test]
    fn min_delta_demands_larger_gains() {
        let mut stopping = EarlyStopping::new(1).min_delta(0.05);

        assert!(!stopping.observe(0.1));
        assert!(stopping.observe(0.14));
        assert_eq!(stopping.best_score(), Some(0.1));
    }

    #[test]
    fn stopped_is_sticky() {
        let mut stopping = EarlyStopping::new(0);

        assert!(!stopping.observe(0.3));
        assert!(stopping.improved_last());
        assert!(stopping.observe(0.2));
        assert!(stopping.observe(0.9));
        assert!(stopping.is_stopped());
        assert_eq!(stopping.best_score(), Some(0.3));
    }
}
