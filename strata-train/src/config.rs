//! Model hyperparameters and training options.

use crate::error::{CdbnError, Result};
use crate::pooling::pooling_window;
use serde::{Deserialize, Serialize};

/// Global hyperparameters of a CDBN, persisted with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdbnConfig {
    /// Side length of the input voxel grids.
    pub input_size: usize,
    /// `K`: hidden units per pooling group.
    pub group_size: usize,
    /// `N_V`: filter extent along each axis.
    pub filter_size: usize,
    /// `N_H`: side of layer 0's hidden maps.
    pub hidden_size: usize,
    /// `C`: pooling window size.
    pub pooling_size: usize,
}

impl CdbnConfig {
    pub fn new(
        input_size: usize,
        group_size: usize,
        filter_size: usize,
        hidden_size: usize,
        pooling_size: usize,
    ) -> Self {
        Self {
            input_size,
            group_size,
            filter_size,
            hidden_size,
            pooling_size,
        }
    }

    /// Check the hyperparameters against each other for layer 0.
    pub fn validate(&self) -> Result<()> {
        if self.input_size < 2 {
            return Err(CdbnError::config(format!(
                "input size must be at least 2, got {}",
                self.input_size
            )));
        }
        for (name, value) in [
            ("group size K", self.group_size),
            ("filter size N_V", self.filter_size),
            ("hidden size N_H", self.hidden_size),
            ("pooling size C", self.pooling_size),
        ] {
            if value == 0 {
                return Err(CdbnError::config(format!("{name} must be greater than zero")));
            }
        }
        if self.filter_size > self.input_size {
            return Err(CdbnError::config(format!(
                "filter size N_V={} exceeds the input size {}",
                self.filter_size, self.input_size
            )));
        }
        let expected = self.input_size - self.filter_size + 1;
        if self.hidden_size != expected {
            return Err(CdbnError::config(format!(
                "hidden size N_H={} is not a valid convolution of a {}-voxel input by a {}-voxel filter (expected {expected})",
                self.hidden_size, self.input_size, self.filter_size
            )));
        }
        pooling_window([self.hidden_size; 3], self.pooling_size, self.group_size)?;
        Ok(())
    }
}

/// Options controlling greedy layer-wise training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    /// Filters per layer.
    pub filters: usize,
    /// Number of stacked layers.
    pub layers: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    /// Examples whose gradients are reduced into one update.
    pub batch_size: usize,
    /// Gibbs steps per contrastive-divergence update (the `k` of CD-k).
    pub cd_steps: usize,
    /// Target mean activation of each filter's hidden units.
    pub sparsity_target: f32,
    /// Strength of the sparsity penalty; 0 disables it.
    pub sparsity_cost: f32,
    pub weight_decay: f32,
    /// Standard deviation of the initial filter weights.
    pub init_scale: f32,
    pub seed: u64,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            filters: 8,
            layers: 1,
            epochs: 10,
            learning_rate: 0.05,
            batch_size: 4,
            cd_steps: 1,
            sparsity_target: 0.05,
            sparsity_cost: 0.0,
            weight_decay: 0.0,
            init_scale: 0.01,
            seed: 42,
            threads: 0,
        }
    }
}

impl TrainingOptions {
    pub fn with_filters(mut self, filters: usize) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_cd_steps(mut self, cd_steps: usize) -> Self {
        self.cd_steps = cd_steps;
        self
    }

    pub fn with_sparsity(mut self, target: f32, cost: f32) -> Self {
        self.sparsity_target = target;
        self.sparsity_cost = cost;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("filters", self.filters),
            ("layers", self.layers),
            ("batch size", self.batch_size),
            ("CD steps", self.cd_steps),
        ] {
            if value == 0 {
                return Err(CdbnError::config(format!("{name} must be greater than zero")));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CdbnError::config(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.sparsity_target) {
            return Err(CdbnError::config(format!(
                "sparsity target must lie in [0, 1], got {}",
                self.sparsity_target
            )));
        }
        for (name, value) in [
            ("sparsity cost", self.sparsity_cost),
            ("weight decay", self.weight_decay),
            ("init scale", self.init_scale),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CdbnError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Bounded worker pool used for per-example work.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("strata-worker-{i}"))
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_scenario_is_valid() {
        CdbnConfig::new(8, 4, 3, 6, 2).validate().unwrap();
    }

    #[test]
    fn test_config_rejects_inconsistent_hidden_size() {
        let err = CdbnConfig::new(8, 4, 3, 5, 2).validate().unwrap_err();
        assert!(err.to_string().contains("expected 6"));
    }

    #[test]
    fn test_config_rejects_oversized_filter() {
        assert!(CdbnConfig::new(4, 1, 5, 1, 1).validate().is_err());
    }

    #[test]
    fn test_config_rejects_indivisible_group_size() {
        // 6³ = 216 hidden units per map, not divisible by 5.
        let err = CdbnConfig::new(8, 5, 3, 6, 1).validate().unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_config_rejects_zero() {
        assert!(CdbnConfig::new(8, 0, 3, 6, 2).validate().is_err());
        assert!(CdbnConfig::new(8, 4, 3, 6, 0).validate().is_err());
    }

    #[test]
    fn test_training_options_validate() {
        TrainingOptions::default().validate().unwrap();
        assert!(TrainingOptions::default().with_filters(0).validate().is_err());
        assert!(TrainingOptions::default().with_learning_rate(-1.0).validate().is_err());
        assert!(TrainingOptions::default().with_sparsity(1.5, 0.1).validate().is_err());
        assert!(TrainingOptions::default().with_weight_decay(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_build_pool_with_fixed_threads() {
        let pool = TrainingOptions::default().with_threads(2).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
