//! Command-line arguments.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use strata_data::VoxelFill;
use strata_train::{SvmOptions, TrainingOptions};

/// Strata - train a convolutional deep belief network on point-cloud segments
/// and a binary classifier on the features it extracts.
#[derive(Parser, Debug, Clone)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(allow_negative_numbers = true)]
pub struct Args {
    /// Directory containing the labeled *.pcd training segments
    pub training_dir: PathBuf,

    /// Side length of the cubic voxel grids
    pub input_size: i64,

    /// Where to write the trained network (must not exist)
    pub cdbn_model: PathBuf,

    /// Filter extent N_V
    #[arg(value_name = "N_V")]
    pub filter_size: i64,

    /// Hidden map side N_H (input size - N_V + 1)
    #[arg(value_name = "N_H")]
    pub hidden_size: i64,

    /// Pooling window size C
    #[arg(value_name = "C")]
    pub pooling_size: i64,

    /// Hidden units per pooling group K
    #[arg(value_name = "K")]
    pub group_size: i64,

    /// Where to write the trained classifier (must not exist)
    pub svm_model: PathBuf,

    /// Filters per layer
    #[arg(long, default_value_t = 8)]
    pub filters: usize,

    /// Number of stacked layers
    #[arg(long, default_value_t = 1)]
    pub layers: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f32,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Gibbs steps per contrastive-divergence update
    #[arg(long, default_value_t = 1)]
    pub cd_steps: usize,

    /// Target mean activation of hidden units
    #[arg(long, default_value_t = 0.05)]
    pub sparsity_target: f32,

    #[arg(long, default_value_t = 0.0)]
    pub sparsity_cost: f32,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Classifier regularization strength
    #[arg(long, default_value_t = 0.01)]
    pub svm_lambda: f32,

    #[arg(long, default_value_t = 50)]
    pub svm_epochs: usize,

    /// How points fill the voxel grid
    #[arg(long, value_enum, default_value_t = FillArg::Occupancy)]
    pub fill: FillArg,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FillArg {
    /// 1 for every voxel containing a point
    Occupancy,
    /// Point counts normalized by the fullest voxel
    Density,
}

impl From<FillArg> for VoxelFill {
    fn from(fill: FillArg) -> Self {
        match fill {
            FillArg::Occupancy => VoxelFill::Occupancy,
            FillArg::Density => VoxelFill::Density,
        }
    }
}

impl Args {
    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions::default()
            .with_filters(self.filters)
            .with_layers(self.layers)
            .with_epochs(self.epochs)
            .with_learning_rate(self.learning_rate)
            .with_batch_size(self.batch_size)
            .with_cd_steps(self.cd_steps)
            .with_sparsity(self.sparsity_target, self.sparsity_cost)
            .with_weight_decay(self.weight_decay)
            .with_seed(self.seed)
            .with_threads(self.threads)
    }

    pub fn svm_options(&self) -> SvmOptions {
        SvmOptions::default()
            .with_lambda(self.svm_lambda)
            .with_epochs(self.svm_epochs)
            .with_seed(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positionals_and_defaults() {
        let args = Args::try_parse_from([
            "strata", "data", "8", "out/cdbn.json", "3", "6", "2", "4", "out/svm.json",
        ])
        .unwrap();
        assert_eq!(args.input_size, 8);
        assert_eq!(args.group_size, 4);
        assert_eq!(args.filters, 8);
        assert_eq!(args.fill, FillArg::Occupancy);
        assert_eq!(args.training_options(), TrainingOptions::default());
    }

    #[test]
    fn test_negative_sizes_reach_validation() {
        let args = Args::try_parse_from([
            "strata", "data", "8", "m", "-3", "6", "2", "4", "s", "--fill", "density",
        ])
        .unwrap();
        assert_eq!(args.filter_size, -3);
        assert_eq!(VoxelFill::from(args.fill), VoxelFill::Density);
    }
}
