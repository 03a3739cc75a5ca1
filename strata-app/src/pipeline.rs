//! The training pipeline: validate arguments, load segments, train the
//! network, extract features, train the classifier.

use crate::cli::Args;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use strata_data::{VoxelGrid, VoxelizerConfig, find_training_files, load_segments};
use strata_train::persist::ensure_output_available;
use strata_train::{Cdbn, CdbnConfig, Classifier, FeatureExtractor, LinearSvm};
use tracing::info;

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub segments: usize,
    pub feature_len: usize,
}

/// Validated inputs of a run.
#[derive(Debug, Clone)]
struct Plan {
    files: Vec<PathBuf>,
    config: CdbnConfig,
}

fn positive(value: i64, message: &str) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| AppError::config(format!("{message} (got {value})")))
}

/// Canonical parent directory joined with the file name. Parents must exist.
fn output_identity(path: &Path) -> Option<PathBuf> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    Some(parent.canonicalize().ok()?.join(path.file_name()?))
}

fn same_output(a: &Path, b: &Path) -> bool {
    match (output_identity(a), output_identity(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Check the arguments in order, failing on the first problem.
///
/// Output parents are created here; no output file is written.
fn validate(args: &Args) -> Result<Plan> {
    let dir = &args.training_dir;
    if !dir.exists() {
        return Err(AppError::Input {
            path: dir.clone(),
            message: "Directory containing training files does not exist".to_string(),
        });
    }
    if !dir.is_dir() {
        return Err(AppError::Input {
            path: dir.clone(),
            message: "Expecting a directory (not a file) containing training files".to_string(),
        });
    }

    let input_size = usize::try_from(args.input_size)
        .ok()
        .filter(|&v| v >= 2)
        .ok_or_else(|| AppError::config(format!("Input size must be at least 2 (got {})", args.input_size)))?;

    ensure_output_available(&args.cdbn_model)?;

    let filter_size = positive(args.filter_size, "Filter size N_V must be greater than zero")?;
    let hidden_size = positive(args.hidden_size, "Hidden layer size N_H must be greater than zero")?;
    let pooling_size = positive(args.pooling_size, "Pooling size C must be greater than zero")?;
    let group_size = positive(args.group_size, "Group size K must be greater than zero")?;

    ensure_output_available(&args.svm_model)?;
    if same_output(&args.cdbn_model, &args.svm_model) {
        return Err(AppError::config(format!(
            "Network and classifier outputs must differ: {}",
            args.svm_model.display()
        )));
    }

    let files = find_training_files(dir)?;
    let config = CdbnConfig::new(input_size, group_size, filter_size, hidden_size, pooling_size);
    config.validate()?;
    Ok(Plan { files, config })
}

#[tracing::instrument(skip_all, fields(dir = %args.training_dir.display()))]
pub fn run(args: &Args) -> Result<Summary> {
    let plan = validate(args)?;
    let options = args.training_options();
    let mut model = Cdbn::new(plan.config)?;
    let mut svm = LinearSvm::new(args.svm_options());
    svm.options().validate()?;

    // Segments are dropped once every feature row exists.
    let rows = {
        let voxelizer = VoxelizerConfig::new(plan.config.input_size).with_fill(args.fill.into());
        let segments = load_segments(&plan.files, voxelizer)?;
        let labels: Vec<i32> = segments.iter().map(VoxelGrid::label).collect();
        svm.check_labels(&labels)?;

        model.train(&segments, &options)?;
        model.write(&args.cdbn_model)?;

        let pool = options.build_pool()?;
        FeatureExtractor::new(&model)?.extract_all(&segments, &pool)?
    };

    svm.train(&rows)?;
    svm.write(&args.svm_model)?;

    let summary = Summary {
        segments: rows.len(),
        feature_len: rows.dimension().unwrap_or(0),
    };
    info!(
        segments = summary.segments,
        feature_len = summary.feature_len,
        "Training finished"
    );
    Ok(summary)
}
