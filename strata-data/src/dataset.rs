//! Discovery and loading of training segments from a directory.

use crate::error::{DataError, Result};
use crate::pcd::load_pcd;
use crate::types::VoxelGrid;
use crate::voxelize::{Voxelizer, VoxelizerConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// List the `*.pcd` files (case-insensitive) directly inside `dir`, sorted.
///
/// Fails when none are found or when a matching entry is a directory.
pub fn find_training_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| DataError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::io(dir, e))?;
        let name = entry.file_name();
        if !name.to_string_lossy().to_lowercase().ends_with(".pcd") {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            return Err(DataError::NotAFile(path));
        }
        files.push(path);
    }

    if files.is_empty() {
        return Err(DataError::NoTrainingFiles(dir.to_path_buf()));
    }
    files.sort();
    info!("Found {} training files in {}", files.len(), dir.display());
    Ok(files)
}

/// Label encoded as the integer after the last `_` of the file stem
/// (`chair_1.pcd` is labeled 1).
pub fn label_from_stem(path: &Path) -> Option<i32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('_')?;
    suffix.parse().ok()
}

/// Load one segment. A `# label` header comment wins over the file name.
pub fn load_segment(path: &Path, voxelizer: &Voxelizer) -> Result<VoxelGrid> {
    let cloud = load_pcd(path)?;
    let label = cloud
        .label()
        .or_else(|| label_from_stem(path))
        .ok_or_else(|| DataError::MissingLabel(path.to_path_buf()))?;
    debug!("Segment {} labeled {}", path.display(), label);
    voxelizer.voxelize(&cloud.positions, label)
}

/// Load every file in `paths` into grids of the configured side.
#[tracing::instrument(skip_all, fields(files = paths.len(), side = config.side))]
pub fn load_segments(paths: &[PathBuf], config: VoxelizerConfig) -> Result<Vec<VoxelGrid>> {
    let voxelizer = Voxelizer::new(config)?;
    let segments = paths
        .iter()
        .map(|p| load_segment(p, &voxelizer))
        .collect::<Result<Vec<_>>>()?;
    info!("Loaded {} segments", segments.len());
    Ok(segments)
}
