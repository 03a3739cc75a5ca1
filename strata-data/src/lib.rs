//! Strata Data Crate
//!
//! Data loading utilities for point-cloud segments: PCD parsing, voxelization
//! into cubic grids, and discovery of training files on disk.
//! This crate knows nothing about the network; it only produces labeled grids.

pub mod dataset;
pub mod error;
pub mod pcd;
pub mod types;
pub mod voxelize;

pub use dataset::{find_training_files, label_from_stem, load_segment, load_segments};
pub use error::{DataError, ErrorKind};
pub use pcd::{PcdCloud, PcdHeader, load_pcd};
pub use types::VoxelGrid;
pub use voxelize::{VoxelFill, Voxelizer, VoxelizerConfig};
