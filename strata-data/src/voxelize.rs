//! Voxelization of point clouds into cubic grids.
//!
//! Points are scaled uniformly so the largest extent of their bounding box
//! spans the grid, and centered along the shorter axes. Aspect ratio is kept.

use crate::error::{DataError, Result};
use crate::types::VoxelGrid;
use glam::Vec3;
use tracing::{debug, warn};

/// How a voxel's value is derived from the points falling into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoxelFill {
    /// 1.0 if any point falls into the voxel, else 0.0.
    #[default]
    Occupancy,
    /// Point count normalized by the busiest voxel's count.
    Density,
}

/// Configuration for [`Voxelizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelizerConfig {
    pub side: usize,
    pub fill: VoxelFill,
}

impl VoxelizerConfig {
    pub fn new(side: usize) -> Self {
        Self {
            side,
            fill: VoxelFill::default(),
        }
    }

    pub fn with_fill(mut self, fill: VoxelFill) -> Self {
        self.fill = fill;
        self
    }
}

/// Maps point positions into a labeled cubic grid.
#[derive(Debug, Clone)]
pub struct Voxelizer {
    config: VoxelizerConfig,
}

impl Voxelizer {
    pub fn new(config: VoxelizerConfig) -> Result<Self> {
        if config.side < 2 {
            return Err(DataError::InvalidGrid(format!(
                "voxel grid side must be at least 2, got {}",
                config.side
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &VoxelizerConfig {
        &self.config
    }

    /// Grid cell index of every point, as `(x, y, z)`.
    fn cell_indices(&self, positions: &[Vec3]) -> Vec<[usize; 3]> {
        let side = self.config.side;
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in positions {
            min = min.min(*p);
            max = max.max(*p);
        }
        let extent = max - min;
        let largest = extent.max_element();

        if largest <= f32::EPSILON {
            // Every point coincides; place them all in the center cell.
            return vec![[side / 2; 3]; positions.len()];
        }

        // Center the shorter axes inside the unit cube.
        let margin = (Vec3::splat(largest) - extent) * 0.5;
        let scale = side as f32 / largest;
        positions
            .iter()
            .map(|p| {
                let cell = ((*p - min + margin) * scale).floor();
                let clamp = |v: f32| (v.max(0.0) as usize).min(side - 1);
                [clamp(cell.x), clamp(cell.y), clamp(cell.z)]
            })
            .collect()
    }

    /// Voxelize `positions` into a grid carrying `label`.
    pub fn voxelize(&self, positions: &[Vec3], label: i32) -> Result<VoxelGrid> {
        let side = self.config.side;
        if positions.is_empty() {
            warn!("Voxelizing an empty point cloud; grid will be all zeros");
            return VoxelGrid::empty(side, label);
        }

        let mut counts = vec![0u32; side * side * side];
        for [x, y, z] in self.cell_indices(positions) {
            counts[(z * side + y) * side + x] += 1;
        }

        let data: Vec<f32> = match self.config.fill {
            VoxelFill::Occupancy => counts.iter().map(|&c| if c > 0 { 1.0 } else { 0.0 }).collect(),
            VoxelFill::Density => {
                let busiest = counts.iter().copied().max().unwrap_or(1).max(1) as f32;
                counts.iter().map(|&c| c as f32 / busiest).collect()
            }
        };

        let grid = VoxelGrid::new(side, data, label)?;
        debug!(
            "Voxelized {} points into {} occupied of {} voxels",
            positions.len(),
            grid.occupied(),
            grid.len()
        );
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxelizer_rejects_small_side() {
        assert!(Voxelizer::new(VoxelizerConfig::new(1)).is_err());
    }

    #[test]
    fn test_voxelize_empty_cloud() {
        let v = Voxelizer::new(VoxelizerConfig::new(4)).unwrap();
        let grid = v.voxelize(&[], 1).unwrap();
        assert_eq!(grid.occupied(), 0);
        assert_eq!(grid.label(), 1);
    }

    #[test]
    fn test_voxelize_corners() {
        let v = Voxelizer::new(VoxelizerConfig::new(4)).unwrap();
        let points = [Vec3::ZERO, Vec3::ONE];
        let grid = v.voxelize(&points, 0).unwrap();
        assert_eq!(grid.get(0, 0, 0), Some(1.0));
        assert_eq!(grid.get(3, 3, 3), Some(1.0));
        assert_eq!(grid.occupied(), 2);
    }

    #[test]
    fn test_voxelize_single_point_goes_to_center() {
        let v = Voxelizer::new(VoxelizerConfig::new(5)).unwrap();
        let grid = v.voxelize(&[Vec3::new(3.0, -2.0, 8.0)], 0).unwrap();
        assert_eq!(grid.get(2, 2, 2), Some(1.0));
        assert_eq!(grid.occupied(), 1);
    }

    #[test]
    fn test_voxelize_flat_cloud_is_centered() {
        // Points in the z = 0 plane end up in the middle z slice.
        let v = Voxelizer::new(VoxelizerConfig::new(4)).unwrap();
        let points = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)];
        let grid = v.voxelize(&points, 0).unwrap();
        assert_eq!(grid.get(0, 0, 2), Some(1.0));
        assert_eq!(grid.get(3, 3, 2), Some(1.0));
    }

    #[test]
    fn test_voxelize_density() {
        let v = Voxelizer::new(VoxelizerConfig::new(2).with_fill(VoxelFill::Density)).unwrap();
        let points = [Vec3::ZERO, Vec3::ZERO, Vec3::ONE];
        let grid = v.voxelize(&points, 0).unwrap();
        assert_eq!(grid.get(0, 0, 0), Some(1.0));
        assert_eq!(grid.get(1, 1, 1), Some(0.5));
    }
}
