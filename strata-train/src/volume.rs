//! Multi-channel 3D tensors used as layer inputs and pooled outputs.

use crate::error::{CdbnError, Result};
use strata_data::VoxelGrid;

/// Spatial extent as `[x, y, z]`.
pub type Shape3 = [usize; 3];

pub(crate) fn shape_volume(shape: Shape3) -> usize {
    shape[0] * shape[1] * shape[2]
}

/// A `channels × z × y × x` tensor stored contiguously, `x` fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    channels: usize,
    shape: Shape3,
    data: Vec<f32>,
}

impl Volume {
    pub fn new(channels: usize, shape: Shape3, data: Vec<f32>) -> Result<Self> {
        let expected = channels * shape_volume(shape);
        if expected == 0 {
            return Err(CdbnError::config(format!(
                "volume with {channels} channels of shape {shape:?} is empty"
            )));
        }
        if data.len() != expected {
            return Err(CdbnError::config(format!(
                "volume with {channels} channels of shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            shape,
            data,
        })
    }

    /// Assemble a volume whose sizes the caller already guarantees.
    pub(crate) fn from_parts(channels: usize, shape: Shape3, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), channels * shape_volume(shape));
        Self {
            channels,
            shape,
            data,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    /// Voxels per channel.
    pub fn spatial_len(&self) -> usize {
        shape_volume(self.shape)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Flat index of `(channel, x, y, z)`.
    #[inline]
    pub fn index(&self, channel: usize, x: usize, y: usize, z: usize) -> usize {
        let [sx, sy, sz] = self.shape;
        ((channel * sz + z) * sy + y) * sx + x
    }

    pub fn get(&self, channel: usize, x: usize, y: usize, z: usize) -> f32 {
        self.data[self.index(channel, x, y, z)]
    }
}

impl From<&VoxelGrid> for Volume {
    fn from(grid: &VoxelGrid) -> Self {
        let side = grid.side();
        Self {
            channels: 1,
            shape: [side; 3],
            data: grid.data().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_from_grid_keeps_layout() {
        let grid = VoxelGrid::from_fn(3, 1, |x, y, z| (x + 3 * y + 9 * z) as f32).unwrap();
        let volume = Volume::from(&grid);
        assert_eq!(volume.channels(), 1);
        assert_eq!(volume.shape(), [3, 3, 3]);
        assert_eq!(volume.get(0, 2, 1, 2), grid.get(2, 1, 2).unwrap());
    }

    #[test]
    fn test_volume_channel_major_index() {
        let volume = Volume::new(2, [2, 3, 4], vec![0.0; 48]).unwrap();
        assert_eq!(volume.index(0, 1, 0, 0), 1);
        assert_eq!(volume.index(0, 0, 1, 0), 2);
        assert_eq!(volume.index(0, 0, 0, 1), 6);
        assert_eq!(volume.index(1, 0, 0, 0), 24);
    }

    #[test]
    fn test_volume_rejects_bad_length() {
        assert!(Volume::new(2, [2, 2, 2], vec![0.0; 8]).is_err());
        assert!(Volume::new(0, [2, 2, 2], vec![]).is_err());
    }
}
