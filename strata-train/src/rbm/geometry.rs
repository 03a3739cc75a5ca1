//! Shapes of one layer's visible input, filters, hidden maps and pooling.

use crate::error::{CdbnError, Result};
use crate::pooling::{PoolingGroups, pooling_window};
use crate::volume::{Shape3, shape_volume};
use serde::{Deserialize, Serialize};

/// Dimensions of a convolutional RBM layer.
///
/// The hidden map of every filter is the valid convolution of the visible
/// map by a `kernel³` filter: `hidden = visible - kernel + 1` along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGeometry {
    /// Visible channels (1 for voxel grids, previous layer's filters above).
    pub channels: usize,
    pub visible: Shape3,
    /// Filter extent `N_V` along each axis.
    pub kernel: usize,
    pub filters: usize,
    pub hidden: Shape3,
    pub pooling_size: usize,
    pub group_size: usize,
    pub window: Shape3,
}

impl LayerGeometry {
    pub fn new(
        channels: usize,
        visible: Shape3,
        kernel: usize,
        filters: usize,
        pooling_size: usize,
        group_size: usize,
    ) -> Result<Self> {
        if channels == 0 || filters == 0 || kernel == 0 {
            return Err(CdbnError::config(format!(
                "channels ({channels}), filters ({filters}) and filter size ({kernel}) must be greater than zero"
            )));
        }
        if visible.iter().any(|&v| v < kernel) {
            return Err(CdbnError::config(format!(
                "filter size N_V={kernel} exceeds the visible map {visible:?}"
            )));
        }
        let hidden = visible.map(|v| v - kernel + 1);
        let window = pooling_window(hidden, pooling_size, group_size)?;
        Ok(Self {
            channels,
            visible,
            kernel,
            filters,
            hidden,
            pooling_size,
            group_size,
            window,
        })
    }

    /// Weights per filter bank: `filters × channels × kernel³`.
    pub fn weight_len(&self) -> usize {
        self.filters * self.channels * self.kernel.pow(3)
    }

    /// Flat index of weight `(filter, channel, dx, dy, dz)`.
    #[inline]
    pub fn weight_index(&self, filter: usize, channel: usize, dx: usize, dy: usize, dz: usize) -> usize {
        let k = self.kernel;
        (((filter * self.channels + channel) * k + dz) * k + dy) * k + dx
    }

    /// Hidden units in one filter's map.
    pub fn hidden_len(&self) -> usize {
        shape_volume(self.hidden)
    }

    /// Visible units across all channels.
    pub fn visible_len(&self) -> usize {
        self.channels * shape_volume(self.visible)
    }

    pub fn pooled_shape(&self) -> Shape3 {
        [
            self.hidden[0] / self.window[0],
            self.hidden[1] / self.window[1],
            self.hidden[2] / self.window[2],
        ]
    }

    /// Pooling units per filter.
    pub fn pooled_len(&self) -> usize {
        shape_volume(self.pooled_shape())
    }

    /// Length of this layer's flattened pooled output.
    pub fn feature_len(&self) -> usize {
        self.filters * self.pooled_len()
    }

    pub fn pooling_groups(&self) -> PoolingGroups {
        PoolingGroups::new(self.hidden, self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_scenario() {
        let g = LayerGeometry::new(1, [8, 8, 8], 3, 4, 2, 4).unwrap();
        assert_eq!(g.hidden, [6, 6, 6]);
        assert_eq!(g.window, [2, 2, 1]);
        assert_eq!(g.pooled_shape(), [3, 3, 6]);
        assert_eq!(g.weight_len(), 4 * 27);
        assert_eq!(g.feature_len(), 4 * 216 / 4);
    }

    #[test]
    fn test_geometry_non_cubic_visible() {
        let g = LayerGeometry::new(3, [3, 3, 6], 2, 2, 1, 1).unwrap();
        assert_eq!(g.hidden, [2, 2, 5]);
        assert_eq!(g.visible_len(), 3 * 54);
    }

    #[test]
    fn test_geometry_rejects_large_kernel() {
        let err = LayerGeometry::new(1, [3, 3, 6], 4, 2, 1, 1).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_weight_index_is_dense() {
        let g = LayerGeometry::new(2, [4, 4, 4], 2, 3, 1, 1).unwrap();
        let mut seen = vec![false; g.weight_len()];
        for f in 0..3 {
            for c in 0..2 {
                for dz in 0..2 {
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let i = g.weight_index(f, c, dx, dy, dz);
                            assert!(!seen[i]);
                            seen[i] = true;
                        }
                    }
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }
}
