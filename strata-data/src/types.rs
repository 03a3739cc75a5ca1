//! Core data types for voxelized segments.
//!
//! A segment is a cubic grid of per-voxel occupancy or intensity values
//! together with the integer label of the object it was cut from.

use crate::error::{DataError, Result};

/// A labeled cubic voxel grid.
///
/// Values are stored with `x` varying fastest, then `y`, then `z`:
/// `index = (z * side + y) * side + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    side: usize,
    data: Vec<f32>,
    label: i32,
}

impl VoxelGrid {
    /// Create a grid from raw values, checking the side length and value count.
    pub fn new(side: usize, data: Vec<f32>, label: i32) -> Result<Self> {
        if side < 2 {
            return Err(DataError::InvalidGrid(format!(
                "side length must be at least 2, got {side}"
            )));
        }
        let expected = side * side * side;
        if data.len() != expected {
            return Err(DataError::InvalidGrid(format!(
                "side {side} needs {expected} values, got {}",
                data.len()
            )));
        }
        if let Some(i) = data.iter().position(|v| !v.is_finite()) {
            return Err(DataError::InvalidGrid(format!(
                "value at index {i} is not finite"
            )));
        }
        Ok(Self { side, data, label })
    }

    /// An all-zero grid.
    pub fn empty(side: usize, label: i32) -> Result<Self> {
        Self::new(side, vec![0.0; side * side * side], label)
    }

    /// Build a grid by evaluating `f(x, y, z)` at every voxel.
    pub fn from_fn(side: usize, label: i32, mut f: impl FnMut(usize, usize, usize) -> f32) -> Result<Self> {
        let mut data = Vec::with_capacity(side * side * side);
        for z in 0..side {
            for y in 0..side {
                for x in 0..side {
                    data.push(f(x, y, z));
                }
            }
        }
        Self::new(side, data, label)
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn label(&self) -> i32 {
        self.label
    }

    /// Flat voxel values in `x`-fastest order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Total number of voxels (`side³`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `(x, y, z)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        if x >= self.side || y >= self.side || z >= self.side {
            return None;
        }
        Some(self.data[(z * self.side + y) * self.side + x])
    }

    /// Number of voxels holding a non-zero value.
    pub fn occupied(&self) -> usize {
        self.data.iter().filter(|v| **v != 0.0).count()
    }
}
