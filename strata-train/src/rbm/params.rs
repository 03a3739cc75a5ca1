//! Parameter and gradient blocks of a convolutional RBM layer.

use crate::rbm::LayerGeometry;
use serde::{Deserialize, Serialize};

/// Learnable parameters of one layer, stored contiguously.
///
/// `weights` is addressed through [`LayerGeometry::weight_index`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    pub weights: Vec<f32>,
    /// One bias per filter.
    pub hidden_bias: Vec<f32>,
    /// One bias shared by every visible unit of the layer.
    pub visible_bias: f32,
}

impl LayerParams {
    pub fn zeros(geometry: &LayerGeometry) -> Self {
        Self {
            weights: vec![0.0; geometry.weight_len()],
            hidden_bias: vec![0.0; geometry.filters],
            visible_bias: 0.0,
        }
    }

    /// Whether the block sizes match `geometry`.
    pub fn fits(&self, geometry: &LayerGeometry) -> bool {
        self.weights.len() == geometry.weight_len() && self.hidden_bias.len() == geometry.filters
    }
}

/// Gradient statistics, kept apart from the parameters until the update.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub weights: Vec<f32>,
    pub hidden_bias: Vec<f32>,
    pub visible_bias: f32,
    /// Summed mean squared reconstruction error of the contributing examples.
    pub reconstruction_error: f32,
    pub examples: usize,
}

impl Gradient {
    pub fn zeros(geometry: &LayerGeometry) -> Self {
        Self {
            weights: vec![0.0; geometry.weight_len()],
            hidden_bias: vec![0.0; geometry.filters],
            visible_bias: 0.0,
            reconstruction_error: 0.0,
            examples: 0,
        }
    }

    /// Add another gradient into this one.
    pub fn accumulate(&mut self, other: &Gradient) {
        for (a, b) in self.weights.iter_mut().zip(&other.weights) {
            *a += b;
        }
        for (a, b) in self.hidden_bias.iter_mut().zip(&other.hidden_bias) {
            *a += b;
        }
        self.visible_bias += other.visible_bias;
        self.reconstruction_error += other.reconstruction_error;
        self.examples += other.examples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_accumulate() {
        let geometry = LayerGeometry::new(1, [3, 3, 3], 2, 2, 1, 1).unwrap();
        let mut total = Gradient::zeros(&geometry);
        let mut one = Gradient::zeros(&geometry);
        one.weights[3] = 1.5;
        one.hidden_bias[1] = -0.5;
        one.visible_bias = 0.25;
        one.reconstruction_error = 0.1;
        one.examples = 1;

        total.accumulate(&one);
        total.accumulate(&one);
        assert_eq!(total.weights[3], 3.0);
        assert_eq!(total.hidden_bias[1], -1.0);
        assert_eq!(total.visible_bias, 0.5);
        assert_eq!(total.examples, 2);
    }

    #[test]
    fn test_params_fit_geometry() {
        let geometry = LayerGeometry::new(2, [4, 4, 4], 3, 5, 1, 1).unwrap();
        let params = LayerParams::zeros(&geometry);
        assert!(params.fits(&geometry));
        let other = LayerGeometry::new(1, [4, 4, 4], 3, 5, 1, 1).unwrap();
        assert!(!params.fits(&other));
    }
}
