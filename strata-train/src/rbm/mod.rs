//! Convolutional restricted Boltzmann machines with probabilistic max-pooling.
//!
//! A layer owns one filter bank shared across every spatial offset of its
//! visible input, trains it by contrastive divergence, and exposes the
//! deterministic pooled output consumed by the next layer.

pub mod geometry;
pub mod layer;
pub mod params;

pub use geometry::LayerGeometry;
pub use layer::{ConvRbmLayer, EpochStats, HiddenProbabilities, derive_seed};
pub use params::{Gradient, LayerParams};
