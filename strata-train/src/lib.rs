//! Strata Training Crate
//!
//! This crate trains convolutional deep belief networks (CDBNs) over voxelized
//! point-cloud segments and turns the trained network into a fixed-length
//! feature extractor for a downstream binary classifier.
//!
//! ## Modules
//!
//! - [`rbm`]: convolutional RBM layers with probabilistic max-pooling
//! - [`pooling`]: pooling-group layout, group probabilities and sampling
//! - [`cdbn`]: greedy layer-wise training and the public model operations
//! - [`features`]: deterministic forward pass producing feature vectors
//! - [`persist`]: on-disk model format
//! - [`classifier`]: the classifier bridge and a linear SVM

pub mod cdbn;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod persist;
pub mod pooling;
pub mod rbm;
pub mod volume;

pub use cdbn::Cdbn;
pub use classifier::{Classifier, LabeledFeatures, LinearSvm, SvmOptions};
pub use config::{CdbnConfig, TrainingOptions};
pub use error::{CdbnError, Result};
pub use features::{FeatureExtractor, FeatureVector};
pub use rbm::{ConvRbmLayer, LayerGeometry};
pub use strata_data::{ErrorKind, VoxelGrid};
pub use volume::Volume;
