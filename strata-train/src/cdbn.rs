//! Greedy layer-wise training of a convolutional deep belief network.

use crate::config::{CdbnConfig, TrainingOptions};
use crate::error::{CdbnError, Result};
use crate::features::{FeatureExtractor, FeatureVector};
use crate::persist;
use crate::rbm::{ConvRbmLayer, LayerGeometry, derive_seed};
use crate::volume::Volume;
use rayon::prelude::*;
use std::path::Path;
use strata_data::VoxelGrid;
use tracing::info;

/// A stack of convolutional RBM layers.
///
/// Created untrained from a [`CdbnConfig`]; [`Cdbn::train`] builds every
/// layer at once, after which the model is frozen.
#[derive(Debug, Clone)]
pub struct Cdbn {
    config: CdbnConfig,
    layers: Vec<ConvRbmLayer>,
}

impl Cdbn {
    pub fn new(config: CdbnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            layers: Vec::new(),
        })
    }

    pub fn config(&self) -> &CdbnConfig {
        &self.config
    }

    pub fn layers(&self) -> &[ConvRbmLayer] {
        &self.layers
    }

    pub fn is_trained(&self) -> bool {
        !self.layers.is_empty()
    }

    /// Length of the feature vectors, known once the model is trained.
    pub fn feature_len(&self) -> Option<usize> {
        self.layers.last().map(|layer| layer.geometry().feature_len())
    }

    /// Train `options.layers` layers bottom-up on `segments`.
    ///
    /// Layer 0 sees the voxel grids; every later layer sees the pooled
    /// probabilities of the layer below. On error the model stays untrained.
    #[tracing::instrument(skip_all, fields(segments = segments.len(), layers = options.layers))]
    pub fn train(&mut self, segments: &[VoxelGrid], options: &TrainingOptions) -> Result<()> {
        if self.is_trained() {
            return Err(CdbnError::state(
                "model is already trained; create a new model to train again",
            ));
        }
        options.validate()?;
        if segments.is_empty() {
            return Err(CdbnError::config("no training segments supplied"));
        }
        if let Some((index, segment)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| s.side() != self.config.input_size)
        {
            return Err(CdbnError::config(format!(
                "segment {index} has side {}, model expects {}",
                segment.side(),
                self.config.input_size
            )));
        }

        let pool = options.build_pool()?;
        info!(
            threads = pool.current_num_threads(),
            filters = options.filters,
            epochs = options.epochs,
            "Starting greedy layer-wise training"
        );

        let mut inputs: Vec<Volume> = segments.iter().map(Volume::from).collect();
        let mut channels = 1;
        let mut visible = [self.config.input_size; 3];
        let mut layers = Vec::with_capacity(options.layers);
        for index in 0..options.layers {
            let geometry = LayerGeometry::new(
                channels,
                visible,
                self.config.filter_size,
                options.filters,
                self.config.pooling_size,
                self.config.group_size,
            )
            .map_err(|e| match e {
                CdbnError::Config(message) => CdbnError::config(format!("layer {index}: {message}")),
                other => other,
            })?;
            info!(
                layer = index,
                visible = ?geometry.visible,
                hidden = ?geometry.hidden,
                window = ?geometry.window,
                "Training layer"
            );

            let seed = derive_seed(options.seed, &[index as u64]);
            let (layer, history) = ConvRbmLayer::train(geometry, &inputs, options, seed, &pool)?;
            if let Some(last) = history.last() {
                info!(
                    layer = index,
                    reconstruction_error = last.reconstruction_error,
                    "Layer trained"
                );
            }

            if index + 1 < options.layers {
                inputs = pool.install(|| inputs.par_iter().map(|v| layer.pooled_unchecked(v)).collect());
            }
            channels = geometry.filters;
            visible = geometry.pooled_shape();
            layers.push(layer);
        }

        self.layers = layers;
        Ok(())
    }

    /// Persist the trained model.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.is_trained() {
            return Err(CdbnError::state("cannot write a model that has not been trained"));
        }
        let path = path.as_ref();
        persist::write_model(path, &self.config, &self.layers)?;
        info!(path = %path.display(), layers = self.layers.len(), "Model written");
        Ok(())
    }

    /// Load a model written by [`Cdbn::write`].
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let (config, layers) = persist::read_model(path.as_ref())?;
        Ok(Self { config, layers })
    }

    /// Feature vector of one segment from the final layer's pooling
    /// probabilities.
    pub fn svm_features(&self, segment: &VoxelGrid) -> Result<FeatureVector> {
        FeatureExtractor::new(self)?.extract(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(count: usize, side: usize) -> Vec<VoxelGrid> {
        (0..count)
            .map(|i| {
                VoxelGrid::from_fn(side, (i % 2) as i32, |x, y, z| {
                    if (x + y + z + i) % 4 == 0 { 1.0 } else { 0.0 }
                })
                .unwrap()
            })
            .collect()
    }

    fn quick() -> TrainingOptions {
        TrainingOptions::default().with_filters(2).with_epochs(2).with_threads(1)
    }

    #[test]
    fn test_new_validates_config() {
        assert!(Cdbn::new(CdbnConfig::new(8, 4, 3, 5, 2)).is_err());
        let model = Cdbn::new(CdbnConfig::new(8, 4, 3, 6, 2)).unwrap();
        assert!(!model.is_trained());
        assert_eq!(model.feature_len(), None);
    }

    #[test]
    fn test_train_then_features_have_fixed_length() {
        let mut model = Cdbn::new(CdbnConfig::new(6, 4, 3, 4, 2)).unwrap();
        model.train(&segments(4, 6), &quick()).unwrap();
        assert!(model.is_trained());
        // Hidden 4³, window 2×2×1: 16 pooling units per filter.
        assert_eq!(model.feature_len(), Some(2 * 16));
        let features = model.svm_features(&segments(1, 6)[0]).unwrap();
        assert_eq!(features.len(), 32);
    }

    #[test]
    fn test_train_twice_is_a_state_error() {
        let mut model = Cdbn::new(CdbnConfig::new(5, 1, 2, 4, 1)).unwrap();
        let data = segments(2, 5);
        model.train(&data, &quick()).unwrap();
        let err = model.train(&data, &quick()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::State);
    }

    #[test]
    fn test_train_rejects_bad_segments() {
        let mut model = Cdbn::new(CdbnConfig::new(5, 1, 2, 4, 1)).unwrap();
        assert!(matches!(model.train(&[], &quick()), Err(CdbnError::Config(_))));
        let err = model.train(&segments(2, 6), &quick()).unwrap_err();
        assert!(err.to_string().contains("model expects 5"));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_untrained_model_cannot_write_or_extract() {
        let model = Cdbn::new(CdbnConfig::new(5, 1, 2, 4, 1)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = model.write(dir.path().join("model.json")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::State);
        assert!(!dir.path().join("model.json").exists());
        let err = model.svm_features(&segments(1, 5)[0]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::State);
    }

    #[test]
    fn test_deeper_layer_that_does_not_fit_fails_cleanly() {
        // Layer 0 pools 4³ down to 2×2×4; a 3-voxel filter does not fit layer 1.
        let mut model = Cdbn::new(CdbnConfig::new(6, 4, 3, 4, 2)).unwrap();
        let err = model
            .train(&segments(2, 6), &quick().with_layers(2))
            .unwrap_err();
        assert!(err.to_string().contains("layer 1"));
        assert!(!model.is_trained());
    }
}
