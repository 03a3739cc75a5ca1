//! Deterministic forward pass of a trained network.

use crate::cdbn::Cdbn;
use crate::classifier::LabeledFeatures;
use crate::error::{CdbnError, Result};
use crate::rbm::ConvRbmLayer;
use crate::volume::Volume;
use rayon::prelude::*;
use strata_data::VoxelGrid;
use tracing::info;

/// Final-layer pooling probabilities, filter-major.
pub type FeatureVector = Vec<f32>;

/// Read-only view of a trained model that maps segments to feature vectors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor<'a> {
    layers: &'a [ConvRbmLayer],
    input_size: usize,
    feature_len: usize,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(model: &'a Cdbn) -> Result<Self> {
        let feature_len = model
            .feature_len()
            .ok_or_else(|| CdbnError::state("cannot extract features before the model is trained"))?;
        Ok(Self {
            layers: model.layers(),
            input_size: model.config().input_size,
            feature_len,
        })
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn extract(&self, segment: &VoxelGrid) -> Result<FeatureVector> {
        if segment.side() != self.input_size {
            return Err(CdbnError::config(format!(
                "segment has side {}, model expects {}",
                segment.side(),
                self.input_size
            )));
        }
        let mut volume = Volume::from(segment);
        for layer in self.layers {
            volume = layer.pooled_unchecked(&volume);
        }
        Ok(volume.into_data())
    }

    /// Feature rows for every segment, each labeled with its segment's label.
    #[tracing::instrument(skip_all, fields(segments = segments.len()))]
    pub fn extract_all(&self, segments: &[VoxelGrid], pool: &rayon::ThreadPool) -> Result<LabeledFeatures> {
        let features = pool.install(|| {
            segments
                .par_iter()
                .map(|segment| self.extract(segment))
                .collect::<Result<Vec<_>>>()
        })?;
        let labels = segments.iter().map(VoxelGrid::label).collect();
        info!(rows = features.len(), dimension = self.feature_len, "Extracted feature vectors");
        LabeledFeatures::new(features, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CdbnConfig, TrainingOptions};

    fn trained() -> (Cdbn, Vec<VoxelGrid>) {
        let segments: Vec<VoxelGrid> = (0..4)
            .map(|i| VoxelGrid::from_fn(5, i as i32 % 2, |x, y, z| ((x * y + z + i) % 3 == 0) as u8 as f32).unwrap())
            .collect();
        let mut model = Cdbn::new(CdbnConfig::new(5, 1, 2, 4, 1)).unwrap();
        model
            .train(&segments, &TrainingOptions::default().with_filters(3).with_epochs(1))
            .unwrap();
        (model, segments)
    }

    #[test]
    fn test_extract_all_keeps_true_labels_and_order() {
        let (model, segments) = trained();
        let extractor = FeatureExtractor::new(&model).unwrap();
        let pool = TrainingOptions::default().with_threads(2).build_pool().unwrap();
        let rows = extractor.extract_all(&segments, &pool).unwrap();
        assert_eq!(rows.labels(), &[0, 1, 0, 1]);
        assert_eq!(rows.dimension(), Some(3 * 64));
        for (row, segment) in rows.features().iter().zip(&segments) {
            assert_eq!(row, &extractor.extract(segment).unwrap());
        }
    }

    #[test]
    fn test_extract_is_deterministic_and_bounded() {
        let (model, segments) = trained();
        let extractor = FeatureExtractor::new(&model).unwrap();
        let a = extractor.extract(&segments[2]).unwrap();
        let b = extractor.extract(&segments[2]).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_extract_rejects_wrong_side() {
        let (model, _) = trained();
        let extractor = FeatureExtractor::new(&model).unwrap();
        let other = VoxelGrid::empty(6, 0).unwrap();
        assert!(matches!(extractor.extract(&other), Err(CdbnError::Config(_))));
    }
}
