//! Bridge from feature vectors to a downstream classifier.

pub mod svm;

pub use svm::{LinearSvm, SvmOptions};

use crate::error::{CdbnError, Result};
use crate::features::FeatureVector;
use std::collections::BTreeSet;
use std::path::Path;

/// A trainable classifier over fixed-length feature vectors.
pub trait Classifier {
    fn train(&mut self, data: &LabeledFeatures) -> Result<()>;

    /// Reject label sets this classifier cannot learn, before any features
    /// are computed.
    fn check_labels(&self, _labels: &[i32]) -> Result<()> {
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<i32>;

    /// Persist the trained classifier; never overwrites an existing file.
    fn write(&self, path: &Path) -> Result<()>;
}

/// Feature rows of equal length, each paired with an integer label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledFeatures {
    features: Vec<FeatureVector>,
    labels: Vec<i32>,
}

impl LabeledFeatures {
    pub fn new(features: Vec<FeatureVector>, labels: Vec<i32>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(CdbnError::config(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(first) = features.first() {
            if let Some((index, row)) = features.iter().enumerate().find(|(_, r)| r.len() != first.len()) {
                return Err(CdbnError::config(format!(
                    "feature row {index} has length {}, expected {}",
                    row.len(),
                    first.len()
                )));
            }
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Row length, or `None` when there are no rows.
    pub fn dimension(&self) -> Option<usize> {
        self.features.first().map(Vec::len)
    }

    /// Distinct labels in ascending order.
    pub fn distinct_labels(&self) -> Vec<i32> {
        self.labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f32], i32)> {
        self.features.iter().map(Vec::as_slice).zip(self.labels.iter().copied())
    }
}
