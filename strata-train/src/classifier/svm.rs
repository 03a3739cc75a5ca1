//! Linear support vector machine trained with Pegasos.
//!
//! Pegasos runs stochastic sub-gradient descent on the primal hinge-loss
//! objective with step size `1 / (λ t)` and projects the weights onto the
//! ball of radius `1 / √λ` after every step. The bias is learned as the
//! weight of a constant feature.

use crate::classifier::{Classifier, LabeledFeatures};
use crate::error::{CdbnError, Result};
use crate::persist;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

pub const SVM_FORMAT: &str = "strata-linear-svm";
pub const SVM_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmOptions {
    /// Regularization strength `λ`.
    pub lambda: f32,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmOptions {
    fn default() -> Self {
        Self {
            lambda: 0.01,
            epochs: 50,
            seed: 42,
        }
    }
}

impl SvmOptions {
    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lambda.is_finite() && self.lambda > 0.0) {
            return Err(CdbnError::config(format!(
                "SVM lambda must be a positive number, got {}",
                self.lambda
            )));
        }
        if self.epochs == 0 {
            return Err(CdbnError::config("SVM epochs must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SvmFile {
    format: String,
    version: u32,
    options: SvmOptions,
    weights: Vec<f32>,
    bias: f32,
    positive_label: i32,
    negative_label: i32,
}

/// Trained decision function `w · x + b`.
#[derive(Debug, Clone, PartialEq)]
struct Model {
    weights: Vec<f32>,
    bias: f32,
    positive_label: i32,
    negative_label: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearSvm {
    options: SvmOptions,
    model: Option<Model>,
}

impl LinearSvm {
    pub fn new(options: SvmOptions) -> Self {
        Self { options, model: None }
    }

    pub fn options(&self) -> &SvmOptions {
        &self.options
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn trained_model(&self) -> Result<&Model> {
        self.model
            .as_ref()
            .ok_or_else(|| CdbnError::state("the classifier has not been trained"))
    }

    /// Signed distance-like score; positive means the positive label.
    pub fn decision_value(&self, features: &[f32]) -> Result<f32> {
        let model = self.trained_model()?;
        if features.len() != model.weights.len() {
            return Err(CdbnError::config(format!(
                "feature vector has length {}, classifier expects {}",
                features.len(),
                model.weights.len()
            )));
        }
        Ok(dot(&model.weights, features) + model.bias)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file: SvmFile = persist::read_json(path)?;
        let malformed = |message: String| CdbnError::Format {
            path: path.to_path_buf(),
            message,
        };
        if file.format != SVM_FORMAT || file.version != SVM_VERSION {
            return Err(malformed(format!(
                "expected {SVM_FORMAT} version {SVM_VERSION}, found {} version {}",
                file.format, file.version
            )));
        }
        file.options
            .validate()
            .map_err(|e| malformed(format!("stored options are invalid: {e}")))?;
        Ok(Self {
            options: file.options,
            model: Some(Model {
                weights: file.weights,
                bias: file.bias,
                positive_label: file.positive_label,
                negative_label: file.negative_label,
            }),
        })
    }
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new(SvmOptions::default())
    }
}

/// Negative and positive label of a binary problem given its sorted
/// distinct labels. The larger label is positive.
fn label_pair(distinct: &[i32]) -> Result<(i32, i32)> {
    match distinct {
        [] => Err(CdbnError::config("cannot train a classifier without labels")),
        [only] => Ok((*only, *only)),
        [negative, positive] => Ok((*negative, *positive)),
        _ => Err(CdbnError::config(format!(
            "binary classifier needs at most two distinct labels, found {distinct:?}"
        ))),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Classifier for LinearSvm {
    #[tracing::instrument(skip_all, fields(rows = data.len()))]
    fn train(&mut self, data: &LabeledFeatures) -> Result<()> {
        self.options.validate()?;
        let dimension = data
            .dimension()
            .ok_or_else(|| CdbnError::config("cannot train a classifier on zero feature rows"))?;
        let (negative_label, positive_label) = label_pair(&data.distinct_labels())?;
        if negative_label == positive_label {
            warn!(label = negative_label, "All training rows share one label; the classifier is constant");
        }

        // Augmented weight vector: the last entry multiplies a constant 1.
        let mut w = vec![0.0f32; dimension + 1];
        let lambda = self.options.lambda;
        let radius = 1.0 / lambda.sqrt();
        let mut rng = ChaCha8Rng::seed_from_u64(self.options.seed);
        let mut order: Vec<usize> = (0..data.len()).collect();
        let mut step = 0usize;

        if positive_label != negative_label {
            for _ in 0..self.options.epochs {
                order.shuffle(&mut rng);
                for &i in &order {
                    step += 1;
                    let x = &data.features()[i];
                    let y = if data.labels()[i] == positive_label { 1.0 } else { -1.0 };
                    let eta = 1.0 / (lambda * step as f32);
                    let margin = y * (dot(&w[..dimension], x) + w[dimension]);

                    let shrink = 1.0 - eta * lambda;
                    for wi in w.iter_mut() {
                        *wi *= shrink;
                    }
                    if margin < 1.0 {
                        for (wi, xi) in w.iter_mut().zip(x) {
                            *wi += eta * y * xi;
                        }
                        w[dimension] += eta * y;
                    }

                    let norm = w.iter().map(|v| v * v).sum::<f32>().sqrt();
                    if norm > radius {
                        let scale = radius / norm;
                        for wi in w.iter_mut() {
                            *wi *= scale;
                        }
                    }
                }
            }
        }

        let bias = w.pop().unwrap_or(0.0);
        self.model = Some(Model {
            weights: w,
            bias,
            positive_label,
            negative_label,
        });

        let accuracy = data
            .iter()
            .filter(|(x, label)| self.predict(x).is_ok_and(|p| p == *label))
            .count() as f32
            / data.len() as f32;
        info!(steps = step, dimension, training_accuracy = accuracy, "Classifier trained");
        Ok(())
    }

    fn check_labels(&self, labels: &[i32]) -> Result<()> {
        let distinct: Vec<i32> = labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        label_pair(&distinct).map(|_| ())
    }

    fn predict(&self, features: &[f32]) -> Result<i32> {
        let score = self.decision_value(features)?;
        let model = self.trained_model()?;
        Ok(if score >= 0.0 {
            model.positive_label
        } else {
            model.negative_label
        })
    }

    fn write(&self, path: &Path) -> Result<()> {
        let model = self.trained_model()?;
        let file = SvmFile {
            format: SVM_FORMAT.to_string(),
            version: SVM_VERSION,
            options: self.options,
            weights: model.weights.clone(),
            bias: model.bias,
            positive_label: model.positive_label,
            negative_label: model.negative_label,
        };
        persist::write_json(path, &file)?;
        info!(path = %path.display(), "Classifier written");
        Ok(())
    }
}
