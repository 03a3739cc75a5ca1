//! One convolutional RBM layer and its contrastive-divergence training.

use crate::config::TrainingOptions;
use crate::error::{CdbnError, Result};
use crate::pooling::PoolingGroups;
use crate::rbm::{Gradient, LayerGeometry, LayerParams};
use crate::volume::Volume;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info};

// Stream tags keep the derived seeds of unrelated draws apart.
const INIT_STREAM: u64 = 0x494e_4954;
const SHUFFLE_STREAM: u64 = 0x5348_5546;
const EXAMPLE_STREAM: u64 = 0x4558_4d50;

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Derive an independent seed from a base seed and a path of indices.
pub fn derive_seed(seed: u64, parts: &[u64]) -> u64 {
    parts
        .iter()
        .fold(splitmix64(seed), |state, &p| splitmix64(state ^ splitmix64(p)))
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Hidden-unit and pooling-group probabilities for every filter of a layer.
#[derive(Debug, Clone)]
pub struct HiddenProbabilities {
    /// `filters × hidden_len` per-unit "on" probabilities.
    pub unit: Vec<f32>,
    /// `filters × group_count` probabilities that a whole group is off.
    pub off: Vec<f32>,
}

/// Mean reconstruction error of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub reconstruction_error: f32,
}

/// A convolutional RBM with probabilistic max-pooling.
#[derive(Debug, Clone)]
pub struct ConvRbmLayer {
    geometry: LayerGeometry,
    params: LayerParams,
    groups: PoolingGroups,
}

impl ConvRbmLayer {
    /// Wrap existing parameters; their sizes must match `geometry`.
    pub fn from_params(geometry: LayerGeometry, params: LayerParams) -> Result<Self> {
        if !params.fits(&geometry) {
            return Err(CdbnError::config(format!(
                "parameter block ({} weights, {} hidden biases) does not match geometry ({} weights, {} filters)",
                params.weights.len(),
                params.hidden_bias.len(),
                geometry.weight_len(),
                geometry.filters
            )));
        }
        Ok(Self {
            groups: geometry.pooling_groups(),
            geometry,
            params,
        })
    }

    /// Small random filters, zero biases.
    pub fn initialize<R: Rng + ?Sized>(geometry: LayerGeometry, init_scale: f32, rng: &mut R) -> Result<Self> {
        let mut params = LayerParams::zeros(&geometry);
        if init_scale > 0.0 {
            let normal = Normal::new(0.0f32, init_scale)
                .map_err(|e| CdbnError::config(format!("invalid init scale {init_scale}: {e}")))?;
            for w in params.weights.iter_mut() {
                *w = normal.sample(rng);
            }
        }
        Self::from_params(geometry, params)
    }

    pub fn geometry(&self) -> &LayerGeometry {
        &self.geometry
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    fn check_input(&self, v: &Volume) -> Result<()> {
        if v.channels() != self.geometry.channels || v.shape() != self.geometry.visible {
            return Err(CdbnError::config(format!(
                "visible input has {} channels of shape {:?}, layer expects {} channels of shape {:?}",
                v.channels(),
                v.shape(),
                self.geometry.channels,
                self.geometry.visible
            )));
        }
        Ok(())
    }

    /// Filter responses plus hidden bias at every valid offset, one map per filter.
    pub fn hidden_pre_activation(&self, v: &Volume) -> Vec<f32> {
        let g = &self.geometry;
        let k = g.kernel;
        let [hx, hy, hz] = g.hidden;
        let hidden_len = g.hidden_len();
        let weights = &self.params.weights;
        let data = v.data();

        let mut pre = vec![0.0f32; g.filters * hidden_len];
        for f in 0..g.filters {
            let bias = self.params.hidden_bias[f];
            let map = &mut pre[f * hidden_len..(f + 1) * hidden_len];
            for z in 0..hz {
                for y in 0..hy {
                    for x in 0..hx {
                        let mut acc = bias;
                        for c in 0..g.channels {
                            for dz in 0..k {
                                for dy in 0..k {
                                    let w0 = g.weight_index(f, c, 0, dy, dz);
                                    let v0 = v.index(c, x, y + dy, z + dz);
                                    for dx in 0..k {
                                        acc += weights[w0 + dx] * data[v0 + dx];
                                    }
                                }
                            }
                        }
                        map[(z * hy + y) * hx + x] = acc;
                    }
                }
            }
        }
        pre
    }

    pub fn hidden_probabilities(&self, pre: &[f32]) -> HiddenProbabilities {
        let hidden_len = self.geometry.hidden_len();
        let group_count = self.groups.group_count();
        let mut unit = vec![0.0f32; pre.len()];
        let mut off = vec![0.0f32; self.geometry.filters * group_count];
        for ((p, u), o) in pre
            .chunks_exact(hidden_len)
            .zip(unit.chunks_exact_mut(hidden_len))
            .zip(off.chunks_exact_mut(group_count))
        {
            self.groups.probabilities(p, u, o);
        }
        HiddenProbabilities { unit, off }
    }

    /// Binary hidden states drawn group by group from `unit` probabilities.
    pub fn sample_hidden<R: Rng + ?Sized>(&self, unit: &[f32], rng: &mut R) -> Vec<f32> {
        let hidden_len = self.geometry.hidden_len();
        let mut states = vec![0.0f32; unit.len()];
        for (probs, out) in unit.chunks_exact(hidden_len).zip(states.chunks_exact_mut(hidden_len)) {
            self.groups.sample(probs, rng, out);
        }
        states
    }

    /// Visible probabilities given hidden states: transposed convolution with
    /// the shared filters, visible bias, logistic.
    pub fn reconstruct(&self, hidden: &[f32]) -> Volume {
        let g = &self.geometry;
        let k = g.kernel;
        let [hx, hy, hz] = g.hidden;
        let [vx, vy, vz] = g.visible;
        let hidden_len = g.hidden_len();
        let weights = &self.params.weights;

        let mut acc = vec![0.0f32; g.visible_len()];
        for f in 0..g.filters {
            let map = &hidden[f * hidden_len..(f + 1) * hidden_len];
            for z in 0..hz {
                for y in 0..hy {
                    for x in 0..hx {
                        let h = map[(z * hy + y) * hx + x];
                        if h == 0.0 {
                            continue;
                        }
                        for c in 0..g.channels {
                            for dz in 0..k {
                                for dy in 0..k {
                                    let w0 = g.weight_index(f, c, 0, dy, dz);
                                    let v0 = ((c * vz + z + dz) * vy + y + dy) * vx + x;
                                    for dx in 0..k {
                                        acc[v0 + dx] += weights[w0 + dx] * h;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let bias = self.params.visible_bias;
        Volume::from_parts(
            g.channels,
            g.visible,
            acc.into_iter().map(|a| sigmoid(a + bias)).collect(),
        )
    }

    /// Add `sign · Σ_offsets h · v` into the filter gradient.
    fn accumulate_statistics(&self, hidden: &[f32], v: &Volume, grad: &mut Gradient, sign: f32) {
        let g = &self.geometry;
        let k = g.kernel;
        let [hx, hy, hz] = g.hidden;
        let hidden_len = g.hidden_len();
        let data = v.data();

        for f in 0..g.filters {
            let map = &hidden[f * hidden_len..(f + 1) * hidden_len];
            for z in 0..hz {
                for y in 0..hy {
                    for x in 0..hx {
                        let h = map[(z * hy + y) * hx + x];
                        if h == 0.0 {
                            continue;
                        }
                        let h = sign * h;
                        for c in 0..g.channels {
                            for dz in 0..k {
                                for dy in 0..k {
                                    let w0 = g.weight_index(f, c, 0, dy, dz);
                                    let v0 = v.index(c, x, y + dy, z + dz);
                                    for dx in 0..k {
                                        grad.weights[w0 + dx] += h * data[v0 + dx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Gradient estimate of one example by CD-k.
    ///
    /// Statistics use hidden probabilities; only the states driving the
    /// reconstruction are sampled. Filter statistics are averaged over the
    /// hidden map, bias statistics over their units.
    pub fn contrastive_divergence<R: Rng + ?Sized>(
        &self,
        v: &Volume,
        options: &TrainingOptions,
        rng: &mut R,
    ) -> Gradient {
        let g = &self.geometry;
        let mut grad = Gradient::zeros(g);

        let positive = self.hidden_probabilities(&self.hidden_pre_activation(v));
        self.accumulate_statistics(&positive.unit, v, &mut grad, 1.0);

        let mut states = self.sample_hidden(&positive.unit, rng);
        let mut reconstruction = self.reconstruct(&states);
        let mut negative = self.hidden_probabilities(&self.hidden_pre_activation(&reconstruction));
        for _ in 1..options.cd_steps {
            states = self.sample_hidden(&negative.unit, rng);
            reconstruction = self.reconstruct(&states);
            negative = self.hidden_probabilities(&self.hidden_pre_activation(&reconstruction));
        }
        self.accumulate_statistics(&negative.unit, &reconstruction, &mut grad, -1.0);

        let hidden_len = g.hidden_len();
        let norm = hidden_len as f32;
        for w in grad.weights.iter_mut() {
            *w /= norm;
        }
        for f in 0..g.filters {
            let range = f * hidden_len..(f + 1) * hidden_len;
            let pos_mean = positive.unit[range.clone()].iter().sum::<f32>() / norm;
            let neg_mean = negative.unit[range].iter().sum::<f32>() / norm;
            grad.hidden_bias[f] =
                pos_mean - neg_mean + options.sparsity_cost * (options.sparsity_target - pos_mean);
        }

        let visible_len = g.visible_len() as f32;
        let (mut pos_sum, mut neg_sum, mut squared) = (0.0f32, 0.0f32, 0.0f32);
        for (a, b) in v.data().iter().zip(reconstruction.data()) {
            pos_sum += a;
            neg_sum += b;
            squared += (a - b) * (a - b);
        }
        grad.visible_bias = (pos_sum - neg_sum) / visible_len;
        grad.reconstruction_error = squared / visible_len;
        grad.examples = 1;
        grad
    }

    /// Apply the averaged gradient of a batch.
    fn apply(&mut self, grad: &Gradient, options: &TrainingOptions) {
        let rate = options.learning_rate / grad.examples.max(1) as f32;
        let decay = options.learning_rate * options.weight_decay;
        for (w, d) in self.params.weights.iter_mut().zip(&grad.weights) {
            *w += rate * d - decay * *w;
        }
        for (b, d) in self.params.hidden_bias.iter_mut().zip(&grad.hidden_bias) {
            *b += rate * d;
        }
        self.params.visible_bias += rate * grad.visible_bias;
    }

    /// Pooling-unit probabilities for `v`, one channel per filter.
    ///
    /// Deterministic: no sampling is involved.
    pub fn pooled(&self, v: &Volume) -> Result<Volume> {
        self.check_input(v)?;
        Ok(self.pooled_unchecked(v))
    }

    pub(crate) fn pooled_unchecked(&self, v: &Volume) -> Volume {
        let probabilities = self.hidden_probabilities(&self.hidden_pre_activation(v));
        Volume::from_parts(
            self.geometry.filters,
            self.geometry.pooled_shape(),
            probabilities.off.into_iter().map(|off| 1.0 - off).collect(),
        )
    }

    /// Train a fresh layer on `inputs` by mini-batch contrastive divergence.
    ///
    /// Per-example gradients of a batch are computed on `pool` and reduced in
    /// example order before one parameter update, so the result depends only
    /// on `seed`, the inputs and the options.
    #[tracing::instrument(skip_all, fields(filters = geometry.filters, examples = inputs.len()))]
    pub fn train(
        geometry: LayerGeometry,
        inputs: &[Volume],
        options: &TrainingOptions,
        seed: u64,
        pool: &rayon::ThreadPool,
    ) -> Result<(Self, Vec<EpochStats>)> {
        options.validate()?;
        if inputs.is_empty() {
            return Err(CdbnError::config("no visible inputs to train the layer on"));
        }

        let mut init_rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, &[INIT_STREAM]));
        let mut layer = Self::initialize(geometry, options.init_scale, &mut init_rng)?;
        for v in inputs {
            layer.check_input(v)?;
        }

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut history = Vec::with_capacity(options.epochs);
        for epoch in 0..options.epochs {
            let mut shuffle_rng =
                ChaCha8Rng::seed_from_u64(derive_seed(seed, &[SHUFFLE_STREAM, epoch as u64]));
            order.shuffle(&mut shuffle_rng);

            let mut error = 0.0f32;
            for (batch_index, batch) in order.chunks(options.batch_size).enumerate() {
                let contributions: Vec<Gradient> = pool.install(|| {
                    batch
                        .par_iter()
                        .map(|&i| {
                            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(
                                seed,
                                &[EXAMPLE_STREAM, epoch as u64, i as u64],
                            ));
                            layer.contrastive_divergence(&inputs[i], options, &mut rng)
                        })
                        .collect()
                });

                // Reduce in batch order; float sums must not depend on scheduling.
                let mut total = Gradient::zeros(&layer.geometry);
                for contribution in &contributions {
                    total.accumulate(contribution);
                }
                debug!(
                    epoch,
                    batch = batch_index,
                    reconstruction_error = total.reconstruction_error / total.examples as f32,
                    "Applying batch update"
                );
                error += total.reconstruction_error;
                layer.apply(&total, options);
            }

            let stats = EpochStats {
                epoch,
                reconstruction_error: error / inputs.len() as f32,
            };
            info!(
                epoch = stats.epoch,
                reconstruction_error = stats.reconstruction_error,
                "Epoch complete"
            );
            history.push(stats);
        }

        Ok((layer, history))
    }
}
