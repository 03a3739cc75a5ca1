//! Probabilistic max-pooling.
//!
//! Each filter's hidden map is tiled by non-overlapping windows of
//! `C × C × (K / C²)` units, so every pooling group holds exactly `K` hidden
//! units. Within a group at most one unit is on; together with the implicit
//! "all off" outcome the group has `K + 1` mutually exclusive states whose
//! probabilities are a softmax over the units' energies and a zero energy.
//! The pooling unit of a group is on exactly when one of its hidden units is.

use crate::error::{CdbnError, Result};
use crate::volume::{Shape3, shape_volume};
use rand::Rng;

/// Window extents `[x, y, z]` for pooling size `C` and group size `K` on a
/// hidden map of the given shape.
///
/// Fails when `K` does not divide the hidden units of one map, when `C²`
/// does not divide `K`, or when the window does not tile the map.
pub fn pooling_window(hidden: Shape3, pooling_size: usize, group_size: usize) -> Result<Shape3> {
    let units = shape_volume(hidden);
    if group_size == 0 || pooling_size == 0 {
        return Err(CdbnError::config("pooling size C and group size K must be greater than zero"));
    }
    if units % group_size != 0 {
        return Err(CdbnError::config(format!(
            "hidden-unit count {units} per map ({hidden:?}) is not divisible by group size K={group_size}"
        )));
    }
    let plane = pooling_size * pooling_size;
    if group_size % plane != 0 {
        return Err(CdbnError::config(format!(
            "group size K={group_size} is not a multiple of C²={plane}; only C×C×(K/C²) pooling windows are supported"
        )));
    }
    let window = [pooling_size, pooling_size, group_size / plane];
    for (axis, (h, w)) in ["x", "y", "z"].iter().zip(hidden.iter().zip(window)) {
        if h % w != 0 {
            return Err(CdbnError::config(format!(
                "pooling window {window:?} does not tile the hidden map {hidden:?} along {axis}; only C×C×(K/C²) pooling windows that tile the map are supported"
            )));
        }
    }
    Ok(window)
}

/// Softmax over `energies` plus an implicit zero-energy "off" state.
///
/// Writes the probability of each unit being the active one into `out` and
/// returns the probability that no unit is active. For a single unit this is
/// the logistic function.
pub fn group_softmax(energies: &[f32], out: &mut [f32]) -> f32 {
    let max = energies.iter().copied().fold(0.0f32, f32::max);
    let off = (-max).exp();
    let mut total = off;
    for (o, e) in out.iter_mut().zip(energies) {
        *o = (e - max).exp();
        total += *o;
    }
    for o in out.iter_mut() {
        *o /= total;
    }
    off / total
}

/// Partition of one hidden map into pooling groups.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolingGroups {
    hidden: Shape3,
    window: Shape3,
    pooled: Shape3,
    /// Hidden-map indices of every group's members, `group_size` per group,
    /// groups in pooled-map order.
    members: Vec<usize>,
}

impl PoolingGroups {
    /// `window` must tile `hidden`; see [`pooling_window`].
    pub fn new(hidden: Shape3, window: Shape3) -> Self {
        let pooled = [hidden[0] / window[0], hidden[1] / window[1], hidden[2] / window[2]];
        let mut members = Vec::with_capacity(shape_volume(hidden));
        for pz in 0..pooled[2] {
            for py in 0..pooled[1] {
                for px in 0..pooled[0] {
                    for dz in 0..window[2] {
                        for dy in 0..window[1] {
                            for dx in 0..window[0] {
                                let x = px * window[0] + dx;
                                let y = py * window[1] + dy;
                                let z = pz * window[2] + dz;
                                members.push((z * hidden[1] + y) * hidden[0] + x);
                            }
                        }
                    }
                }
            }
        }
        Self {
            hidden,
            window,
            pooled,
            members,
        }
    }

    pub fn group_size(&self) -> usize {
        shape_volume(self.window)
    }

    /// Groups per hidden map, equal to pooling units per map.
    pub fn group_count(&self) -> usize {
        shape_volume(self.pooled)
    }

    pub fn pooled_shape(&self) -> Shape3 {
        self.pooled
    }

    pub fn window(&self) -> Shape3 {
        self.window
    }

    pub fn hidden_shape(&self) -> Shape3 {
        self.hidden
    }

    /// Hidden-map indices of group `g`.
    pub fn members(&self, g: usize) -> &[usize] {
        let k = self.group_size();
        &self.members[g * k..(g + 1) * k]
    }

    /// Per-unit "on" probabilities and per-group "off" probabilities for one
    /// map of pre-activations.
    pub fn probabilities(&self, pre: &[f32], unit: &mut [f32], off: &mut [f32]) {
        let k = self.group_size();
        let mut energies = vec![0.0f32; k];
        let mut probs = vec![0.0f32; k];
        for (g, off_g) in off.iter_mut().enumerate().take(self.group_count()) {
            let members = self.members(g);
            for (e, &m) in energies.iter_mut().zip(members) {
                *e = pre[m];
            }
            *off_g = group_softmax(&energies, &mut probs);
            for (&p, &m) in probs.iter().zip(members) {
                unit[m] = p;
            }
        }
    }

    /// Draw one of the `K + 1` outcomes per group; the chosen unit (if any)
    /// is set to 1 in `states`, every other member to 0.
    pub fn sample<R: Rng + ?Sized>(&self, unit: &[f32], rng: &mut R, states: &mut [f32]) {
        for g in 0..self.group_count() {
            let members = self.members(g);
            let u: f32 = rng.r#gen();
            let mut cumulative = 0.0;
            let mut chosen = None;
            for &m in members {
                states[m] = 0.0;
                cumulative += unit[m];
                if chosen.is_none() && u < cumulative {
                    chosen = Some(m);
                }
            }
            if let Some(m) = chosen {
                states[m] = 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_window_for_scenario() {
        assert_eq!(pooling_window([6, 6, 6], 2, 4).unwrap(), [2, 2, 1]);
        assert_eq!(pooling_window([4, 4, 4], 2, 8).unwrap(), [2, 2, 2]);
        assert_eq!(pooling_window([5, 5, 5], 1, 1).unwrap(), [1, 1, 1]);
    }

    #[test]
    fn test_window_errors() {
        assert!(pooling_window([6, 6, 6], 2, 5).is_err());
        assert!(pooling_window([6, 6, 6], 2, 2).is_err());
        assert!(pooling_window([5, 5, 4], 2, 4).is_err());
    }

    #[test]
    fn test_window_limits_are_reported_as_unsupported() {
        // 216 units split evenly into groups of 8, but a 1×1×8 window does not tile 6 along z.
        let err = pooling_window([6, 6, 6], 1, 8).unwrap_err();
        assert!(err.to_string().contains("are supported"));
        let err = pooling_window([6, 6, 6], 2, 6).unwrap_err();
        assert!(err.to_string().contains("are supported"));
    }

    #[test]
    fn test_single_unit_group_is_logistic() {
        let mut out = [0.0];
        let off = group_softmax(&[1.5], &mut out);
        let logistic = 1.0 / (1.0 + (-1.5f32).exp());
        assert!((out[0] - logistic).abs() < 1e-6);
        assert!((off - (1.0 - logistic)).abs() < 1e-6);
    }

    #[test]
    fn test_group_softmax_large_energies_are_stable() {
        let mut out = [0.0; 3];
        let off = group_softmax(&[1000.0, 1000.0, -1000.0], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!(out[2] < 1e-6);
        assert!(off < 1e-6);
    }

    #[test]
    fn test_groups_partition_the_map() {
        let groups = PoolingGroups::new([6, 6, 6], [2, 2, 1]);
        assert_eq!(groups.group_count(), 54);
        assert_eq!(groups.pooled_shape(), [3, 3, 6]);
        let mut seen = vec![0; 216];
        for g in 0..groups.group_count() {
            for &m in groups.members(g) {
                seen[m] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
        // The first group is the 2×2 square at the origin of slice z = 0.
        assert_eq!(groups.members(0), &[0, 1, 6, 7]);
    }

    #[test]
    fn test_sample_activates_at_most_one_unit_per_group() {
        let groups = PoolingGroups::new([4, 4, 4], [2, 2, 2]);
        let pre: Vec<f32> = (0..64).map(|i| (i % 7) as f32 - 2.0).collect();
        let mut unit = vec![0.0; 64];
        let mut off = vec![0.0; groups.group_count()];
        groups.probabilities(&pre, &mut unit, &mut off);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut states = vec![0.5; 64];
        for _ in 0..20 {
            groups.sample(&unit, &mut rng, &mut states);
            for g in 0..groups.group_count() {
                let active: f32 = groups.members(g).iter().map(|&m| states[m]).sum();
                assert!(active == 0.0 || active == 1.0);
            }
        }
    }

    #[test]
    fn test_sample_follows_probabilities() {
        let groups = PoolingGroups::new([2, 1, 1], [2, 1, 1]);
        // Energies 0 and ln 2: outcomes (off, first, second) = (1/4, 1/4, 1/2).
        let mut unit = vec![0.0; 2];
        let mut off = vec![0.0; 1];
        groups.probabilities(&[0.0, 2.0f32.ln()], &mut unit, &mut off);

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut states = vec![0.0; 2];
        let mut counts = [0usize; 3];
        let trials = 20_000;
        for _ in 0..trials {
            groups.sample(&unit, &mut rng, &mut states);
            match (states[0] as u8, states[1] as u8) {
                (0, 0) => counts[0] += 1,
                (1, 0) => counts[1] += 1,
                (0, 1) => counts[2] += 1,
                other => panic!("invalid group state {other:?}"),
            }
        }
        let freq: Vec<f32> = counts.iter().map(|&c| c as f32 / trials as f32).collect();
        assert!((freq[0] - 0.25).abs() < 0.02);
        assert!((freq[1] - 0.25).abs() < 0.02);
        assert!((freq[2] - 0.5).abs() < 0.02);
    }

    proptest! {
        #[test]
        fn prop_group_outcomes_sum_to_one(energies in prop::collection::vec(-60.0f32..60.0, 1..16)) {
            let mut out = vec![0.0; energies.len()];
            let off = group_softmax(&energies, &mut out);
            let total: f32 = out.iter().sum::<f32>() + off;
            prop_assert!((total - 1.0).abs() < 1e-5);
            prop_assert!(out.iter().all(|p| (0.0..=1.0).contains(p)));
        }

        #[test]
        fn prop_map_probabilities_sum_to_one_per_group(seed in any::<u64>()) {
            use rand::Rng;
            let groups = PoolingGroups::new([6, 6, 6], [2, 2, 1]);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let pre: Vec<f32> = (0..216).map(|_| rng.gen_range(-20.0f32..20.0)).collect();
            let mut unit = vec![0.0; 216];
            let mut off = vec![0.0; groups.group_count()];
            groups.probabilities(&pre, &mut unit, &mut off);
            for g in 0..groups.group_count() {
                let total: f32 = groups.members(g).iter().map(|&m| unit[m]).sum::<f32>() + off[g];
                prop_assert!((total - 1.0).abs() < 1e-5);
            }
        }
    }
}
