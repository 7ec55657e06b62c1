// src/algorithms/coalition.rs

//! Which coalitions to evaluate, and with what regression weight.
//!
//! Coalition sizes are visited from the extremes inwards (size `s` is paired
//! with its complement size `M - s`). A size is enumerated completely while
//! the remaining budget covers all of its subsets; the rest of the budget is
//! spent on random subsets drawn in proportion to the Shapley kernel mass of
//! the sizes that were not enumerated.

use crate::utils::n_choose_k;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Shapley kernel weight of a coalition of `coalition_size` out of
/// `num_features` features:
/// `(M - 1) / (C(M, |S|) * |S| * (M - |S|))`.
///
/// Infinite for the empty and full coalitions, which are handled as fixed
/// endpoints rather than regression rows.
pub fn kernel_weight(coalition_size: usize, num_features: usize) -> f64 {
    if coalition_size == 0 || coalition_size >= num_features {
        return f64::INFINITY;
    }
    let m = num_features as f64;
    let s = coalition_size as f64;
    (m - 1.0) / (n_choose_k(num_features, coalition_size) * s * (m - s))
}

/// Coalitions as 0/1 rows over the varying features, with regression weights.
#[derive(Debug, Clone)]
pub struct CoalitionPlan {
    pub masks: Array2<f64>,
    pub weights: Array1<f64>,
    /// Number of coalition sizes (counting a paired size once) that were
    /// enumerated completely.
    pub full_subset_sizes: usize,
}

impl CoalitionPlan {
    /// Plans at most `budget` coalitions over `num_features >= 2` features.
    pub fn build<R: Rng + ?Sized>(num_features: usize, budget: usize, rng: &mut R) -> Self {
        let m = num_features;
        let mut builder = PlanBuilder::new(m);
        if m < 2 || budget == 0 {
            return builder.finish(0);
        }

        let num_subset_sizes = m / 2;
        let num_paired_sizes = (m - 1) / 2;
        let mut mass: Vec<f64> = (1..=num_subset_sizes)
            .map(|s| {
                let w = (m - 1) as f64 / (s * (m - s)) as f64;
                if s <= num_paired_sizes {
                    2.0 * w
                } else {
                    w
                }
            })
            .collect();
        let total_mass: f64 = mass.iter().sum();
        mass.iter_mut().for_each(|w| *w /= total_mass);

        let mut remaining = mass.clone();
        let mut samples_left = budget;
        let mut full_sizes = 0;

        for s in 1..=num_subset_sizes {
            let paired = s <= num_paired_sizes;
            let subsets = n_choose_k(m, s);
            let needed = if paired { 2.0 * subsets } else { subsets };
            if samples_left as f64 * remaining[s - 1] / needed < 1.0 - 1e-8 {
                break;
            }
            full_sizes += 1;
            samples_left = samples_left.saturating_sub(needed as usize);
            if remaining[s - 1] < 1.0 {
                let rest = 1.0 - remaining[s - 1];
                remaining.iter_mut().for_each(|w| *w /= rest);
            }

            let mut weight = mass[s - 1] / subsets;
            if paired {
                weight /= 2.0;
            }
            for_each_combination(m, s, |members| {
                let mut mask = vec![false; m];
                members.iter().for_each(|&i| mask[i] = true);
                if paired {
                    builder.push(mask.iter().map(|&b| !b).collect(), weight);
                }
                builder.push(mask, weight);
            });
        }

        let n_fixed = builder.len();
        if full_sizes < num_subset_sizes && samples_left > 0 {
            let rest_mass = &mass[full_sizes..];
            if let Ok(sizes) = WeightedIndex::new(rest_mass) {
                let mut order: Vec<usize> = (0..m).collect();
                let mut seen: HashMap<Vec<bool>, usize> = HashMap::new();
                let max_draws = draw_limit(samples_left);

                for _ in 0..max_draws {
                    if samples_left == 0 {
                        break;
                    }
                    let s = sizes.sample(rng) + full_sizes + 1;
                    order.shuffle(rng);
                    let mut mask = vec![false; m];
                    order[..s].iter().for_each(|&i| mask[i] = true);

                    let complement = (s <= num_paired_sizes)
                        .then(|| mask.iter().map(|&b| !b).collect::<Vec<bool>>());
                    if builder.push_sampled(mask, &mut seen) {
                        samples_left -= 1;
                    }
                    if let Some(complement) = complement {
                        if samples_left > 0 && builder.push_sampled(complement, &mut seen) {
                            samples_left -= 1;
                        }
                    }
                }

                let sampled_total: f64 = builder.weights[n_fixed..].iter().sum();
                if sampled_total > 0.0 {
                    let scale = rest_mass.iter().sum::<f64>() / sampled_total;
                    builder.weights[n_fixed..].iter_mut().for_each(|w| *w *= scale);
                }
            }
        }

        builder.finish(full_sizes)
    }

    pub fn len(&self) -> usize {
        self.masks.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.nrows() == 0
    }
}

struct PlanBuilder {
    num_features: usize,
    masks: Vec<Vec<bool>>,
    weights: Vec<f64>,
}

impl PlanBuilder {
    fn new(num_features: usize) -> Self {
        PlanBuilder {
            num_features,
            masks: Vec::new(),
            weights: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.masks.len()
    }

    fn push(&mut self, mask: Vec<bool>, weight: f64) {
        self.masks.push(mask);
        self.weights.push(weight);
    }

    /// Returns `false` when the coalition was already drawn; its count is
    /// bumped instead.
    fn push_sampled(&mut self, mask: Vec<bool>, seen: &mut HashMap<Vec<bool>, usize>) -> bool {
        if let Some(&row) = seen.get(&mask) {
            self.weights[row] += 1.0;
            return false;
        }
        seen.insert(mask.clone(), self.masks.len());
        self.push(mask, 1.0);
        true
    }

    fn finish(self, full_subset_sizes: usize) -> CoalitionPlan {
        let n = self.masks.len();
        let m = self.num_features;
        let masks = Array2::from_shape_fn((n, m), |(i, j)| {
            if self.masks[i][j] {
                1.0
            } else {
                0.0
            }
        });
        CoalitionPlan {
            masks,
            weights: Array1::from_vec(self.weights),
            full_subset_sizes,
        }
    }
}

/// Upper bound on random draws when `samples` new coalitions are wanted;
/// repeats only bump weights, so the loop needs a stopping point.
fn draw_limit(samples: usize) -> usize {
    samples.saturating_mul(4)
}

/// Calls `f` with every `k`-subset of `0..n`, in lexicographic order.
fn for_each_combination<F: FnMut(&[usize])>(n: usize, k: usize, mut f: F) {
    if k > n {
        return;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        f(&idx);
        // rightmost position that can still move
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(0)
    }

    fn sizes(plan: &CoalitionPlan) -> Vec<usize> {
        plan.masks
            .rows()
            .into_iter()
            .map(|r| r.sum() as usize)
            .collect()
    }

    #[test]
    fn combinations_are_complete_and_ordered() {
        let mut seen = Vec::new();
        for_each_combination(4, 2, |c| seen.push(c.to_vec()));
        assert_eq!(
            seen,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        let mut count = 0;
        for_each_combination(5, 0, |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn full_budget_enumerates_every_proper_coalition() {
        for m in 2..=6 {
            let budget = (1 << m) - 2;
            let plan = CoalitionPlan::build(m, budget, &mut rng());
            assert_eq!(plan.len(), budget, "m = {}", m);
            assert_eq!(plan.full_subset_sizes, m / 2);
            assert!(sizes(&plan).iter().all(|&s| s > 0 && s < m));
        }
    }

    #[test]
    fn enumerated_weights_follow_the_shapley_kernel() {
        let m = 5;
        let plan = CoalitionPlan::build(m, 30, &mut rng());
        let s = sizes(&plan);
        for (i, &size) in s.iter().enumerate() {
            for (j, &other) in s.iter().enumerate() {
                let expected = kernel_weight(size, m) / kernel_weight(other, m);
                assert_relative_eq!(
                    plan.weights[i] / plan.weights[j],
                    expected,
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn partial_budget_mixes_enumeration_and_sampling() {
        let m = 10;
        let plan = CoalitionPlan::build(m, 100, &mut rng());
        // sizes 1 and 9 (20 coalitions) fit, size 2/8 (90) does not
        assert_eq!(plan.full_subset_sizes, 1);
        assert!(plan.len() <= 100);
        assert!(plan.len() > 20);
        assert_relative_eq!(plan.weights.sum(), 1.0, max_relative = 1e-9);
        assert!(sizes(&plan)[20..].iter().all(|&s| (2..=8).contains(&s)));
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let a = CoalitionPlan::build(12, 64, &mut rng());
        let b = CoalitionPlan::build(12, 64, &mut rng());
        assert_eq!(a.masks, b.masks);
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn draw_limit_saturates() {
        assert_eq!(draw_limit(10), 40);
        assert_eq!(draw_limit(usize::MAX), usize::MAX);
        assert_eq!(draw_limit(usize::MAX / 2), usize::MAX);
    }

    #[test]
    fn degenerate_inputs_give_an_empty_plan() {
        assert!(CoalitionPlan::build(1, 10, &mut rng()).is_empty());
        assert!(CoalitionPlan::build(5, 0, &mut rng()).is_empty());
        assert!(!CoalitionPlan::build(5, 4, &mut rng()).is_empty());
    }

    #[test]
    fn kernel_weight_endpoints_are_infinite() {
        assert!(kernel_weight(0, 4).is_infinite());
        assert!(kernel_weight(4, 4).is_infinite());
        assert_relative_eq!(kernel_weight(1, 4), 0.25);
        assert_relative_eq!(kernel_weight(2, 4), 0.125);
    }
}
