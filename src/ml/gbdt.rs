//! Gradient-boosted regression trees with a squared-error objective.
//!
//! Exact greedy splits on raw feature values, per-round row and column
//! subsampling, fixed seed. Given identical inputs, seed, and
//! hyperparameters the fitted ensemble is reproducible to floating-point
//! tolerance.

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum variance-reduction gain for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

/// Boosting hyperparameters. These are fixed by design; no tuning loop
/// exists around them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub seed: u64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_rounds: 1000,
            learning_rate: 0.01,
            max_depth: 7,
            min_child_weight: 1.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoostError {
    #[error("Cannot train on an empty feature matrix")]
    EmptyTrainingSet,
    #[error("Training requires at least two distinct target values, found {0}")]
    DegenerateTarget(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A single regression tree over the preprocessed feature matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    fn fit(
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        rows: Vec<usize>,
        cols: &[usize],
        max_depth: usize,
        min_child_weight: f64,
    ) -> Self {
        let mut nodes = Vec::new();
        build_node(
            &mut nodes,
            x,
            residuals,
            rows,
            cols,
            0,
            max_depth,
            min_child_weight,
        );
        Self { nodes }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    #[cfg(test)]
    fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Grow one node, returning its index. The parent slot is reserved before
/// the children so the root always sits at index 0.
#[allow(clippy::too_many_arguments)]
fn build_node(
    nodes: &mut Vec<Node>,
    x: ArrayView2<'_, f64>,
    residuals: &[f64],
    rows: Vec<usize>,
    cols: &[usize],
    depth: usize,
    max_depth: usize,
    min_child_weight: f64,
) -> usize {
    let sum: f64 = rows.iter().map(|&r| residuals[r]).sum();
    let mean = sum / rows.len() as f64;

    let index = nodes.len();
    nodes.push(Node::Leaf { value: mean });

    if depth >= max_depth || rows.len() < 2 {
        return index;
    }

    let Some(candidate) = best_split(x, residuals, &rows, cols, min_child_weight) else {
        return index;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&r| x[[r, candidate.feature]] < candidate.threshold);
    if left_rows.is_empty() || right_rows.is_empty() {
        // Adjacent values so close that the midpoint rounds onto one of
        // them; keep the leaf.
        return index;
    }

    let left = build_node(
        nodes,
        x,
        residuals,
        left_rows,
        cols,
        depth + 1,
        max_depth,
        min_child_weight,
    );
    let right = build_node(
        nodes,
        x,
        residuals,
        right_rows,
        cols,
        depth + 1,
        max_depth,
        min_child_weight,
    );

    nodes[index] = Node::Split {
        feature: candidate.feature,
        threshold: candidate.threshold,
        left,
        right,
    };
    index
}

/// Exact greedy split search: scan sorted feature values, maximize the
/// variance-reduction gain. Ties keep the first candidate so the result does
/// not depend on iteration incidentals.
fn best_split(
    x: ArrayView2<'_, f64>,
    residuals: &[f64],
    rows: &[usize],
    cols: &[usize],
    min_child_weight: f64,
) -> Option<SplitCandidate> {
    let total_n = rows.len() as f64;
    let total_sum: f64 = rows.iter().map(|&r| residuals[r]).sum();
    let parent_score = total_sum * total_sum / total_n;

    let mut best: Option<SplitCandidate> = None;
    let mut order = rows.to_vec();

    for &col in cols {
        order.sort_by(|&a, &b| {
            x[[a, col]]
                .partial_cmp(&x[[b, col]])
                .unwrap_or(Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_n = 0.0;
        for i in 0..order.len() - 1 {
            left_sum += residuals[order[i]];
            left_n += 1.0;

            let value = x[[order[i], col]];
            let next = x[[order[i + 1], col]];
            if value == next {
                continue;
            }

            let right_n = total_n - left_n;
            if left_n < min_child_weight || right_n < min_child_weight {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let gain =
                left_sum * left_sum / left_n + right_sum * right_sum / right_n - parent_score;
            if gain > best.as_ref().map_or(MIN_GAIN, |b| b.gain) {
                best = Some(SplitCandidate {
                    feature: col,
                    threshold: (value + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

/// The fitted ensemble: base score plus shrunken tree corrections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostParams,
    ) -> Result<Self, BoostError> {
        let n = x.nrows();
        if n == 0 {
            return Err(BoostError::EmptyTrainingSet);
        }

        let distinct = distinct_count(y);
        if distinct < 2 {
            return Err(BoostError::DegenerateTarget(distinct));
        }

        let base_score = y.sum() / n as f64;
        let mut predictions = vec![base_score; n];
        let mut residuals = vec![0.0; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            for i in 0..n {
                residuals[i] = y[i] - predictions[i];
            }

            let rows = sample_indices(&mut rng, n, params.subsample);
            let cols = sample_indices(&mut rng, x.ncols(), params.colsample_bytree);

            let tree = RegressionTree::fit(
                x,
                &residuals,
                rows,
                &cols,
                params.max_depth,
                params.min_child_weight,
            );

            // The tree is grown on the subsample; the score update covers
            // every training row.
            for i in 0..n {
                predictions[i] += params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_score
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        Array1::from_iter(x.rows().into_iter().map(|row| self.predict_row(row)))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn distinct_count(y: ArrayView1<'_, f64>) -> usize {
    let mut sorted: Vec<f64> = y.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted.dedup();
    sorted.len()
}

/// Draw a sorted subsample of `0..n` without replacement.
fn sample_indices(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if fraction >= 1.0 {
        return indices;
    }
    let keep = ((n as f64 * fraction).round() as usize).clamp(1, n);
    indices.shuffle(rng);
    indices.truncate(keep);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(20, |i| if i < 10 { 0.0 } else { 10.0 });
        (x, y)
    }

    fn exhaustive_params(n_rounds: usize, learning_rate: f64) -> BoostParams {
        BoostParams {
            n_rounds,
            learning_rate,
            max_depth: 3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..BoostParams::default()
        }
    }

    #[test]
    fn test_single_tree_recovers_step_function() {
        let (x, y) = step_data();
        let residuals: Vec<f64> = y.to_vec();
        let rows: Vec<usize> = (0..20).collect();

        let tree = RegressionTree::fit(x.view(), &residuals, rows, &[0], 3, 1.0);

        assert_relative_eq!(tree.predict_row(x.row(0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tree.predict_row(x.row(19)), 10.0, epsilon = 1e-9);
        assert!(tree.n_nodes() >= 3);
    }

    #[test]
    fn test_boosting_converges_on_step_function() {
        let (x, y) = step_data();
        let model =
            GradientBoostedTrees::fit(x.view(), y.view(), &exhaustive_params(120, 0.3)).unwrap();

        for i in 0..20 {
            assert_relative_eq!(model.predict_row(x.row(i)), y[i], epsilon = 1e-6);
        }
        assert_eq!(model.n_trees(), 120);
    }

    #[test]
    fn test_constant_features_predict_target_mean() {
        let x = Array2::from_elem((10, 2), 1.0);
        let y = Array1::from_shape_fn(10, |i| i as f64);

        let model =
            GradientBoostedTrees::fit(x.view(), y.view(), &exhaustive_params(50, 0.1)).unwrap();

        // No split is possible, every leaf is the zero residual mean.
        assert_relative_eq!(model.predict_row(x.row(0)), 4.5, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_target_is_rejected() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(5, 7.0);

        let err = GradientBoostedTrees::fit(x.view(), y.view(), &BoostParams::default())
            .unwrap_err();
        assert_eq!(err, BoostError::DegenerateTarget(1));
    }

    #[test]
    fn test_empty_matrix_is_rejected() {
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array1::<f64>::zeros(0);

        let err = GradientBoostedTrees::fit(x.view(), y.view(), &BoostParams::default())
            .unwrap_err();
        assert_eq!(err, BoostError::EmptyTrainingSet);
    }

    #[test]
    fn test_fit_is_deterministic_under_subsampling() {
        let x = Array2::from_shape_fn((60, 4), |(i, j)| ((i * 7 + j * 3) % 13) as f64);
        let y = Array1::from_shape_fn(60, |i| (i % 9) as f64 * 100.0);

        let params = BoostParams {
            n_rounds: 30,
            learning_rate: 0.1,
            max_depth: 4,
            ..BoostParams::default()
        };

        let a = GradientBoostedTrees::fit(x.view(), y.view(), &params).unwrap();
        let b = GradientBoostedTrees::fit(x.view(), y.view(), &params).unwrap();

        for i in 0..60 {
            assert_eq!(a.predict_row(x.row(i)), b.predict_row(x.row(i)));
        }
    }

    #[test]
    fn test_different_seeds_change_the_ensemble() {
        let x = Array2::from_shape_fn((60, 4), |(i, j)| ((i * 5 + j) % 17) as f64);
        let y = Array1::from_shape_fn(60, |i| ((i * 11) % 23) as f64);

        let base = BoostParams {
            n_rounds: 20,
            learning_rate: 0.1,
            ..BoostParams::default()
        };
        let other = BoostParams { seed: 7, ..base };

        let a = GradientBoostedTrees::fit(x.view(), y.view(), &base).unwrap();
        let b = GradientBoostedTrees::fit(x.view(), y.view(), &other).unwrap();

        let differs = (0..60).any(|i| a.predict_row(x.row(i)) != b.predict_row(x.row(i)));
        assert!(differs);
    }

    #[test]
    fn test_predict_batch_matches_rows() {
        let (x, y) = step_data();
        let model =
            GradientBoostedTrees::fit(x.view(), y.view(), &exhaustive_params(20, 0.3)).unwrap();

        let batch = model.predict(x.view());
        for i in 0..20 {
            assert_eq!(batch[i], model.predict_row(x.row(i)));
        }
    }

    #[test]
    fn test_sample_indices_full_fraction_keeps_all() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_indices(&mut rng, 5, 1.0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_indices_fraction_is_sorted_subset() {
        let mut rng = StdRng::seed_from_u64(0);
        let sample = sample_indices(&mut rng, 10, 0.8);

        assert_eq!(sample.len(), 8);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
        assert!(sample.iter().all(|&i| i < 10));
    }
}
