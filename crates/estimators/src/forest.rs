//! Random forest classifier
//!
//! Each tree is a CART classifier split on Gini impurity, grown on its own
//! seeded bootstrap sample with a random feature subset per split. Trees are
//! grown in parallel with rayon and vote at prediction time.

use common::{Error, Result};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::logistic::argmax;
use crate::spec::RandomForestParams;

/// Node of a flattened decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal node voting for a class index
    Leaf { class: usize },
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Decision tree stored as a node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Class index for one row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { class }) => return *class,
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                None => return 0,
            }
        }
    }

    /// Longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(TreeNode::Split { left, right, .. }) = self.nodes.get(idx) {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }
}

/// Fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<DecisionTree>,
    pub n_classes: usize,
}

impl ForestModel {
    /// Fits `params.n_estimators` trees on `x` with class indices `y`
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &RandomForestParams,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_samples != y.len() {
            return Err(Error::TrainingFailure("no training rows".to_string()));
        }
        let max_features = params.max_features.resolve(n_features);

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                if cancel.is_cancelled() {
                    return Err(Error::TrainingFailure("training cancelled".to_string()));
                }
                let mut rng = StdRng::seed_from_u64(params.random_state.wrapping_add(t as u64));
                let sample: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    max_features,
                    max_depth: params.max_depth,
                    min_samples_split: params.min_samples_split,
                    min_samples_leaf: params.min_samples_leaf,
                    cancel,
                };
                builder
                    .build(sample, &mut rng)
                    .ok_or_else(|| Error::TrainingFailure("training cancelled".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            n_trees = trees.len(),
            max_features,
            max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            "Random forest grown"
        );

        Ok(Self { trees, n_classes })
    }

    /// Majority vote per row, lowest class index on ties
    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut votes = vec![0usize; self.n_classes.max(1)];
                for tree in &self.trees {
                    let class = tree.predict_row(row);
                    if let Some(v) = votes.get_mut(class) {
                        *v += 1;
                    }
                }
                argmax(votes.into_iter().map(|v| v as f64))
            })
            .collect()
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    cancel: &'a CancellationToken,
}

/// Nodes expanded between cancellation checks while growing one tree
const CANCEL_CHECK_INTERVAL: usize = 64;

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<'a> TreeBuilder<'a> {
    /// Grows one tree; `None` when the fit was cancelled mid-tree
    fn build(&self, sample: Vec<usize>, rng: &mut StdRng) -> Option<DecisionTree> {
        let mut nodes = vec![TreeNode::Leaf { class: 0 }];
        // (node slot, rows reaching it, depth)
        let mut pending = vec![(0usize, sample, 0usize)];
        let mut expanded = 0usize;

        while let Some((slot, rows, depth)) = pending.pop() {
            expanded += 1;
            if expanded % CANCEL_CHECK_INTERVAL == 0 && self.cancel.is_cancelled() {
                return None;
            }
            let counts = self.class_counts(&rows);
            let majority = argmax(counts.iter().map(|&c| c as f64));

            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let depth_reached = self.max_depth.map_or(false, |d| depth >= d);
            if pure || depth_reached || rows.len() < self.min_samples_split {
                nodes[slot] = TreeNode::Leaf { class: majority };
                continue;
            }

            match self.best_split(&rows, rng) {
                Some(split) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                        .iter()
                        .copied()
                        .partition(|&r| self.x[[r, split.feature]] <= split.threshold);
                    let left = nodes.len();
                    nodes.push(TreeNode::Leaf { class: majority });
                    let right = nodes.len();
                    nodes.push(TreeNode::Leaf { class: majority });
                    nodes[slot] = TreeNode::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    pending.push((left, left_rows, depth + 1));
                    pending.push((right, right_rows, depth + 1));
                }
                None => nodes[slot] = TreeNode::Leaf { class: majority },
            }
        }

        Some(DecisionTree { nodes })
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    /// Searches a random feature subset; keeps drawing features past
    /// `max_features` until one admits a valid split
    fn best_split(&self, rows: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_threshold(rows, feature) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_threshold(&self, rows: &[usize], feature: usize) -> Option<BestSplit> {
        let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (self.x[[r, feature]], self.y[r])).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = sorted.len();
        let mut right_counts = vec![0usize; self.n_classes];
        for &(_, class) in &sorted {
            right_counts[class] += 1;
        }
        let mut left_counts = vec![0usize; self.n_classes];

        let mut best: Option<BestSplit> = None;
        for i in 0..total.saturating_sub(1) {
            let class = sorted[i].1;
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let n_left = i + 1;
            let n_right = total - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }
            if sorted[i].0 == sorted[i + 1].0 {
                continue;
            }

            let impurity = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / total as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                best = Some(BestSplit {
                    feature,
                    threshold: (sorted[i].0 + sorted[i + 1].0) / 2.0,
                    impurity,
                });
            }
        }
        best
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}
