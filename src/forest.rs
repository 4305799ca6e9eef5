//! Decision tree helpers and a bagged random forest built from linfa trees
//!
//! Fitted trees are flattened into [`LeafTree`]s that score a row by the churn
//! share of the training rows in its leaf, so probabilities never depend on
//! how linfa breaks ties between leaf classes.

use crate::error::{ChurnError, Result};
use crate::model::SplitCriterion;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality, TreeNode};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fit a single linfa decision tree on 0/1 labels
///
/// # Arguments
/// * `x` - Feature matrix (samples x features)
/// * `y` - Class labels
/// * `criterion` - Impurity measure used to choose splits
/// * `max_depth` - Depth limit, `None` for unconstrained
/// * `min_samples_leaf` - Minimum number of samples in each leaf
pub fn fit_tree(
    x: &Array2<f64>,
    y: &Array1<usize>,
    criterion: SplitCriterion,
    max_depth: Option<usize>,
    min_samples_leaf: usize,
) -> Result<DecisionTree<f64, usize>> {
    if x.nrows() == 0 || x.nrows() != y.len() {
        return Err(ChurnError::Training(format!(
            "cannot fit a tree on {} rows with {} labels",
            x.nrows(),
            y.len()
        )));
    }

    let quality = match criterion {
        SplitCriterion::Gini => SplitQuality::Gini,
        SplitCriterion::Entropy => SplitQuality::Entropy,
    };

    let dataset = Dataset::new(x.clone(), y.clone());
    DecisionTree::<f64, usize>::params()
        .split_quality(quality)
        .max_depth(max_depth)
        .min_weight_leaf(min_samples_leaf.max(1) as f32)
        .fit(&dataset)
        .map_err(|e| ChurnError::Training(e.to_string()))
}

/// Sorted, de-duplicated split thresholds of every internal node
pub fn split_thresholds(tree: &DecisionTree<f64, usize>) -> Vec<f64> {
    let mut thresholds: Vec<f64> = tree
        .iter_nodes()
        .filter(|node| !node.is_leaf())
        .map(|node| node.split().1)
        .collect();
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    thresholds
}

/// One node of a flattened tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LeafNode {
    feature: usize,
    threshold: f64,
    /// Left and right child indices; `None` for leaves
    children: Option<(usize, usize)>,
    samples: usize,
    churn_rate: f64,
}

/// A fitted tree whose nodes carry the churn share of the training rows routed to them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafTree {
    nodes: Vec<LeafNode>,
}

impl LeafTree {
    /// Flatten `tree` and route its training rows down it to learn node churn rates
    ///
    /// # Arguments
    /// * `tree` - Tree fitted on `x` and `y`
    /// * `x` - Training rows of the tree
    /// * `y` - Training labels
    pub fn from_tree(tree: &DecisionTree<f64, usize>, x: &Array2<f64>, y: &Array1<usize>) -> Self {
        let mut nodes = Vec::new();
        flatten(tree.root_node(), &mut nodes);

        let mut churned = vec![0usize; nodes.len()];
        let mut samples = vec![0usize; nodes.len()];
        for (row, &label) in x.outer_iter().zip(y.iter()) {
            let mut index = 0;
            loop {
                samples[index] += 1;
                churned[index] += usize::from(label == 1);
                match nodes[index].children {
                    Some((left, right)) => index = route(&nodes[index], row, left, right),
                    None => break,
                }
            }
        }

        for (i, node) in nodes.iter_mut().enumerate() {
            node.samples = samples[i];
            node.churn_rate = if samples[i] == 0 {
                0.0
            } else {
                churned[i] as f64 / samples[i] as f64
            };
        }
        Self { nodes }
    }

    /// Churn rate of the deepest node reached that saw training rows
    pub fn probability(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        while let Some((left, right)) = self.nodes[index].children {
            let next = route(&self.nodes[index], row, left, right);
            if self.nodes[next].samples == 0 {
                break;
            }
            index = next;
        }
        self.nodes[index].churn_rate
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.probability(row)).collect()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|node| node.children.is_none()).count()
    }
}

fn flatten(node: &TreeNode<f64, usize>, nodes: &mut Vec<LeafNode>) -> usize {
    let index = nodes.len();
    let (feature, threshold, _) = node.split();
    nodes.push(LeafNode {
        feature,
        threshold,
        children: None,
        samples: 0,
        churn_rate: 0.0,
    });

    if !node.is_leaf() {
        let children = node.children();
        if let (Some(left), Some(right)) = (children[0].as_deref(), children[1].as_deref()) {
            let left = flatten(left, nodes);
            let right = flatten(right, nodes);
            nodes[index].children = Some((left, right));
        }
    }
    index
}

// Same rule linfa uses: strictly below the split value goes left.
fn route(node: &LeafNode, row: ArrayView1<f64>, left: usize, right: usize) -> usize {
    if row[node.feature] < node.threshold {
        left
    } else {
        right
    }
}

/// Hyperparameters of the forest candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub min_samples_leaf: usize,
    pub criterion: SplitCriterion,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestMember {
    features: Vec<usize>,
    tree: LeafTree,
    /// Importances over `features`, non-finite values zeroed
    importance: Vec<f64>,
}

/// Bootstrapped trees, each grown on a random subspace of √p features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    members: Vec<ForestMember>,
}

impl RandomForest {
    pub fn fit(params: ForestParams, x: &Array2<f64>, y: &Array1<usize>) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples == 0 || n_features == 0 || params.n_trees == 0 {
            return Err(ChurnError::Training(format!(
                "forest needs samples, features and trees (got {}, {}, {})",
                n_samples, n_features, params.n_trees
            )));
        }
        let subspace = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);

        let members = (0..params.n_trees)
            .into_par_iter()
            .map(|i| -> Result<ForestMember> {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let mut features: Vec<usize> = (0..n_features).collect();
                features.shuffle(&mut rng);
                features.truncate(subspace);
                features.sort_unstable();

                let sample = x.select(Axis(0), &rows).select(Axis(1), &features);
                let targets = y.select(Axis(0), &rows);
                let fitted = fit_tree(&sample, &targets, params.criterion, None, params.min_samples_leaf)?;
                let importance = fitted
                    .feature_importance()
                    .into_iter()
                    .map(|v| if v.is_finite() { v } else { 0.0 })
                    .collect();
                Ok(ForestMember {
                    features,
                    tree: LeafTree::from_tree(&fitted, &sample, &targets),
                    importance,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(trees = members.len(), subspace, "Random forest fitted");
        Ok(Self { n_features, members })
    }

    /// Mean leaf churn share over the trees for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(ChurnError::Schema(format!(
                "forest expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        // Summed in member order so the result does not depend on thread scheduling.
        let per_tree: Vec<Array1<f64>> = self
            .members
            .par_iter()
            .map(|member| member.tree.predict_proba(&x.select(Axis(1), &member.features)))
            .collect();
        let total = per_tree
            .into_iter()
            .fold(Array1::zeros(x.nrows()), |acc: Array1<f64>, p| acc + p);

        Ok(total / self.members.len() as f64)
    }

    /// Mean impurity-decrease importance over the members, in input column order
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for member in &self.members {
            for (local, importance) in member.importance.iter().enumerate() {
                totals[member.features[local]] += importance;
            }
        }
        let n = self.members.len() as f64;
        totals.iter_mut().for_each(|t| *t /= n);
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [1.0, 5.0],
            [2.0, 4.0],
            [3.0, 6.0],
            [4.0, 5.0],
            [10.0, 5.0],
            [11.0, 4.0],
            [12.0, 6.0],
            [13.0, 5.0]
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_split_thresholds_separate_classes() {
        let (x, y) = separable();
        let column = x.column(0).to_owned().insert_axis(Axis(1));
        let tree = fit_tree(&column, &y, SplitCriterion::Gini, Some(1), 1).unwrap();
        let thresholds = split_thresholds(&tree);

        assert_eq!(thresholds.len(), 1);
        assert!(thresholds[0] > 4.0 && thresholds[0] <= 10.0);
    }

    #[test]
    fn test_forest_probabilities_are_leaf_shares() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 25,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Entropy,
            seed: 42,
        };
        let forest = RandomForest::fit(params, &x, &y).unwrap();
        let proba = forest.predict_proba(&x).unwrap();

        assert_eq!(proba.len(), 8);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[7] > proba[0]);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 10,
            min_samples_leaf: 2,
            criterion: SplitCriterion::Gini,
            seed: 7,
        };
        let reference = RandomForest::fit(params, &x, &y).unwrap().predict_proba(&x).unwrap();
        for _ in 0..20 {
            let refit = RandomForest::fit(params, &x, &y).unwrap().predict_proba(&x).unwrap();
            assert_eq!(refit, reference);
        }
    }

    #[test]
    fn test_leaf_tree_scores_training_leaf_rates() {
        let (x, y) = separable();
        let tree = fit_tree(&x, &y, SplitCriterion::Gini, Some(1), 1).unwrap();
        let leaves = LeafTree::from_tree(&tree, &x, &y);

        assert_eq!(leaves.n_leaves(), 2);
        let proba = leaves.predict_proba(&x);
        assert_eq!(proba.to_vec(), vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_leaf_tree_tied_leaf_is_half() {
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = array![0, 1, 0, 1];
        let tree = fit_tree(&x, &y, SplitCriterion::Gini, None, 1).unwrap();
        let leaves = LeafTree::from_tree(&tree, &x, &y);

        for _ in 0..10 {
            assert_eq!(leaves.predict_proba(&x).to_vec(), vec![0.5; 4]);
        }
    }

    #[test]
    fn test_forest_importance_follows_input_columns() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 20,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Gini,
            seed: 3,
        };
        let forest = RandomForest::fit(params, &x, &y).unwrap();
        let importance = forest.feature_importance();

        assert_eq!(importance.len(), 2);
        assert!(importance.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_forest_rejects_wrong_width() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 3,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Gini,
            seed: 1,
        };
        let forest = RandomForest::fit(params, &x, &y).unwrap();
        let narrow = x.select(Axis(1), &[0]);
        assert!(forest.predict_proba(&narrow).is_err());
    }
}
