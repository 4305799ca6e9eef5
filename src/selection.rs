//! Feature selection by cumulative decision-tree importance

use crate::encoding::FeatureFrame;
use crate::error::Result;
use crate::forest::fit_tree;
use crate::model::SplitCriterion;
use ndarray::Array1;
use tracing::info;

/// A feature's share of the total impurity decrease
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    pub cumulative: f64,
}

/// Rank features by importance, descending; ties keep column order
pub fn rank_importances(features: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut order: Vec<usize> = (0..features.len().min(importances.len())).collect();
    order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]));

    let mut cumulative = 0.0;
    order
        .into_iter()
        .map(|idx| {
            cumulative += importances[idx];
            FeatureImportance {
                feature: features[idx].clone(),
                importance: importances[idx],
                cumulative,
            }
        })
        .collect()
}

/// Names of the ranked prefix whose cumulative importance stays below `threshold`.
///
/// The top-ranked feature is always kept.
pub fn retain_below_threshold(ranking: &[FeatureImportance], threshold: f64) -> Vec<String> {
    ranking
        .iter()
        .enumerate()
        .take_while(|(pos, f)| *pos == 0 || f.cumulative < threshold)
        .map(|(_, f)| f.feature.clone())
        .collect()
}

/// Outcome of a selection run
#[derive(Debug, Clone)]
pub struct FeatureSelection {
    pub ranking: Vec<FeatureImportance>,
    pub selected: Vec<String>,
}

/// Unconstrained Gini tree importance with a cumulative cut-off
#[derive(Debug, Clone, Copy)]
pub struct FeatureSelector {
    threshold: f64,
}

impl FeatureSelector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn select(&self, frame: &FeatureFrame, labels: &Array1<usize>) -> Result<FeatureSelection> {
        let tree = fit_tree(&frame.values, labels, SplitCriterion::Gini, None, 1)?;
        let importances: Vec<f64> = tree
            .feature_importance()
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();

        let ranking = rank_importances(&frame.columns, &importances);
        let selected = retain_below_threshold(&ranking, self.threshold);

        info!(
            candidates = frame.ncols(),
            selected = selected.len(),
            threshold = self.threshold,
            "Features selected by cumulative importance"
        );

        Ok(FeatureSelection { ranking, selected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_threshold_keeps_prefix_below_cutoff() {
        let ranking = rank_importances(&names(&["a", "b", "c"]), &[0.5, 0.3, 0.2]);
        assert_eq!(retain_below_threshold(&ranking, 0.96), names(&["a", "b"]));
    }

    #[test]
    fn test_ranking_orders_by_importance_then_column() {
        let ranking = rank_importances(&names(&["a", "b", "c", "d"]), &[0.1, 0.4, 0.1, 0.4]);
        let order: Vec<&str> = ranking.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
        assert!((ranking[3].cumulative - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_feature_always_kept() {
        let ranking = rank_importances(&names(&["a", "b"]), &[0.99, 0.01]);
        assert_eq!(retain_below_threshold(&ranking, 0.96), names(&["a"]));
    }

    #[test]
    fn test_selector_picks_informative_column() {
        let mut values = Array2::zeros((20, 3));
        let mut labels = Array1::zeros(20);
        for i in 0..20 {
            values[[i, 0]] = (i % 4) as f64;
            values[[i, 1]] = i as f64;
            values[[i, 2]] = 1.0;
            labels[i] = usize::from(i >= 10);
        }
        let frame = FeatureFrame::new((0..20).collect(), names(&["noise", "signal", "constant"]), values).unwrap();

        let selection = FeatureSelector::new(0.96).select(&frame, &labels).unwrap();
        assert_eq!(selection.ranking[0].feature, "signal");
        assert_eq!(selection.selected, names(&["signal"]));
    }

    #[test]
    fn test_empty_ranking() {
        let ranking = rank_importances(&[], &[]);
        assert!(retain_below_threshold(&ranking, 0.96).is_empty());
    }
}
