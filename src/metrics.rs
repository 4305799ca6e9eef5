//! Accuracy, ROC-AUC and ROC curves on the train, test and out-of-time partitions

use crate::encoding::FeatureFrame;
use crate::error::{ChurnError, Result};
use crate::model::ChurnModel;
use ndarray::Array1;
use std::fmt;
use tracing::info;

/// Probability above which a customer is predicted to churn
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Evaluation partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
    OutOfTime,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Partition::Train => "train",
            Partition::Test => "test",
            Partition::OutOfTime => "oot",
        };
        write!(f, "{}", name)
    }
}

/// Share of rows whose thresholded prediction matches the label
pub fn accuracy(labels: &Array1<usize>, probabilities: &Array1<f64>) -> Result<f64> {
    check_lengths(labels, probabilities)?;
    if labels.is_empty() {
        return Err(ChurnError::Evaluation("accuracy of an empty partition".to_string()));
    }
    let correct = labels
        .iter()
        .zip(probabilities.iter())
        .filter(|(&label, &p)| (p > DECISION_THRESHOLD) == (label == 1))
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Area under the ROC curve via the rank statistic, ties sharing their mean rank
pub fn roc_auc(labels: &Array1<usize>, scores: &Array1<f64>) -> Result<f64> {
    check_lengths(labels, scores)?;
    let (positives, negatives) = class_counts(labels)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end+1 share their mean
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        let tied_positives = order[start..=end].iter().filter(|&&i| labels[i] == 1).count();
        positive_rank_sum += mean_rank * tied_positives as f64;
        start = end + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// ROC curve points, from the strictest threshold to the loosest
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.fpr.iter().copied().zip(self.tpr.iter().copied()).collect()
    }
}

/// One point per distinct score, preceded by the (0, 0) origin
pub fn roc_curve(labels: &Array1<usize>, scores: &Array1<f64>) -> Result<RocCurve> {
    check_lengths(labels, scores)?;
    let (positives, negatives) = class_counts(labels)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };

    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if labels[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = pos + 1 == order.len() || scores[order[pos + 1]] != scores[idx];
        if last_of_group {
            curve.fpr.push(fp as f64 / negatives as f64);
            curve.tpr.push(tp as f64 / positives as f64);
            curve.thresholds.push(scores[idx]);
        }
    }

    Ok(curve)
}

fn check_lengths(labels: &Array1<usize>, scores: &Array1<f64>) -> Result<()> {
    if labels.len() != scores.len() {
        return Err(ChurnError::Evaluation(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }
    Ok(())
}

fn class_counts(labels: &Array1<usize>) -> Result<(usize, usize)> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ChurnError::Evaluation(format!(
            "ROC undefined with {} churners and {} non-churners",
            positives, negatives
        )));
    }
    Ok((positives, negatives))
}

/// Metrics of one model on one partition
#[derive(Debug, Clone)]
pub struct PartitionMetrics {
    pub partition: Partition,
    pub customers: usize,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub roc: RocCurve,
}

/// Metrics for every evaluated partition
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub partitions: Vec<PartitionMetrics>,
}

impl EvaluationReport {
    pub fn get(&self, partition: Partition) -> Option<&PartitionMetrics> {
        self.partitions.iter().find(|m| m.partition == partition)
    }
}

/// Scores a model against labelled frames
pub struct Evaluator;

impl Evaluator {
    pub fn evaluate<M: ChurnModel + ?Sized>(
        model: &M,
        partition: Partition,
        frame: &FeatureFrame,
        labels: &Array1<usize>,
    ) -> Result<PartitionMetrics> {
        let probabilities = model.predict_proba(frame)?;
        let metrics = PartitionMetrics {
            partition,
            customers: labels.len(),
            accuracy: accuracy(labels, &probabilities)?,
            roc_auc: roc_auc(labels, &probabilities)?,
            roc: roc_curve(labels, &probabilities)?,
        };
        info!(
            partition = %partition,
            accuracy = metrics.accuracy,
            roc_auc = metrics.roc_auc,
            "Partition evaluated"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_uses_strict_threshold() {
        let labels = array![1, 0, 1, 0];
        let proba = array![0.9, 0.5, 0.5, 0.1];
        assert_eq!(accuracy(&labels, &proba).unwrap(), 0.75);
    }

    #[test]
    fn test_roc_auc_extremes() {
        let labels = array![0, 0, 1, 1];
        assert_eq!(roc_auc(&labels, &array![0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&labels, &array![0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
        assert_eq!(roc_auc(&labels, &array![0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
    }

    #[test]
    fn test_roc_auc_with_partial_ties() {
        // Three of the four churner/non-churner pairs are ordered correctly
        let labels = array![0, 0, 1, 1];
        let scores = array![0.1, 0.4, 0.35, 0.8];
        assert_eq!(roc_auc(&labels, &scores).unwrap(), 0.75);

        let tied = array![0.1, 0.35, 0.35, 0.8];
        assert_eq!(roc_auc(&labels, &tied).unwrap(), 0.875);
    }

    #[test]
    fn test_single_class_is_evaluation_error() {
        let labels = array![0, 0, 0];
        let scores = array![0.1, 0.2, 0.3];
        assert!(matches!(roc_auc(&labels, &scores), Err(ChurnError::Evaluation(_))));
        assert!(roc_curve(&labels, &scores).is_err());
    }

    #[test]
    fn test_roc_curve_points() {
        let labels = array![0, 0, 1, 1];
        let curve = roc_curve(&labels, &array![0.1, 0.4, 0.35, 0.8]).unwrap();

        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(curve.thresholds[1], 0.8);
        assert_eq!(curve.points().last(), Some(&(1.0, 1.0)));
    }
}
