//! Supervised tree discretisation of continuous features and one-hot expansion of bins.
//!
//! Each continuous feature gets its own single-feature decision tree. The depth
//! is picked by stratified cross-validated accuracy, the tree is refit on the
//! whole column, and its split thresholds become bin edges. Bin numbers are then
//! expanded into `<feature>_<bin>` indicator columns.

use crate::encoding::FeatureFrame;
use crate::error::{ChurnError, Result};
use crate::forest::{fit_tree, split_thresholds, LeafTree};
use crate::metrics::accuracy;
use crate::model::SplitCriterion;
use crate::search::stratified_folds;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Learned bin edges of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBins {
    pub feature: String,
    pub depth: usize,
    /// Sorted split thresholds
    pub thresholds: Vec<f64>,
}

impl FeatureBins {
    /// Bin number: count of thresholds at or below the value
    pub fn bin(&self, value: f64) -> usize {
        self.thresholds.partition_point(|t| *t <= value)
    }
}

/// Per-feature decision-tree binning, fitted on the training partition only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDiscretiser {
    bins: Vec<FeatureBins>,
}

impl TreeDiscretiser {
    /// Fit one tree per variable
    ///
    /// # Arguments
    /// * `frame` - Training features
    /// * `labels` - Churn labels aligned with `frame` rows
    /// * `variables` - Continuous columns to discretise
    /// * `depths` - Candidate tree depths, compared by cross-validated accuracy
    /// * `n_splits` - Number of stratified folds
    pub fn fit(
        frame: &FeatureFrame,
        labels: &Array1<usize>,
        variables: &[String],
        depths: &[usize],
        n_splits: usize,
    ) -> Result<Self> {
        if depths.is_empty() {
            return Err(ChurnError::Config("no discretisation depths given".to_string()));
        }
        let folds = stratified_folds(labels, n_splits)?;

        let mut bins = Vec::with_capacity(variables.len());
        for variable in variables {
            let column = frame
                .column(variable)
                .ok_or_else(|| ChurnError::Schema(format!("cannot discretise missing column '{}'", variable)))?
                .to_owned()
                .insert_axis(Axis(1));

            let mut best_depth = depths[0];
            let mut best_score = f64::NEG_INFINITY;
            for &depth in depths {
                let mut total = 0.0;
                for fold in &folds {
                    let x_train = column.select(Axis(0), &fold.train_indices);
                    let y_train = labels.select(Axis(0), &fold.train_indices);
                    let x_test = column.select(Axis(0), &fold.test_indices);
                    let y_test = labels.select(Axis(0), &fold.test_indices);

                    let tree = fit_tree(&x_train, &y_train, SplitCriterion::Gini, Some(depth), 1)?;
                    let leaves = LeafTree::from_tree(&tree, &x_train, &y_train);
                    total += accuracy(&y_test, &leaves.predict_proba(&x_test))?;
                }
                let score = total / folds.len() as f64;
                if score > best_score {
                    best_score = score;
                    best_depth = depth;
                }
            }

            let tree = fit_tree(&column, labels, SplitCriterion::Gini, Some(best_depth), 1)?;
            let thresholds = split_thresholds(&tree);
            debug!(feature = %variable, depth = best_depth, cv_accuracy = best_score, bins = thresholds.len() + 1, "Feature discretised");

            bins.push(FeatureBins {
                feature: variable.clone(),
                depth: best_depth,
                thresholds,
            });
        }

        Ok(Self { bins })
    }

    pub fn bins(&self) -> &[FeatureBins] {
        &self.bins
    }

    /// Replace each discretised column by its bin numbers
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let mut binned = frame.clone();
        for bins in &self.bins {
            let idx = frame
                .column_index(&bins.feature)
                .ok_or_else(|| ChurnError::Schema(format!("frame has no column '{}'", bins.feature)))?;
            binned
                .values
                .column_mut(idx)
                .mapv_inplace(|value| bins.bin(value) as f64);
        }
        Ok(binned)
    }
}

/// Bin levels observed for one discretised feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinLevels {
    feature: String,
    levels: Vec<usize>,
}

/// One-hot expansion of bin numbers; passthrough columns come first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEncoder {
    input_columns: Vec<String>,
    passthrough: Vec<String>,
    encoded: Vec<BinLevels>,
}

impl BinEncoder {
    /// Learn the bin levels present in a discretised training frame
    pub fn fit(frame: &FeatureFrame, variables: &[String]) -> Result<Self> {
        let mut encoded = Vec::with_capacity(variables.len());
        for variable in variables {
            let column = frame
                .column(variable)
                .ok_or_else(|| ChurnError::Schema(format!("cannot encode missing column '{}'", variable)))?;
            let levels: BTreeSet<usize> = column.iter().map(|v| *v as usize).collect();
            encoded.push(BinLevels {
                feature: variable.clone(),
                levels: levels.into_iter().collect(),
            });
        }

        let passthrough = frame
            .columns
            .iter()
            .filter(|c| !variables.contains(*c))
            .cloned()
            .collect();

        Ok(Self {
            input_columns: frame.columns.clone(),
            passthrough,
            encoded,
        })
    }

    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.passthrough.clone();
        for bins in &self.encoded {
            columns.extend(bins.levels.iter().map(|level| format!("{}_{}", bins.feature, level)));
        }
        columns
    }

    /// Expand bins into indicators; bins unseen during fitting map to all zeros
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        if frame.columns != self.input_columns {
            return Err(ChurnError::Schema(format!(
                "bin encoder expects columns {:?}, got {:?}",
                self.input_columns, frame.columns
            )));
        }

        let columns = self.output_columns();
        let mut values = Array2::zeros((frame.nrows(), columns.len()));

        let mut target = 0;
        for name in &self.passthrough {
            if let Some(source) = frame.column(name) {
                values.column_mut(target).assign(&source);
            }
            target += 1;
        }
        for bins in &self.encoded {
            if let Some(source) = frame.column(&bins.feature) {
                for (row, value) in source.iter().enumerate() {
                    if let Ok(pos) = bins.levels.binary_search(&(*value as usize)) {
                        values[[row, target + pos]] = 1.0;
                    }
                }
            }
            target += bins.levels.len();
        }

        FeatureFrame::new(frame.customer_ids.clone(), columns, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frame() -> (FeatureFrame, Array1<usize>) {
        let values = array![
            [1.0, 0.0],
            [2.0, 1.0],
            [3.0, 0.0],
            [4.0, 1.0],
            [5.0, 0.0],
            [6.0, 1.0],
            [20.0, 0.0],
            [21.0, 1.0],
            [22.0, 0.0],
            [23.0, 1.0],
            [24.0, 0.0],
            [25.0, 1.0]
        ];
        let labels = array![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let frame = FeatureFrame::new(
            (0..12).collect(),
            vec!["Tenure".to_string(), "Complain_True".to_string()],
            values,
        )
        .unwrap();
        (frame, labels)
    }

    #[test]
    fn test_bin_counts_thresholds_at_or_below() {
        let bins = FeatureBins {
            feature: "Tenure".to_string(),
            depth: 2,
            thresholds: vec![2.5, 10.0, 15.5],
        };
        assert_eq!(bins.bin(1.0), 0);
        assert_eq!(bins.bin(2.5), 1);
        assert_eq!(bins.bin(12.0), 2);
        assert_eq!(bins.bin(99.0), 3);
    }

    #[test]
    fn test_discretiser_finds_class_boundary() {
        let (frame, labels) = frame();
        let variables = vec!["Tenure".to_string()];
        let discretiser = TreeDiscretiser::fit(&frame, &labels, &variables, &[1, 2, 3, 4], 3).unwrap();

        let bins = &discretiser.bins()[0];
        assert_eq!(bins.depth, 1);
        assert_eq!(bins.thresholds.len(), 1);
        assert!(bins.thresholds[0] > 6.0 && bins.thresholds[0] <= 20.0);

        let binned = discretiser.transform(&frame).unwrap();
        assert_eq!(binned.column("Tenure").unwrap()[0], 0.0);
        assert_eq!(binned.column("Tenure").unwrap()[11], 1.0);
        assert_eq!(binned.column("Complain_True").unwrap(), frame.column("Complain_True").unwrap());
    }

    #[test]
    fn test_bin_encoder_layout_and_unseen_bins() {
        let values = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let columns = vec!["Tenure".to_string(), "Complain_True".to_string()];
        let binned = FeatureFrame::new(vec![1, 2, 3], columns.clone(), values).unwrap();
        let encoder = BinEncoder::fit(&binned, &["Tenure".to_string()]).unwrap();

        assert_eq!(encoder.output_columns(), vec!["Complain_True", "Tenure_0", "Tenure_1"]);

        let unseen = FeatureFrame::new(vec![9], columns, array![[2.0, 0.0]]).unwrap();
        let encoded = encoder.transform(&unseen).unwrap();
        assert_eq!(encoded.values.row(0).to_vec(), vec![0.0, 0.0, 0.0]);

        let encoded = encoder.transform(&binned).unwrap();
        assert_eq!(encoded.values.row(1).to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bin_encoder_rejects_other_columns() {
        let binned = FeatureFrame::new(vec![1], vec!["Tenure".to_string()], array![[0.0]]).unwrap();
        let encoder = BinEncoder::fit(&binned, &["Tenure".to_string()]).unwrap();
        let other = FeatureFrame::new(vec![1], vec!["OrderCount".to_string()], array![[0.0]]).unwrap();
        assert!(matches!(encoder.transform(&other), Err(ChurnError::Schema(_))));
    }
}
