//! Candidate classifiers and the binning + classifier pipeline

use crate::config::{GridConfig, TrainingConfig};
use crate::discretize::{BinEncoder, TreeDiscretiser};
use crate::encoding::{classify_column, FeatureFrame};
use crate::error::{ChurnError, Result};
use crate::forest::{ForestParams, RandomForest};
use crate::logistic::{LogisticModel, LogisticParams};
use crate::search::{GridSearch, SearchOutcome};
use clap::ValueEnum;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Impurity measure for tree splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

/// Coefficient penalty for the logistic candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    #[serde(alias = "l1")]
    L1,
    #[serde(alias = "l2")]
    L2,
}

/// The two compared classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CandidateKind {
    Forest,
    Logistic,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Forest => write!(f, "random forest"),
            CandidateKind::Logistic => write!(f, "logistic regression"),
        }
    }
}

/// One point of a hyperparameter grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ClassifierParams {
    Forest(ForestParams),
    Logistic(LogisticParams),
}

impl ClassifierParams {
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<Classifier> {
        match self {
            ClassifierParams::Forest(params) => RandomForest::fit(*params, x, y).map(Classifier::Forest),
            ClassifierParams::Logistic(params) => LogisticModel::fit(*params, x, y).map(Classifier::Logistic),
        }
    }
}

impl fmt::Display for ClassifierParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierParams::Forest(p) => write!(
                f,
                "forest(trees={}, min_samples_leaf={}, criterion={:?})",
                p.n_trees, p.min_samples_leaf, p.criterion
            ),
            ClassifierParams::Logistic(p) => write!(f, "logistic(penalty={:?}, C={})", p.penalty, p.c),
        }
    }
}

/// A fitted classifier over the binned design matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Classifier {
    Forest(RandomForest),
    Logistic(LogisticModel),
}

impl Classifier {
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Classifier::Forest(model) => model.predict_proba(x),
            Classifier::Logistic(model) => model.predict_proba(x),
        }
    }
}

/// Anything that turns an aligned feature frame into churn probabilities
pub trait ChurnModel {
    /// Columns, in order, that `predict_proba` accepts
    fn input_columns(&self) -> &[String];

    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Array1<f64>>;
}

/// Discretiser, bin one-hot encoder and classifier, fitted together on train
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnPipeline {
    input_columns: Vec<String>,
    discretiser: TreeDiscretiser,
    encoder: BinEncoder,
    classifier: Classifier,
}

impl ChurnPipeline {
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn discretiser(&self) -> &TreeDiscretiser {
        &self.discretiser
    }

    /// Binned and expanded design matrix the classifier sees
    pub fn design_frame(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        if frame.columns != self.input_columns {
            return Err(ChurnError::Schema(format!(
                "pipeline expects columns {:?}, got {:?}",
                self.input_columns, frame.columns
            )));
        }
        let binned = self.discretiser.transform(frame)?;
        self.encoder.transform(&binned)
    }

    pub fn predict(&self, frame: &FeatureFrame) -> Result<Array1<usize>> {
        let proba = ChurnModel::predict_proba(self, frame)?;
        Ok(proba.mapv(|p| usize::from(p > crate::metrics::DECISION_THRESHOLD)))
    }

    /// Logistic coefficients by design column, largest magnitude first
    pub fn coefficients(&self) -> Option<Vec<(String, f64)>> {
        match &self.classifier {
            Classifier::Logistic(model) => {
                let mut pairs: Vec<(String, f64)> = self
                    .encoder
                    .output_columns()
                    .into_iter()
                    .zip(model.coefficients.iter().copied())
                    .collect();
                pairs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
                Some(pairs)
            }
            Classifier::Forest(_) => None,
        }
    }

    /// Forest importances keyed by encoded column, largest first
    pub fn importances(&self) -> Option<Vec<(String, f64)>> {
        match &self.classifier {
            Classifier::Forest(forest) => {
                let mut pairs: Vec<(String, f64)> = self
                    .encoder
                    .output_columns()
                    .into_iter()
                    .zip(forest.feature_importance())
                    .collect();
                pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
                Some(pairs)
            }
            Classifier::Logistic(_) => None,
        }
    }
}

impl ChurnModel for ChurnPipeline {
    fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Array1<f64>> {
        let design = self.design_frame(frame)?;
        self.classifier.predict_proba(&design.values)
    }
}

/// A tuned and refitted candidate
#[derive(Debug, Clone)]
pub struct TrainedCandidate {
    pub kind: CandidateKind,
    pub pipeline: ChurnPipeline,
    pub search: SearchOutcome,
}

/// Fits the binning stage and grid-searches a classifier on top of it
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    grid: GridConfig,
    seed: u64,
    cv_folds: usize,
    discretiser_depths: Vec<usize>,
}

impl ModelTrainer {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            grid: config.grid.clone(),
            seed: config.seed,
            cv_folds: config.cv_folds,
            discretiser_depths: config.discretiser_depths.clone(),
        }
    }

    /// Every parameter set searched for `kind`, in grid order
    pub fn candidates(&self, kind: CandidateKind) -> Vec<ClassifierParams> {
        let grid = &self.grid;
        match kind {
            CandidateKind::Forest => {
                let mut candidates = Vec::new();
                for &min_samples_leaf in &grid.forest_min_samples_leaf {
                    for &n_trees in &grid.forest_tree_counts {
                        for &criterion in &grid.forest_criteria {
                            candidates.push(ClassifierParams::Forest(ForestParams {
                                n_trees,
                                min_samples_leaf,
                                criterion,
                                seed: self.seed,
                            }));
                        }
                    }
                }
                candidates
            }
            CandidateKind::Logistic => {
                let mut candidates = Vec::new();
                for &penalty in &grid.logistic_penalties {
                    for &c in &grid.logistic_c {
                        candidates.push(ClassifierParams::Logistic(LogisticParams {
                            penalty,
                            c,
                            max_iter: grid.logistic_max_iter,
                            tol: 1e-4,
                        }));
                    }
                }
                candidates
            }
        }
    }

    /// Fit the binning stage, search the grid, refit the best classifier on all of `frame`
    ///
    /// # Arguments
    /// * `kind` - Classifier family to tune
    /// * `frame` - Selected training features
    /// * `labels` - Churn labels aligned with `frame` rows
    ///
    /// # Returns
    /// * The fitted pipeline with its search scores
    pub fn train(&self, kind: CandidateKind, frame: &FeatureFrame, labels: &Array1<usize>) -> Result<TrainedCandidate> {
        let continuous: Vec<String> = frame
            .columns
            .iter()
            .filter(|name| classify_column(name).map_or(false, |kind| kind.is_continuous()))
            .cloned()
            .collect();

        let discretiser = TreeDiscretiser::fit(frame, labels, &continuous, &self.discretiser_depths, self.cv_folds)?;
        let binned = discretiser.transform(frame)?;
        let encoder = BinEncoder::fit(&binned, &continuous)?;
        let design = encoder.transform(&binned)?;

        info!(
            candidate = %kind,
            discretised = continuous.len(),
            design_columns = design.ncols(),
            "Training candidate"
        );

        let search = GridSearch::new(self.candidates(kind), self.cv_folds).run(&design.values, labels)?;
        let classifier = search.best.fit(&design.values, labels)?;

        Ok(TrainedCandidate {
            kind,
            pipeline: ChurnPipeline {
                input_columns: frame.columns.clone(),
                discretiser,
                encoder,
                classifier,
            },
            search,
        })
    }
}
