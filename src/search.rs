//! Stratified k-fold splitting and exhaustive ROC-AUC grid search

use crate::error::{ChurnError, Result};
use crate::metrics::roc_auc;
use crate::model::ClassifierParams;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Stratified k-fold without shuffling: the i-th sample of each class goes to fold `i % k`
pub fn stratified_folds(labels: &Array1<usize>, n_splits: usize) -> Result<Vec<Fold>> {
    if n_splits < 2 {
        return Err(ChurnError::Config(format!("need at least 2 folds, got {}", n_splits)));
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    for class in [0usize, 1] {
        let members = labels.iter().enumerate().filter(|(_, &label)| label == class);
        for (i, (idx, _)) in members.enumerate() {
            folds[i % n_splits].push(idx);
        }
    }

    if folds.iter().any(|fold| fold.is_empty()) {
        return Err(ChurnError::Computation(format!(
            "{} samples are too few for {} folds",
            labels.len(),
            n_splits
        )));
    }

    let splits = (0..n_splits)
        .map(|fold_idx| {
            let mut test_indices = folds[fold_idx].clone();
            test_indices.sort_unstable();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();
            train_indices.sort_unstable();
            Fold {
                train_indices,
                test_indices,
            }
        })
        .collect();

    Ok(splits)
}

/// Mean cross-validated ROC-AUC of one parameter set
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub params: ClassifierParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: ClassifierParams,
    pub best_score: f64,
    pub scores: Vec<CandidateScore>,
}

/// Exhaustive grid search over classifier parameter sets
pub struct GridSearch {
    candidates: Vec<ClassifierParams>,
    n_splits: usize,
}

impl GridSearch {
    pub fn new(candidates: Vec<ClassifierParams>, n_splits: usize) -> Self {
        Self { candidates, n_splits }
    }

    /// Score every candidate on every fold; ties go to the earlier candidate
    pub fn run(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<SearchOutcome> {
        if self.candidates.is_empty() {
            return Err(ChurnError::Config("grid search has no candidates".to_string()));
        }

        let folds = stratified_folds(y, self.n_splits)?;
        info!(
            candidates = self.candidates.len(),
            folds = folds.len(),
            fits = self.candidates.len() * folds.len(),
            "Starting grid search"
        );

        let jobs: Vec<(usize, &Fold)> = (0..self.candidates.len())
            .flat_map(|c| folds.iter().map(move |fold| (c, fold)))
            .collect();

        let fold_scores = jobs
            .par_iter()
            .map(|(c, fold)| score_fold(&self.candidates[*c], x, y, fold))
            .collect::<Result<Vec<f64>>>()?;

        let scores: Vec<CandidateScore> = self
            .candidates
            .iter()
            .zip(fold_scores.chunks(folds.len()))
            .map(|(params, chunk)| CandidateScore {
                params: params.clone(),
                fold_scores: chunk.to_vec(),
                mean_score: chunk.iter().sum::<f64>() / chunk.len() as f64,
            })
            .collect();

        let mut best_idx = 0;
        for (idx, score) in scores.iter().enumerate() {
            debug!(params = %score.params, auc = score.mean_score, "Candidate scored");
            if score.mean_score > scores[best_idx].mean_score {
                best_idx = idx;
            }
        }

        let best = scores[best_idx].params.clone();
        let best_score = scores[best_idx].mean_score;
        info!(best = %best, auc = best_score, "Grid search finished");

        Ok(SearchOutcome {
            best,
            best_score,
            scores,
        })
    }
}

fn score_fold(params: &ClassifierParams, x: &Array2<f64>, y: &Array1<usize>, fold: &Fold) -> Result<f64> {
    let x_train = x.select(Axis(0), &fold.train_indices);
    let y_train = y.select(Axis(0), &fold.train_indices);
    let x_test = x.select(Axis(0), &fold.test_indices);
    let y_test = y.select(Axis(0), &fold.test_indices);

    let classifier = params.fit(&x_train, &y_train)?;
    let proba = classifier.predict_proba(&x_test)?;
    roc_auc(&y_test, &proba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistic::LogisticParams;
    use crate::model::Penalty;
    use ndarray::array;

    #[test]
    fn test_stratified_folds_balance_classes() {
        let y = array![0, 0, 0, 0, 0, 0, 1, 1, 1];
        let folds = stratified_folds(&y, 3).unwrap();

        assert_eq!(folds.len(), 3);
        for fold in &folds {
            let positives = fold.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(positives, 1);
            assert_eq!(fold.test_indices.len(), 3);
            assert_eq!(fold.train_indices.len(), 6);
        }

        let mut all_test: Vec<usize> = folds.iter().flat_map(|f| f.test_indices.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_few_samples() {
        let y = array![0, 1];
        assert!(stratified_folds(&y, 3).is_err());
        assert!(stratified_folds(&y, 1).is_err());
    }

    #[test]
    fn test_grid_search_prefers_first_on_ties() {
        // Heavy L1 zeroes every coefficient, so both candidates score 0.5
        let x = array![[0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0]];
        let y = array![0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let candidate = |c: f64| {
            ClassifierParams::Logistic(LogisticParams {
                penalty: Penalty::L1,
                c,
                max_iter: 100,
                tol: 1e-8,
            })
        };

        let outcome = GridSearch::new(vec![candidate(1e-4), candidate(2e-4)], 3)
            .run(&x, &y)
            .unwrap();
        assert_eq!(outcome.scores.len(), 2);
        assert_eq!(outcome.best_score, 0.5);
        assert_eq!(outcome.best, candidate(1e-4));
    }

    #[test]
    fn test_grid_search_picks_informative_candidate() {
        let x = array![[0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0], [0.0], [1.0]];
        let y = array![0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let candidate = |c: f64| {
            ClassifierParams::Logistic(LogisticParams {
                penalty: Penalty::L1,
                c,
                max_iter: 200,
                tol: 1e-8,
            })
        };

        let outcome = GridSearch::new(vec![candidate(1e-4), candidate(10.0)], 3)
            .run(&x, &y)
            .unwrap();
        assert_eq!(outcome.best, candidate(10.0));
        assert_eq!(outcome.best_score, 1.0);
    }
}
