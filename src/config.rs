//! Configuration management for training and scoring

use crate::error::{ChurnError, Result};
use crate::model::{Penalty, SplitCriterion};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File locations, overridable from the command line
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Customer CSV used for training and for the active-customer table
    pub dataset: PathBuf,
    /// Serialized `{model, features}` bundle
    pub artifact: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/ecommerce_churn.csv"),
            artifact: PathBuf::from("model_churn.json"),
        }
    }
}

/// Training flow parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    /// Share of in-time customers held out as the test partition
    pub test_fraction: f64,
    /// Tenure quantile at or below which customers form the out-of-time partition
    pub oot_quantile: f64,
    /// Cumulative tree importance below which features are kept
    pub importance_threshold: f64,
    pub cv_folds: usize,
    /// Candidate depths for the per-feature discretisation trees
    pub discretiser_depths: Vec<usize>,
    pub grid: GridConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            oot_quantile: 0.25,
            importance_threshold: 0.96,
            cv_folds: 3,
            discretiser_depths: vec![1, 2, 3, 4],
            grid: GridConfig::default(),
        }
    }
}

/// Hyperparameter grids searched for each candidate classifier
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    pub forest_min_samples_leaf: Vec<usize>,
    pub forest_tree_counts: Vec<usize>,
    pub forest_criteria: Vec<SplitCriterion>,
    pub logistic_penalties: Vec<Penalty>,
    pub logistic_c: Vec<f64>,
    pub logistic_max_iter: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            forest_min_samples_leaf: vec![15, 20, 25, 30, 50],
            forest_tree_counts: vec![100, 200, 500, 1000],
            forest_criteria: vec![SplitCriterion::Gini, SplitCriterion::Entropy],
            logistic_penalties: vec![Penalty::L1, Penalty::L2],
            logistic_c: vec![0.01, 0.1, 1.0, 10.0, 100.0],
            logistic_max_iter: 500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file; omitted keys keep their defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        let grid = &training.grid;

        if !(training.test_fraction > 0.0 && training.test_fraction < 1.0) {
            return Err(invalid("training.test_fraction must be in (0, 1)"));
        }
        if !(training.oot_quantile > 0.0 && training.oot_quantile < 1.0) {
            return Err(invalid("training.oot_quantile must be in (0, 1)"));
        }
        if !(training.importance_threshold > 0.0 && training.importance_threshold <= 1.0) {
            return Err(invalid("training.importance_threshold must be in (0, 1]"));
        }
        if training.cv_folds < 2 {
            return Err(invalid("training.cv_folds must be at least 2"));
        }
        if training.discretiser_depths.is_empty() || training.discretiser_depths.contains(&0) {
            return Err(invalid("training.discretiser_depths must be non-empty positive depths"));
        }
        if grid.forest_min_samples_leaf.is_empty()
            || grid.forest_tree_counts.is_empty()
            || grid.forest_criteria.is_empty()
        {
            return Err(invalid("forest grid must not be empty"));
        }
        if grid.forest_tree_counts.contains(&0) || grid.forest_min_samples_leaf.contains(&0) {
            return Err(invalid("forest tree counts and leaf sizes must be positive"));
        }
        if grid.logistic_penalties.is_empty() || grid.logistic_c.is_empty() {
            return Err(invalid("logistic grid must not be empty"));
        }
        if grid.logistic_c.iter().any(|c| !(*c > 0.0)) {
            return Err(invalid("logistic C values must be positive"));
        }
        if grid.logistic_max_iter == 0 {
            return Err(invalid("training.grid.logistic_max_iter must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ChurnError {
    ChurnError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.training.grid.forest_tree_counts, vec![100, 200, 500, 1000]);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[paths]").unwrap();
        writeln!(file, "artifact = \"out/model.json\"").unwrap();
        writeln!(file, "[training]").unwrap();
        writeln!(file, "seed = 7").unwrap();
        writeln!(file, "[training.grid]").unwrap();
        writeln!(file, "forest_criteria = [\"entropy\"]").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.paths.artifact, PathBuf::from("out/model.json"));
        assert_eq!(config.paths.dataset, PathBuf::from("data/ecommerce_churn.csv"));
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.training.grid.forest_criteria, vec![SplitCriterion::Entropy]);
        assert_eq!(config.training.grid.logistic_max_iter, 500);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let mut config = AppConfig::default();
        config.training.test_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ChurnError::Config(_))));
    }
}
