//! ChurnForge: e-commerce customer churn scoring
//!
//! This library engineers ratio features from customer records, selects and
//! discretises them with decision trees, tunes a random forest and a penalised
//! logistic regression by cross-validated ROC-AUC, and turns churn
//! probabilities into retention actions.

pub mod app;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod data;
pub mod discretize;
pub mod encoding;
pub mod error;
pub mod features;
pub mod forest;
pub mod impute;
pub mod inference;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod profile;
pub mod search;
pub mod selection;
pub mod training;
pub mod viz;

// Re-export public items for easier access
pub use app::AppContext;
pub use artifact::ModelArtifact;
pub use cli::Args;
pub use config::AppConfig;
pub use data::{load_active_customers, load_customers, CustomerProfile, CustomerRecord};
pub use encoding::{CategoricalEncoder, FeatureFrame, FeatureTemplate};
pub use error::{ChurnError, Result};
pub use features::FeatureDeriver;
pub use impute::MedianImputer;
pub use inference::{InferenceRunner, RecommendedAction, RiskLevel, ScoredCustomer};
pub use model::{CandidateKind, ChurnModel, ChurnPipeline, ModelTrainer};
pub use training::{run_training, TrainingReport};
