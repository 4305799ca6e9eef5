//! Application context shared by the scoring commands

use crate::artifact::ModelArtifact;
use crate::data::{load_active_customers, CustomerProfile};
use crate::error::Result;
use crate::inference::{InferenceRunner, ScoredCustomer, SimulationResult};
use crate::model::ChurnPipeline;
use std::path::{Path, PathBuf};

/// Loaded artifact plus the dataset location, built once and passed by reference
#[derive(Debug, Clone)]
pub struct AppContext {
    pub artifact: ModelArtifact,
    pub dataset: PathBuf,
}

impl AppContext {
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(artifact_path: P, dataset: Q) -> Result<Self> {
        Ok(Self {
            artifact: ModelArtifact::load(artifact_path)?,
            dataset: dataset.as_ref().to_path_buf(),
        })
    }

    pub fn runner(&self) -> InferenceRunner<'_, ChurnPipeline> {
        InferenceRunner::new(&self.artifact.model, &self.artifact.features)
    }

    /// Score every active customer of the dataset
    pub fn score_active_customers(&self) -> Result<Vec<ScoredCustomer>> {
        let records = load_active_customers(&self.dataset)?;
        self.runner().score_batch(&records)
    }

    pub fn simulate(&self, profile: &CustomerProfile) -> Result<SimulationResult> {
        self.runner().simulate(profile)
    }
}
