//! The persisted `{model, features}` bundle

use crate::encoding::FeatureTemplate;
use crate::error::{ChurnError, Result};
use crate::model::{ChurnModel, ChurnPipeline};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Fitted pipeline plus the template of the selected features it consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelArtifact {
    pub model: ChurnPipeline,
    pub features: FeatureTemplate,
}

impl ModelArtifact {
    pub fn new(model: ChurnPipeline, features: FeatureTemplate) -> Result<Self> {
        let artifact = Self { model, features };
        artifact.check_contract()?;
        Ok(artifact)
    }

    /// Template must be valid and list exactly the pipeline's input columns
    pub fn check_contract(&self) -> Result<()> {
        self.features
            .validate()
            .map_err(|e| ChurnError::ArtifactLoad(format!("invalid feature template: {}", e)))?;

        let expected = self.features.names();
        if self.model.input_columns() != expected.as_slice() {
            return Err(ChurnError::ArtifactLoad(format!(
                "pipeline columns {:?} do not match template columns {:?}",
                self.model.input_columns(),
                expected
            )));
        }
        Ok(())
    }

    /// Write the artifact atomically: temp file in the target directory, then rename
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.check_contract()?;
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_vec(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ChurnError::Io(e.error))?;

        info!(path = %path.display(), bytes = json.len(), columns = self.features.len(), "Model artifact saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ChurnError::ArtifactLoad(format!("cannot read {}: {}", path.display(), e)))?;

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| ChurnError::ArtifactLoad(format!("malformed artifact {}: {}", path.display(), e)))?;
        artifact.check_contract()?;

        info!(path = %path.display(), columns = artifact.features.len(), "Model artifact loaded");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = ModelArtifact::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ChurnError::ArtifactLoad(_))));
    }

    #[test]
    fn test_load_rejects_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"features": {"version": 1, "columns": [], "vocabulary": {}}}"#).unwrap();

        let result = ModelArtifact::load(&path);
        assert!(matches!(result, Err(ChurnError::ArtifactLoad(_))));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(ModelArtifact::load(&path), Err(ChurnError::ArtifactLoad(_))));
    }
}
