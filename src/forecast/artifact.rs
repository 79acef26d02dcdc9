use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::forecast::model::{FeatureScaler, Regressor, RegressorSpec, ScalerSpec};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error(
        "model artifact '{}' was not found, train and save the model first",
        .0.display()
    )]
    Missing(PathBuf),
    #[error("failed to read model artifact '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("model artifact '{}' is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Descriptive fields stored alongside the model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

/// On-disk layout of the artifact file
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    model: RegressorSpec,
    scaler: ScalerSpec,
    #[serde(default)]
    metadata: Option<ModelMetadata>,
}

/// Read-only model and scaler pair shared by every request
#[derive(Clone)]
pub struct PredictionArtifact {
    model: Arc<dyn Regressor>,
    scaler: Arc<dyn FeatureScaler>,
    metadata: Option<ModelMetadata>,
}

impl PredictionArtifact {
    pub fn new(model: Arc<dyn Regressor>, scaler: Arc<dyn FeatureScaler>) -> Self {
        Self {
            model,
            scaler,
            metadata: None,
        }
    }

    /// Load the artifact from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::Missing(path.to_path_buf())
            } else {
                ArtifactError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Self::from_json(&raw).map_err(|source| ArtifactError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: ArtifactFile = serde_json::from_str(raw)?;
        let mut artifact = Self::new(Arc::new(file.model), Arc::new(file.scaler));
        artifact.metadata = file.metadata;
        Ok(artifact)
    }

    pub fn model(&self) -> &dyn Regressor {
        self.model.as_ref()
    }

    pub fn scaler(&self) -> &dyn FeatureScaler {
        self.scaler.as_ref()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }
}

impl std::fmt::Debug for PredictionArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionArtifact")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
