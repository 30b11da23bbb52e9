//! Model persistence - save and load fitted pipelines.
//!
//! Each property type is one opaque `bincode` artifact holding the fitted
//! preprocessor, the tree ensemble, and the training report, loadable by an
//! inference process with no access to the training data.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::PropertyType;
use super::model::FittedPipeline;
use super::training::{TrainedModel, TrainingReport};

/// Artifact file name for a property type, mirroring the per-type naming of
/// the serving layer.
pub fn artifact_file_name(property_type: PropertyType) -> &'static str {
    match property_type {
        PropertyType::Apartment => "apartment_model.bin",
        PropertyType::Villa => "villa_model.bin",
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Model file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Model version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Artifact {path} holds a {found} model, expected {expected}")]
    WrongPropertyType {
        path: PathBuf,
        expected: PropertyType,
        found: PropertyType,
    },
}

/// Versioned on-disk envelope around one fitted pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel {
    /// Version for backward compatibility.
    pub version: u32,
    /// When the model was trained.
    pub created_at: DateTime<Utc>,
    /// Held-out evaluation metrics recorded at training time.
    pub report: TrainingReport,
    /// The fitted preprocessing + regression unit.
    pub pipeline: FittedPipeline,
}

impl PersistedModel {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(trained: TrainedModel) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            created_at: Utc::now(),
            report: trained.report,
            pipeline: trained.pipeline,
        }
    }

    /// Save to a file using bincode, creating parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes =
            bincode::serialize(self).map_err(|e| PersistenceError::Serialize(e.to_string()))?;
        fs::write(path, bytes).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from a file, checking the artifact version.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Err(PersistenceError::FileNotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = bincode::deserialize(&bytes)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

        if model.version > Self::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: model.version,
            });
        }

        Ok(model)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} model v{}: {} samples, rmse={:.2}, r2={:.4}, created {}",
            self.pipeline.property_type,
            self.version,
            self.report.samples,
            self.report.rmse,
            self.report.r2,
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// The two named model slots, loaded once and read-only afterwards.
///
/// Apartment and villa pipelines never share parameters; the store is the
/// registry that owns both for the lifetime of the process.
#[derive(Debug)]
pub struct ModelStore {
    pub apartment: PersistedModel,
    pub villa: PersistedModel,
}

impl ModelStore {
    /// Load both artifacts from the models directory.
    pub fn load(dir: &Path) -> Result<Self, PersistenceError> {
        Ok(Self {
            apartment: Self::load_slot(dir, PropertyType::Apartment)?,
            villa: Self::load_slot(dir, PropertyType::Villa)?,
        })
    }

    fn load_slot(dir: &Path, property_type: PropertyType) -> Result<PersistedModel, PersistenceError> {
        let path = dir.join(artifact_file_name(property_type));
        let model = PersistedModel::load(&path)?;
        if model.pipeline.property_type != property_type {
            return Err(PersistenceError::WrongPropertyType {
                path,
                expected: property_type,
                found: model.pipeline.property_type,
            });
        }
        Ok(model)
    }

    /// Persist both artifacts into the models directory.
    pub fn save(&self, dir: &Path) -> Result<(), PersistenceError> {
        self.apartment
            .save(&dir.join(artifact_file_name(PropertyType::Apartment)))?;
        self.villa
            .save(&dir.join(artifact_file_name(PropertyType::Villa)))
    }

    pub fn pipeline(&self, property_type: PropertyType) -> &FittedPipeline {
        match property_type {
            PropertyType::Apartment => &self.apartment.pipeline,
            PropertyType::Villa => &self.villa.pipeline,
        }
    }
}
