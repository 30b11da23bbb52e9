//! Machine learning module for per-sqm price estimation.
//!
//! Two independent gradient-boosted pipelines (apartment, villa) are trained
//! offline, persisted as opaque artifacts, and loaded read-only at inference
//! time.

pub mod features;
pub mod gbdt;
pub mod model;
pub mod persistence;
pub mod preprocess;
pub mod training;

pub use features::{FeatureError, PropertyRecord, PropertyType};
pub use gbdt::{BoostError, BoostParams, GradientBoostedTrees};
pub use model::FittedPipeline;
pub use persistence::{ModelStore, PersistedModel, PersistenceError};
pub use preprocess::{PreprocessError, Preprocessor};
pub use training::{
    TrainedModel, TrainingError, TrainingExample, TrainingOptions, TrainingReport,
    train_property_model,
};
