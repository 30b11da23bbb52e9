//! Atlas Valuer Library
//!
//! Per-square-meter price estimation for Moroccan properties. This module
//! exposes the training pipeline, the model store, and the inference
//! orchestrator for testing and reuse.

pub mod config;
pub mod dataset;
pub mod market;
pub mod ml;
pub mod predict;
pub mod pricing;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use dataset::{Dataset, DatasetError};
pub use market::{CityMarketProfile, CoverageError, MarketData};
pub use ml::{
    BoostParams, FittedPipeline, ModelStore, PersistedModel, PropertyRecord, PropertyType,
    TrainingError, TrainingExample, TrainingOptions, TrainingReport, train_property_model,
};
pub use predict::{InputSummary, PredictError, PredictionResult, Predictor};
pub use pricing::{PriceBreakdown, market_adjusted};
pub use traits::{MockPricer, SqmPricer};
