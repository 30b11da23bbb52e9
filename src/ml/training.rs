//! Training pipeline: split, fit, evaluate, report.

use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::features::{PropertyRecord, PropertyType};
use super::gbdt::{BoostError, BoostParams, GradientBoostedTrees};
use super::model::{FittedPipeline, r2_score, rmse};
use super::preprocess::{PreprocessError, Preprocessor};

/// One labeled training row: a record plus its per-sqm price target.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub record: PropertyRecord,
    pub price_per_sqm: f64,
}

/// Training configuration. The boosting hyperparameters and the split are
/// fixed by design and share one seed; evaluation uses a held-out fifth of
/// the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub boost: BoostParams,
    pub test_fraction: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            boost: BoostParams::default(),
            test_fraction: 0.2,
        }
    }
}

/// Held-out evaluation metrics for one fitted pipeline. Reported, never fed
/// back into a tuning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub property_type: PropertyType,
    pub samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub rmse: f64,
    pub r2: f64,
}

/// A fitted pipeline together with its evaluation report.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pipeline: FittedPipeline,
    pub report: TrainingReport,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("No {0} training rows remain after filtering missing targets")]
    EmptyTrainingSet(PropertyType),
    #[error("Insufficient data to train the {property_type} model: {samples} samples")]
    InsufficientData {
        property_type: PropertyType,
        samples: usize,
    },
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Boost(#[from] BoostError),
}

/// Train one property-type pipeline end to end: deterministic 80/20 split,
/// preprocessing fitted on the training split only, boosted trees on the
/// transformed matrix, metrics on the held-out split.
pub fn train_property_model(
    examples: &[TrainingExample],
    property_type: PropertyType,
    options: &TrainingOptions,
) -> Result<TrainedModel, TrainingError> {
    if examples.is_empty() {
        return Err(TrainingError::EmptyTrainingSet(property_type));
    }

    let n = examples.len();
    let test_len = ((n as f64) * options.test_fraction).ceil() as usize;
    let train_len = n - test_len;
    if train_len == 0 {
        return Err(TrainingError::InsufficientData {
            property_type,
            samples: n,
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(options.boost.seed);
    indices.shuffle(&mut rng);
    let (train_idx, test_idx) = indices.split_at(train_len);

    let train_records: Vec<PropertyRecord> =
        train_idx.iter().map(|&i| examples[i].record.clone()).collect();
    let train_targets: Vec<f64> = train_idx.iter().map(|&i| examples[i].price_per_sqm).collect();
    let test_records: Vec<PropertyRecord> =
        test_idx.iter().map(|&i| examples[i].record.clone()).collect();
    let test_targets = Array1::from_iter(test_idx.iter().map(|&i| examples[i].price_per_sqm));

    info!(
        property_type = %property_type,
        samples = n,
        train = train_len,
        test = test_len,
        "Training model"
    );

    let preprocessor = Preprocessor::fit(&train_records, &train_targets)?;
    let x_train = preprocessor.transform(&train_records);
    let y_train = Array1::from_vec(train_targets);

    let model = GradientBoostedTrees::fit(x_train.view(), y_train.view(), &options.boost)?;
    let pipeline = FittedPipeline::new(property_type, preprocessor, model);

    let predictions = Array1::from_vec(pipeline.predict(&test_records));
    let report = TrainingReport {
        property_type,
        samples: n,
        train_samples: train_len,
        test_samples: test_len,
        rmse: rmse(predictions.view(), test_targets.view()),
        r2: r2_score(predictions.view(), test_targets.view()),
    };

    info!(
        property_type = %property_type,
        rmse = report.rmse,
        r2 = report.r2,
        "Model evaluation"
    );

    Ok(TrainedModel { pipeline, report })
}
