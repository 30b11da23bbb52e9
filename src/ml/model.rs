//! The fitted pipeline: preprocessing and regression bundled as one unit.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::features::{PropertyRecord, PropertyType};
use super::gbdt::GradientBoostedTrees;
use super::preprocess::Preprocessor;

/// A trained preprocessing + regression unit for one property type.
///
/// Immutable once trained; holds every learned parameter needed to map a raw
/// record to a per-sqm price without access to the training data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub property_type: PropertyType,
    preprocessor: Preprocessor,
    model: GradientBoostedTrees,
}

impl FittedPipeline {
    pub fn new(
        property_type: PropertyType,
        preprocessor: Preprocessor,
        model: GradientBoostedTrees,
    ) -> Self {
        Self {
            property_type,
            preprocessor,
            model,
        }
    }

    /// Predict the raw per-sqm price for a single record.
    pub fn predict_one(&self, record: &PropertyRecord) -> f64 {
        let matrix = self.preprocessor.transform(std::slice::from_ref(record));
        self.model.predict_row(matrix.row(0))
    }

    /// Predict raw per-sqm prices for a batch of records.
    pub fn predict(&self, records: &[PropertyRecord]) -> Vec<f64> {
        let matrix = self.preprocessor.transform(records);
        matrix
            .rows()
            .into_iter()
            .map(|row| self.model.predict_row(row))
            .collect()
    }
}

/// Root mean squared error.
pub fn rmse(predictions: ArrayView1<'_, f64>, targets: ArrayView1<'_, f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return f64::MAX;
    }
    let sum_sq: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    (sum_sq / predictions.len() as f64).sqrt()
}

/// Coefficient of determination; defined as 0 when the targets are constant.
pub fn r2_score(predictions: ArrayView1<'_, f64>, targets: ArrayView1<'_, f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return 0.0;
    }
    let mean = targets.sum() / targets.len() as f64;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot < 1e-12 {
        return 0.0;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}
