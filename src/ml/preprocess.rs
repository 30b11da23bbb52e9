//! Feature preprocessing fitted on the training split.
//!
//! Numeric columns are standardized, passed through a Yeo-Johnson power
//! transform (lambda fitted per column by maximizing the transform
//! log-likelihood), and standardized again. Categorical columns are target
//! encoded with additive smoothing; categories unseen at fit time encode to
//! the training global mean rather than failing.

use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{CATEGORICAL_FEATURES, NUMERIC_FEATURES, PropertyRecord};

/// Columns with variance below this are treated as constant.
const VARIANCE_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreprocessError {
    #[error("Cannot fit preprocessor on an empty training set")]
    EmptyTrainingSet,
    #[error("Row and target lengths mismatch: {rows} vs {targets}")]
    MismatchedLengths { rows: usize, targets: usize },
}

/// Per-column zero-mean / unit-variance scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for col in x.columns() {
            let m = col.sum() / n;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.push(m);
            // Constant columns pass through unscaled.
            scale.push(if var < VARIANCE_FLOOR { 1.0 } else { var.sqrt() });
        }

        Self { mean, scale }
    }

    pub fn transform(&self, x: &mut Array2<f64>) {
        for (j, mut col) in x.columns_mut().into_iter().enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
    }
}

/// Monotonic power transform of the Yeo-Johnson family, defined for zero and
/// negative inputs, standardized after transforming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerTransform {
    lambdas: Vec<f64>,
    post: StandardScaler,
}

impl PowerTransform {
    /// Fit lambdas on the already-scaled matrix and transform it in place.
    pub fn fit_transform(x: &mut Array2<f64>) -> Self {
        let lambdas: Vec<f64> = x
            .columns()
            .into_iter()
            .map(|col| fit_lambda(col.to_vec()))
            .collect();

        for (j, mut col) in x.columns_mut().into_iter().enumerate() {
            let lambda = lambdas[j];
            col.mapv_inplace(|v| yeo_johnson(v, lambda));
        }

        let post = StandardScaler::fit(x);
        post.transform(x);

        Self { lambdas, post }
    }

    pub fn transform(&self, x: &mut Array2<f64>) {
        for (j, mut col) in x.columns_mut().into_iter().enumerate() {
            let lambda = self.lambdas[j];
            col.mapv_inplace(|v| yeo_johnson(v, lambda));
        }
        self.post.transform(x);
    }
}

/// Yeo-Johnson transform of a single value.
pub fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    const EPS: f64 = 1e-12;
    if x >= 0.0 {
        if lambda.abs() > EPS {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        } else {
            (x + 1.0).ln()
        }
    } else if (lambda - 2.0).abs() > EPS {
        -(((-x + 1.0).powf(2.0 - lambda) - 1.0) / (2.0 - lambda))
    } else {
        -(-x + 1.0).ln()
    }
}

/// Profile log-likelihood of the Yeo-Johnson transform for one column.
fn yeo_johnson_llf(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&v| yeo_johnson(v, lambda)).collect();

    let mean = transformed.iter().sum::<f64>() / n;
    let var = transformed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var < VARIANCE_FLOOR || !var.is_finite() {
        return f64::NEG_INFINITY;
    }

    let jacobian: f64 = values
        .iter()
        .map(|&v| v.signum() * (v.abs() + 1.0).ln())
        .sum();

    -n / 2.0 * var.ln() + (lambda - 1.0) * jacobian
}

/// Maximize the profile log-likelihood: coarse bracket scan, then a
/// golden-section refinement. Degenerate columns keep the identity lambda.
fn fit_lambda(values: Vec<f64>) -> f64 {
    const LO: f64 = -4.0;
    const HI: f64 = 4.0;
    const STEPS: usize = 32;

    let mut best_lambda = 1.0;
    let mut best_llf = f64::NEG_INFINITY;
    for i in 0..=STEPS {
        let lambda = LO + (HI - LO) * i as f64 / STEPS as f64;
        let llf = yeo_johnson_llf(&values, lambda);
        if llf > best_llf {
            best_llf = llf;
            best_lambda = lambda;
        }
    }
    if best_llf == f64::NEG_INFINITY {
        return 1.0;
    }

    let step = (HI - LO) / STEPS as f64;
    let (mut a, mut b) = (best_lambda - step, best_lambda + step);
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    for _ in 0..64 {
        if yeo_johnson_llf(&values, c) > yeo_johnson_llf(&values, d) {
            b = d;
        } else {
            a = c;
        }
        c = b - inv_phi * (b - a);
        d = a + inv_phi * (b - a);
    }
    (a + b) / 2.0
}

/// Smoothed mean-target encoding for one categorical column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEncoder {
    global_mean: f64,
    encodings: HashMap<String, f64>,
}

impl TargetEncoder {
    /// Pseudo-count weight pulling sparse categories toward the global mean.
    const SMOOTHING: f64 = 10.0;

    pub fn fit<'a, I>(values: I, targets: &[f64]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let global_mean = if targets.is_empty() {
            0.0
        } else {
            targets.iter().sum::<f64>() / targets.len() as f64
        };

        let mut sums: HashMap<String, (f64, f64)> = HashMap::new();
        for (value, &target) in values.into_iter().zip(targets) {
            let entry = sums.entry(value.to_string()).or_insert((0.0, 0.0));
            entry.0 += target;
            entry.1 += 1.0;
        }

        let encodings = sums
            .into_iter()
            .map(|(category, (sum, count))| {
                let smoothed =
                    (sum + Self::SMOOTHING * global_mean) / (count + Self::SMOOTHING);
                (category, smoothed)
            })
            .collect();

        Self {
            global_mean,
            encodings,
        }
    }

    /// Unseen categories fall back to the training global mean; this is the
    /// encoder's normal contract, not an error path.
    pub fn encode(&self, value: &str) -> f64 {
        self.encodings.get(value).copied().unwrap_or(self.global_mean)
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }
}

/// The composed fit/transform unit: numeric scaling + power transform and
/// categorical target encoding, emitting one fixed-width row per record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    scaler: StandardScaler,
    power: PowerTransform,
    city: TargetEncoder,
    neighborhood: TargetEncoder,
}

impl Preprocessor {
    /// Output row width: numeric group then categorical group.
    pub const WIDTH: usize = NUMERIC_FEATURES.len() + CATEGORICAL_FEATURES.len();

    pub fn fit(records: &[PropertyRecord], targets: &[f64]) -> Result<Self, PreprocessError> {
        if records.is_empty() {
            return Err(PreprocessError::EmptyTrainingSet);
        }
        if records.len() != targets.len() {
            return Err(PreprocessError::MismatchedLengths {
                rows: records.len(),
                targets: targets.len(),
            });
        }

        let mut numeric = numeric_matrix(records);
        let scaler = StandardScaler::fit(&numeric);
        scaler.transform(&mut numeric);
        let power = PowerTransform::fit_transform(&mut numeric);

        let city = TargetEncoder::fit(records.iter().map(|r| r.city.as_str()), targets);
        let neighborhood =
            TargetEncoder::fit(records.iter().map(|r| r.neighborhood.as_str()), targets);

        Ok(Self {
            scaler,
            power,
            city,
            neighborhood,
        })
    }

    /// Map records to the fixed-width numeric representation. Never fails:
    /// coercion errors surface when the records are built, and unseen
    /// categories take the encoder fallback.
    pub fn transform(&self, records: &[PropertyRecord]) -> Array2<f64> {
        let mut numeric = numeric_matrix(records);
        self.scaler.transform(&mut numeric);
        self.power.transform(&mut numeric);

        let mut out = Array2::zeros((records.len(), Self::WIDTH));
        for (i, record) in records.iter().enumerate() {
            for j in 0..NUMERIC_FEATURES.len() {
                out[[i, j]] = numeric[[i, j]];
            }
            out[[i, NUMERIC_FEATURES.len()]] = self.city.encode(&record.city);
            out[[i, NUMERIC_FEATURES.len() + 1]] = self.neighborhood.encode(&record.neighborhood);
        }
        out
    }
}

fn numeric_matrix(records: &[PropertyRecord]) -> Array2<f64> {
    let flat: Vec<f64> = records.iter().flat_map(|r| r.numeric_values()).collect();
    Array2::from_shape_vec((records.len(), NUMERIC_FEATURES.len()), flat)
        .expect("record rows have a fixed width")
}
