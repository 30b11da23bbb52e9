//! Inference orchestrator: one end-to-end prediction per call.
//!
//! Every invocation terminates in exactly one of a `PredictionResult` or a
//! structured error with a distinguishing reason; nothing escapes the
//! orchestrator unformatted.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::market::{CoverageError, MarketData};
use crate::ml::features::{FeatureError, PropertyRecord, PropertyType};
use crate::ml::persistence::PersistenceError;
use crate::pricing::market_adjusted;
use crate::traits::SqmPricer;

/// Normalized echo of the request, attached to every successful result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSummary {
    pub size_sqm: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub city: String,
    pub neighborhood: String,
}

/// The success shape of one inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Total price before the index adjustment.
    pub original_price: f64,
    /// Total price after the index adjustment.
    pub predicted_price: f64,
    pub original_price_per_sqm: f64,
    pub price_per_sqm: f64,
    pub property_type: PropertyType,
    /// The applied market multiplier, e.g. 1.109.
    pub ipai_adjustment: f64,
    pub input_summary: InputSummary,
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid JSON input: {message}")]
    InvalidJson { message: String, input: String },
    #[error("Invalid property type")]
    InvalidPropertyType,
    #[error(transparent)]
    Input(#[from] FeatureError),
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    #[error("Failed to load models")]
    ModelLoad(#[from] PersistenceError),
}

impl PredictError {
    /// The uniform boundary shape: `{"error": reason}` plus diagnostic
    /// detail where one exists.
    pub fn to_json(&self) -> Value {
        let mut body = json!({ "error": self.to_string() });
        match self {
            Self::InvalidJson { input, .. } => {
                body["input_received"] = json!(input);
            }
            Self::ModelLoad(source) => {
                body["detail"] = json!(source.to_string());
            }
            _ => {}
        }
        body
    }
}

/// Coordinates one prediction: feature projection, availability gate, model
/// selection, price adjustment.
pub struct Predictor<'a, P> {
    apartment: &'a P,
    villa: &'a P,
    market: &'a MarketData,
}

impl<'a, P: SqmPricer> Predictor<'a, P> {
    pub fn new(apartment: &'a P, villa: &'a P, market: &'a MarketData) -> Self {
        Self {
            apartment,
            villa,
            market,
        }
    }

    /// Run one prediction from a raw JSON payload. The returned value is
    /// exactly one of the result shape or the error shape.
    pub fn predict_json(&self, raw: &str) -> Value {
        match self.predict_str(raw) {
            Ok(result) => serde_json::to_value(&result)
                .unwrap_or_else(|e| json!({ "error": format!("Unexpected error: {e}") })),
            Err(err) => err.to_json(),
        }
    }

    /// Parse the payload, tolerating a BOM and stray surrounding quotes.
    pub fn predict_str(&self, raw: &str) -> Result<PredictionResult, PredictError> {
        let cleaned = raw
            .trim_start_matches('\u{feff}')
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        let data: Value =
            serde_json::from_str(cleaned).map_err(|e| PredictError::InvalidJson {
                message: e.to_string(),
                input: raw.to_string(),
            })?;
        self.predict(&data)
    }

    pub fn predict(&self, data: &Value) -> Result<PredictionResult, PredictError> {
        let record = PropertyRecord::from_json(data)?;

        let type_raw = data
            .get("property_type")
            .and_then(Value::as_str)
            .unwrap_or("");
        let property_type =
            PropertyType::parse(type_raw).ok_or(PredictError::InvalidPropertyType)?;

        // The gate must short-circuit before any model is consulted.
        self.market.check(&record.city, property_type)?;

        let pricer = match property_type {
            PropertyType::Apartment => self.apartment,
            PropertyType::Villa => self.villa,
        };
        let raw_per_sqm = pricer.price_per_sqm(&record);
        debug!(%property_type, city = %record.city, raw_per_sqm, "Raw model prediction");

        let breakdown =
            market_adjusted(self.market, &record.city, raw_per_sqm, record.size_sqm);

        Ok(PredictionResult {
            original_price: breakdown.raw_total,
            predicted_price: breakdown.adjusted_total,
            original_price_per_sqm: breakdown.raw_price_per_sqm,
            price_per_sqm: breakdown.adjusted_price_per_sqm,
            property_type,
            ipai_adjustment: breakdown.adjustment_factor,
            input_summary: InputSummary {
                size_sqm: record.size_sqm,
                bedrooms: record.bedrooms,
                bathrooms: record.bathrooms,
                city: record.city,
                neighborhood: record.neighborhood,
            },
        })
    }
}
