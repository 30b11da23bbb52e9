//! Feature contract for price prediction.
//!
//! Defines the canonical input schema shared by training and inference:
//! which fields exist, their defaults when absent, and how loosely typed
//! inference input is coerced. Missing fields default (zero / false / empty
//! string); malformed values are an error at inference time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::market::normalize_city;

/// Numeric feature columns, in the fixed order the preprocessor emits them.
pub const NUMERIC_FEATURES: [&str; 8] = [
    "size_sqm",
    "bedrooms",
    "bathrooms",
    "property_age",
    "floor_level",
    "has_parking",
    "has_garden",
    "has_pool",
];

/// Categorical feature columns, appended after the numeric group.
pub const CATEGORICAL_FEATURES: [&str; 2] = ["city", "neighborhood"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    Villa,
}

impl PropertyType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "apartment" => Some(Self::Apartment),
            "villa" => Some(Self::Villa),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::Villa => "villa",
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field that could not be coerced to the declared feature type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("Field '{field}' is not a boolean: {value}")]
    NotBoolean { field: &'static str, value: String },
}

/// One property, training row or inference request alike.
///
/// City and neighborhood are stored normalized (trimmed, lowercased) so the
/// target encoder sees the same keys at fit and transform time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub size_sqm: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub property_age: i64,
    pub floor_level: i64,
    pub has_parking: bool,
    pub has_garden: bool,
    pub has_pool: bool,
    pub city: String,
    pub neighborhood: String,
}

impl PropertyRecord {
    /// Build a record from a loosely typed JSON object, defaulting absent
    /// fields and failing on non-coercible ones.
    pub fn from_json(data: &Value) -> Result<Self, FeatureError> {
        Ok(Self {
            size_sqm: coerce_f64(data.get("size_sqm"), "size_sqm")?,
            bedrooms: coerce_i64(data.get("bedrooms"), "bedrooms")?,
            bathrooms: coerce_i64(data.get("bathrooms"), "bathrooms")?,
            property_age: coerce_i64(data.get("property_age"), "property_age")?,
            floor_level: coerce_i64(data.get("floor_level"), "floor_level")?,
            has_parking: coerce_bool(data.get("has_parking"), "has_parking")?,
            has_garden: coerce_bool(data.get("has_garden"), "has_garden")?,
            has_pool: coerce_bool(data.get("has_pool"), "has_pool")?,
            city: normalize_city(coerce_string(data.get("city")).as_str()),
            neighborhood: normalize_city(coerce_string(data.get("neighborhood")).as_str()),
        })
    }

    /// Numeric feature values in `NUMERIC_FEATURES` order; booleans as 0/1.
    pub fn numeric_values(&self) -> [f64; 8] {
        [
            self.size_sqm,
            self.bedrooms as f64,
            self.bathrooms as f64,
            self.property_age as f64,
            self.floor_level as f64,
            self.has_parking as u8 as f64,
            self.has_garden as u8 as f64,
            self.has_pool as u8 as f64,
        ]
    }

    /// Categorical feature values in `CATEGORICAL_FEATURES` order.
    pub fn categorical_values(&self) -> [&str; 2] {
        [self.city.as_str(), self.neighborhood.as_str()]
    }
}

fn coerce_f64(value: Option<&Value>, field: &'static str) -> Result<f64, FeatureError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| FeatureError::NotNumeric {
            field,
            value: n.to_string(),
        }),
        Some(Value::Bool(b)) => Ok(*b as u8 as f64),
        Some(Value::String(s)) => {
            s.trim().parse::<f64>().map_err(|_| FeatureError::NotNumeric {
                field,
                value: s.clone(),
            })
        }
        Some(other) => Err(FeatureError::NotNumeric {
            field,
            value: other.to_string(),
        }),
    }
}

fn coerce_i64(value: Option<&Value>, field: &'static str) -> Result<i64, FeatureError> {
    // Integer fields accept fractional input and truncate, as float-typed
    // form frontends routinely send e.g. 3.0 bedrooms.
    coerce_f64(value, field).map(|v| v as i64)
}

fn coerce_bool(value: Option<&Value>, field: &'static str) -> Result<bool, FeatureError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            _ => Err(FeatureError::NotBoolean {
                field,
                value: s.clone(),
            }),
        },
        Some(other) => Err(FeatureError::NotBoolean {
            field,
            value: other.to_string(),
        }),
    }
}

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
