//! Training dataset loading and per-type projection.
//!
//! The CSV is read leniently: empty cells are missing values, missing
//! numeric/boolean columns back-fill the feature-contract defaults, and rows
//! without a price for the requested property type are excluded from that
//! type's training set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::info;

use crate::market::normalize_city;
use crate::ml::features::{PropertyRecord, PropertyType};
use crate::ml::training::TrainingExample;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One raw CSV row; every cell is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListing {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub size_sqm: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub bedrooms: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub bathrooms: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub property_age: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub floor_level: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub has_parking: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub has_garden: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub has_pool: Option<bool>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub apartment_price_sqm: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub villa_price_sqm: Option<f64>,
}

impl RawListing {
    /// Project onto the feature contract, back-filling defaults so training
    /// and serving see the same schema.
    fn record(&self) -> PropertyRecord {
        PropertyRecord {
            size_sqm: self.size_sqm.unwrap_or(0.0),
            bedrooms: self.bedrooms.unwrap_or(0),
            bathrooms: self.bathrooms.unwrap_or(0),
            property_age: self.property_age.unwrap_or(0),
            floor_level: self.floor_level.unwrap_or(0),
            has_parking: self.has_parking.unwrap_or(false),
            has_garden: self.has_garden.unwrap_or(false),
            has_pool: self.has_pool.unwrap_or(false),
            city: normalize_city(self.city.as_deref().unwrap_or("")),
            neighborhood: normalize_city(self.neighborhood.as_deref().unwrap_or("")),
        }
    }

    /// The per-sqm price target for the given property type, if present.
    fn target_for(&self, property_type: PropertyType) -> Option<f64> {
        match property_type {
            PropertyType::Apartment => self.apartment_price_sqm,
            PropertyType::Villa => self.villa_price_sqm,
        }
        .filter(|v| v.is_finite())
    }
}

/// The loaded listings table, shared by both training runs.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    listings: Vec<RawListing>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let map_err = |source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(map_err)?;
        let mut listings = Vec::new();
        for row in reader.deserialize::<RawListing>() {
            listings.push(row.map_err(map_err)?);
        }

        info!(path = %path.display(), rows = listings.len(), "Loaded dataset");
        Ok(Self { listings })
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// The training set for one property type: rows with a present, finite
    /// target for that type.
    pub fn examples_for(&self, property_type: PropertyType) -> Vec<TrainingExample> {
        self.listings
            .iter()
            .filter_map(|listing| {
                listing.target_for(property_type).map(|price_per_sqm| TrainingExample {
                    record: listing.record(),
                    price_per_sqm,
                })
            })
            .collect()
    }
}

fn missing(cell: &str) -> bool {
    matches!(
        cell.to_lowercase().as_str(),
        "" | "na" | "nan" | "null" | "none"
    )
}

fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None => Ok(None),
        Some(cell) if missing(cell) => Ok(None),
        Some(cell) => cell
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {cell}"))),
    }
}

fn de_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    // Integer columns exported from float-typed frames arrive as "3.0".
    de_opt_f64(deserializer).map(|v| v.map(|f| f as i64))
}

fn de_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None => Ok(None),
        Some(cell) if missing(cell) => Ok(None),
        Some(cell) => match cell.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!("invalid boolean: {other}"))),
        },
    }
}
