//! Static market reference data for Moroccan cities.
//!
//! Three independent tables drive the serving-side checks: the
//! reliable-prediction allow-list, villa data availability, and the IPAI
//! (Indice des Prix des Actifs Immobiliers) adjustment percentages from the
//! BKAM T4 2024 series. They are externally supplied facts, not derived from
//! training coverage.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::features::PropertyType;

/// IPAI percentage used for cities absent from the table (table average).
pub const DEFAULT_IPAI: f64 = 10.5;

/// Canonical city key: trimmed, lowercased.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// City name as shown in user-facing messages (first letter uppercased).
pub fn display_city(city: &str) -> String {
    let normalized = normalize_city(city);
    let mut chars = normalized.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => normalized,
    }
}

/// Coverage snapshot for a single city.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityMarketProfile {
    /// Whether the training data contains villa listings for this city.
    pub villa_data: bool,
    /// IPAI increase over the base year, in percent.
    pub index_adjustment_pct: f64,
}

/// A prediction was refused before any model was consulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoverageError {
    #[error(
        "We don't have enough data to make reliable predictions for {0}. \
         Please select a different city."
    )]
    UnreliableCity(String),
    #[error("Villa data is not available for {0}. Please select apartment instead.")]
    VillaUnavailable(String),
}

/// Immutable market reference tables, injected into the gate and the price
/// adjustment rather than hard-coded at the call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    /// Cities with enough sample density for reliable predictions.
    pub reliable_cities: HashSet<String>,
    /// Per-city villa data availability; absent cities count as false.
    pub villa_availability: HashMap<String, bool>,
    /// Per-city IPAI percentage; absent cities fall back to `default_ipai`.
    pub index_adjustments: HashMap<String, f64>,
    pub default_ipai: f64,
}

impl Default for MarketData {
    fn default() -> Self {
        let reliable_cities = [
            "agadir",
            "casablanca",
            "fes",
            "marrakech",
            "rabat",
            "tanger",
            "temara",
            "tetouan",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let villa_availability = [
            ("casablanca", true),
            ("rabat", true),
            ("marrakech", true),
            ("tanger", true),
            ("fes", true),
            ("agadir", true),
            ("kenitra", false),
            ("meknes", false),
            ("tetouan", false),
            ("sale", false),
            ("oujda", false),
            ("temara", false),
            ("mohammedia", false),
            ("el-jadida", false),
            ("nador", false),
            ("beni-mellal", false),
            ("taza", false),
            ("berkane", false),
            ("khouribga", false),
            ("safi", false),
        ]
        .into_iter()
        .map(|(city, flag)| (city.to_string(), flag))
        .collect();

        // BKAM Séries IPAI T4 2024.
        let index_adjustments = [
            ("marrakech", 10.9),
            ("tanger", 17.7),
            ("kenitra", 10.35),
            ("casablanca", 15.2),
            ("rabat", 12.8),
            ("fes", 9.6),
            ("meknes", 8.7),
            ("agadir", 11.3),
            ("tetouan", 13.5),
            ("oujda", 7.8),
            ("sale", 11.2),
            ("nador", 9.1),
            ("mohammedia", 14.3),
            ("el-jadida", 10.5),
            ("beni-mellal", 8.2),
            ("temara", 12.1),
            ("safi", 7.5),
            ("khouribga", 8.0),
            ("berkane", 7.2),
            ("taza", 6.9),
        ]
        .into_iter()
        .map(|(city, pct)| (city.to_string(), pct))
        .collect();

        Self {
            reliable_cities,
            villa_availability,
            index_adjustments,
            default_ipai: DEFAULT_IPAI,
        }
    }
}

impl MarketData {
    /// Load an override table from a JSON file, replacing the built-in data.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read market data file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse market data file {}", path.display()))
    }

    pub fn profile(&self, city: &str) -> CityMarketProfile {
        let key = normalize_city(city);
        CityMarketProfile {
            villa_data: self.villa_availability.get(&key).copied().unwrap_or(false),
            index_adjustment_pct: self
                .index_adjustments
                .get(&key)
                .copied()
                .unwrap_or(self.default_ipai),
        }
    }

    pub fn is_reliable(&self, city: &str) -> bool {
        self.reliable_cities.contains(&normalize_city(city))
    }

    /// Multiplier aligning base-year model output with the current index,
    /// e.g. 10.9% becomes 1.109.
    pub fn adjustment_factor(&self, city: &str) -> f64 {
        1.0 + self.profile(city).index_adjustment_pct / 100.0
    }

    /// Availability gate: runs strictly before any model call and
    /// short-circuits on rejection.
    pub fn check(&self, city: &str, property_type: PropertyType) -> Result<(), CoverageError> {
        if !self.is_reliable(city) {
            return Err(CoverageError::UnreliableCity(display_city(city)));
        }
        if property_type == PropertyType::Villa && !self.profile(city).villa_data {
            return Err(CoverageError::VillaUnavailable(display_city(city)));
        }
        Ok(())
    }
}
