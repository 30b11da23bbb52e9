use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data: DataConfig,
    pub models: ModelsConfig,
    pub market: MarketConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// CSV of listings used by the `train` subcommand.
    pub dataset_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/morocco_real_estate_prices_with_features.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// Directory holding the per-type model artifacts.
    pub dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MarketConfig {
    /// Optional JSON file replacing the built-in market reference tables.
    pub data_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present - production uses env vars directly)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("atlas-valuer");

        let builder = Config::builder()
            // 1. Load default values
            .set_default(
                "data.dataset_path",
                "data/morocco_real_estate_prices_with_features.csv",
            )?
            .set_default("models.dir", "models")?
            .set_default("market.data_path", None::<String>)?
            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Load from environment variables (ATLAS_MODELS__DIR=...)
            .add_source(Environment::with_prefix("ATLAS").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        assert_eq!(
            DataConfig::default().dataset_path,
            PathBuf::from("data/morocco_real_estate_prices_with_features.csv")
        );
        assert_eq!(ModelsConfig::default().dir, PathBuf::from("models"));
        assert!(MarketConfig::default().data_path.is_none());
    }

    #[test]
    fn test_config_loads_with_defaults() {
        let config = AppConfig::load().expect("Config should load");

        assert!(!config.models.dir.as_os_str().is_empty());
        assert!(!config.data.dataset_path.as_os_str().is_empty());
    }

    /// Helper to safely set and remove environment variables in tests.
    /// SAFETY: These tests run sequentially and clean up after themselves.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // SAFETY: Test environment, single-threaded access
        unsafe {
            std::env::set_var(key, value);
        }
        let result = f();
        unsafe {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn test_env_var_overrides_models_dir() {
        let config = with_env_var("ATLAS__MODELS__DIR", "/tmp/atlas-models", || {
            AppConfig::load().expect("Config should load")
        });

        assert_eq!(config.models.dir, PathBuf::from("/tmp/atlas-models"));
    }

    #[test]
    fn test_env_var_sets_market_override() {
        let config = with_env_var("ATLAS__MARKET__DATA_PATH", "market.json", || {
            AppConfig::load().expect("Config should load")
        });

        assert_eq!(config.market.data_path, Some(PathBuf::from("market.json")));
    }
}
