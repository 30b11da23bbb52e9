use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atlas_valuer::config::AppConfig;
use atlas_valuer::dataset::Dataset;
use atlas_valuer::market::MarketData;
use atlas_valuer::ml::features::PropertyType;
use atlas_valuer::ml::persistence::{ModelStore, PersistedModel};
use atlas_valuer::ml::training::{TrainingOptions, train_property_model};
use atlas_valuer::predict::{PredictError, Predictor};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "atlas-valuer")]
#[command(about = "Per-sqm price estimation for Moroccan properties")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the apartment and villa models from the listings dataset
    Train {
        /// CSV dataset path (overrides configuration)
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Output directory for model artifacts (overrides configuration)
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
    /// Predict the price of one property record
    Predict {
        /// A JSON file path or an inline JSON string
        input: String,
        /// Directory holding the model artifacts (overrides configuration)
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("atlas_valuer=debug");

    // stdout is reserved for the prediction JSON; diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match args.command {
        Command::Train {
            dataset,
            models_dir,
        } => run_train(
            &dataset.unwrap_or(config.data.dataset_path),
            &models_dir.unwrap_or(config.models.dir),
        ),
        Command::Predict { input, models_dir } => {
            let market = load_market(&config)?;
            run_predict(&input, &models_dir.unwrap_or(config.models.dir), &market)
        }
    }
}

fn load_market(config: &AppConfig) -> Result<MarketData> {
    match &config.market.data_path {
        Some(path) => MarketData::from_file(path),
        None => Ok(MarketData::default()),
    }
}

fn run_train(dataset_path: &Path, models_dir: &Path) -> Result<()> {
    let dataset = Dataset::load(dataset_path)?;
    let options = TrainingOptions::default();

    let apartments = dataset.examples_for(PropertyType::Apartment);
    let villas = dataset.examples_for(PropertyType::Villa);

    // The two runs share no mutable state and read disjoint projections of
    // the dataset, so they train concurrently.
    let (apartment, villa) = rayon::join(
        || train_property_model(&apartments, PropertyType::Apartment, &options),
        || train_property_model(&villas, PropertyType::Villa, &options),
    );

    let store = ModelStore {
        apartment: PersistedModel::new(apartment?),
        villa: PersistedModel::new(villa?),
    };
    store.save(models_dir)?;

    tracing::info!(dir = %models_dir.display(), "Models saved");
    tracing::info!("{}", store.apartment.summary());
    tracing::info!("{}", store.villa.summary());
    Ok(())
}

fn run_predict(input: &str, models_dir: &Path, market: &MarketData) -> Result<()> {
    let payload = read_input(input)?;

    let store = match ModelStore::load(models_dir) {
        Ok(store) => store,
        Err(err) => {
            // Artifact failures still produce the uniform error shape.
            println!("{}", PredictError::from(err).to_json());
            return Ok(());
        }
    };

    let predictor = Predictor::new(&store.apartment.pipeline, &store.villa.pipeline, market);
    println!("{}", predictor.predict_json(&payload));
    Ok(())
}

/// The input argument is either a path to a JSON file or the JSON itself.
fn read_input(input: &str) -> Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))
    } else {
        Ok(input.to_string())
    }
}
