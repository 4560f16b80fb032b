use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod dataset;
mod db;
mod encoding;
mod error;
mod features;
mod forecaster;
mod models;
mod projector;
mod regression;
mod server;

use crate::forecaster::{FeatureSchema, Forecaster};
use crate::models::{last_observation, Disease};
use crate::server::{AppState, DiseaseState};

#[derive(Parser)]
#[command(name = "pandemic-forecast")]
#[command(about = "Epidemic case-count forecasting service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the source CSVs, train both models, and serve the HTTP API
    Serve {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, default_value = "0.0.0.0:5000")]
        bind: String,
        /// Reject projection targets further than this past the last data point
        #[arg(long, default_value_t = 730)]
        max_horizon_days: i64,
    },
    /// Load the source CSVs and archive raw copies to the store
    Import {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Train one disease model and print its held-out score
    Score {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long)]
        disease: String,
    },
}

fn train_disease(
    disease: Disease,
    rows: &[crate::models::CaseRow],
    geo: &[crate::models::GeoRecord],
) -> anyhow::Result<DiseaseState> {
    let feature_rows = features::build_features(rows, geo);
    let schema = FeatureSchema::for_disease(disease);
    let forecaster = Forecaster::train(schema, &feature_rows)
        .with_context(|| format!("training the {} model", disease.as_str()))?;
    info!(
        disease = disease.as_str(),
        features = ?schema.feature_columns(),
        target = schema.target_column(),
        accuracy = forecaster.accuracy(),
        "model trained"
    );

    Ok(DiseaseState {
        forecaster,
        last: last_observation(rows),
        features: feature_rows,
    })
}

async fn load_data(data_dir: &Path, database_url: &str) -> anyhow::Result<dataset::LoadedData> {
    dataset::load(data_dir, database_url)
        .await
        .with_context(|| format!("loading source data from {}", data_dir.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    match cli.command {
        Commands::Serve {
            data_dir,
            bind,
            max_horizon_days,
        } => {
            let data = load_data(&data_dir, &database_url).await?;
            let state = AppState {
                corona: train_disease(Disease::Corona, &data.corona, &data.geo)?,
                variole: train_disease(Disease::Variole, &data.variole, &data.geo)?,
                max_horizon_days,
            };
            server::run(Arc::new(state), &bind).await?;
        }
        Commands::Import { data_dir } => {
            let data = load_data(&data_dir, &database_url).await?;
            println!(
                "Archived {} corona rows and {} variole rows.",
                data.corona.len(),
                data.variole.len()
            );
        }
        Commands::Score { data_dir, disease } => {
            let disease: Disease = disease.parse()?;
            let data = load_data(&data_dir, &database_url).await?;
            let rows = match disease {
                Disease::Corona => &data.corona,
                Disease::Variole => &data.variole,
            };
            let state = train_disease(disease, rows, &data.geo)?;
            println!(
                "{} model held-out R2: {:.4}",
                disease.as_str(),
                state.forecaster.accuracy()
            );
        }
    }

    Ok(())
}
