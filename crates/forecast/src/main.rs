//! Sales forecast - train, query and serve the monthly sales model
//!
//! Reads order history from a SQLite database, trains one of the supported
//! regressors, persists it next to the service and answers forecast
//! requests either from the command line or over HTTP.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use forecast_lib::{ForecastService, ModelRegistry, PredictionRequest, SqliteSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod output;

use output::OutputFormat;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Sales forecast CLI
#[derive(Parser)]
#[command(name = "forecast")]
#[command(author, version, about = "Monthly sales forecasting service", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./forecast.toml when present)
    #[arg(long, short, env = "FORECAST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, default_value = "json", global = true)]
    pub log_format: LogFormat,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on the full order history and persist it
    Train {
        /// Model type (decision_tree, linear, knn, logistic)
        #[arg(long, short, default_value = "decision_tree")]
        model: String,
    },

    /// Forecast the quantity for one product
    Predict {
        /// Product ID
        #[arg(long, short)]
        product: i64,

        /// Order date (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
        #[arg(long, short, value_parser = parse_order_date)]
        date: NaiveDateTime,

        /// Customer ID used for enrichment
        #[arg(long)]
        customer: Option<String>,

        /// Expected quantity; the recent average is used when omitted
        #[arg(long, short)]
        quantity: Option<f64>,
    },

    /// Show the active model
    Info,

    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

fn parse_order_date(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = config::ForecastConfig::load(cli.config.as_deref())?;
    info!(
        database = %config.database_path.display(),
        model_path = %config.model_path.display(),
        domain_policy = %config.domain_policy,
        "Forecast configured"
    );

    let source = Arc::new(SqliteSource::new(&config.database_path));
    let registry = ModelRegistry::new(&config.model_path);
    let service = Arc::new(ForecastService::new(source, registry, config.service()));

    match cli.command {
        Commands::Train { model } => {
            let svc = service.clone();
            let metrics = tokio::task::spawn_blocking(move || svc.train(&model))
                .await?
                .context("Training failed")?;
            output::print_metrics(&metrics, cli.format);
        }
        Commands::Predict {
            product,
            date,
            customer,
            quantity,
        } => {
            let request = PredictionRequest {
                product_id: product,
                order_date: date,
                customer_id: customer,
                quantity,
            };
            let svc = service.clone();
            let result = tokio::task::spawn_blocking(move || svc.predict(&request))
                .await?
                .context("Prediction failed")?;
            output::print_prediction(&result, cli.format);
        }
        Commands::Info => {
            let info = service.model_info().context("No model available")?;
            output::print_model_info(&info, cli.format);
        }
        Commands::Serve { port } => {
            if let Err(e) = service.load_model() {
                warn!(error = %e, "Starting without a model, train via POST /retrain");
            }

            let state = Arc::new(api::AppState::new(service));
            let port = port.unwrap_or(config.api_port);
            let api_handle = tokio::spawn(api::serve(port, state));

            tokio::select! {
                result = api_handle => {
                    result??;
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}
