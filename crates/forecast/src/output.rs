//! Terminal output for the forecast commands

use clap::ValueEnum;
use colored::Colorize;
use forecast_lib::{Metrics, ModelInfo, PredictionResult};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl Row {
    fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

fn print_rows(rows: Vec<Row>) {
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn metric_rows(metrics: &Metrics) -> Vec<Row> {
    vec![
        Row::new("model_type", metrics.model_type.to_string()),
        Row::new("r2_score", format!("{:.4}", metrics.r2_score)),
        Row::new("rmse", format!("{:.4}", metrics.rmse)),
        Row::new("mae", format!("{:.4}", metrics.mae)),
        Row::new("accuracy", format_percent(metrics.accuracy)),
        Row::new("threshold", format!("{:.4}", metrics.threshold)),
        Row::new("n_samples", metrics.n_samples.to_string()),
        Row::new("test_size", format!("{}", metrics.test_size)),
    ]
}

pub fn print_metrics(metrics: &Metrics, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_success(&format!("Trained {} model", metrics.model_type));
            print_rows(metric_rows(metrics));
        }
        OutputFormat::Json => print_json(metrics),
    }
}

pub fn print_prediction(result: &PredictionResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => print_rows(vec![
            Row::new("product_id", result.product_id.to_string()),
            Row::new("product_name", result.product_name.clone()),
            Row::new(
                "predicted_quantity",
                result.predicted_quantity.to_string().bold().to_string(),
            ),
            Row::new("confidence", color_confidence(result.confidence)),
            Row::new("timestamp", result.timestamp.to_rfc3339()),
        ]),
        OutputFormat::Json => print_json(result),
    }
}

pub fn print_model_info(info: &ModelInfo, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_info(&format!(
                "Active model: {} (trained {})",
                info.model_type,
                info.trained_date.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            print_rows(metric_rows(&info.metrics));
            println!("Features: {}", info.feature_schema.join(", "));

            match &info.feature_importance {
                Some(importances) if !importances.is_empty() => {
                    let rows: Vec<ImportanceRow> = importances
                        .iter()
                        .map(|fi| ImportanceRow {
                            feature: fi.feature.clone(),
                            importance: format!("{:.4}", fi.importance),
                        })
                        .collect();
                    println!("{}", Table::new(rows).with(Style::rounded()));
                }
                _ => print_warning("Feature importance is not available for this model type"),
            }
        }
        OutputFormat::Json => print_json(info),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Color confidence based on value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_percent(confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.6 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
