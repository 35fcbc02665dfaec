use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use infrascope::analysis::render::{render_anomalies, render_patterns};
use infrascope::analysis::{analyze_patterns, timeline::build_timeline};
use infrascope::config::AppConfig;
use infrascope::detect::catalog::MetricRule;
use infrascope::detect::evaluator::AnomalyEvaluator;
use infrascope::telemetry::validate::validate_point;
use infrascope::telemetry::TelemetryPoint;

#[derive(Parser)]
#[command(
    name = "infrascope",
    about = "Threshold-based anomaly evaluation for infrastructure telemetry",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $INFRASCOPE_CONFIG, then ./infrascope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address (overrides [server].bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Evaluate one point or an array of points, in order, on one evaluator
    Evaluate {
        /// JSON file holding a point object or an array of points
        #[arg(long)]
        input: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Build a timeline from historical points and report anomaly patterns
    Analyze {
        /// JSON file holding an array of points, oldest first
        #[arg(long)]
        input: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the active metric rules
    Catalog,

    /// Check points against the ingestion rules
    Validate {
        /// JSON file holding a point object or an array of points
        #[arg(long)]
        input: PathBuf,
    },
}

fn read_payloads(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse input file: {}", path.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn read_points(path: &Path) -> Result<Vec<TelemetryPoint>> {
    read_payloads(path)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| TelemetryPoint::try_from(v).with_context(|| format!("point #{i}")))
        .collect()
}

/// The config picks the log level, so loading it logs through a temporary subscriber.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::with_default(bootstrap, || match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::load_or_default()),
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting Infrascope service");
            infrascope::serve(config).await?;
        }
        Commands::Evaluate { input, json } => {
            let points = read_points(&input)?;
            let evaluator = AnomalyEvaluator::new(Arc::new(config.catalog()?));
            tracing::info!(points = points.len(), "Evaluating points");

            let results: Vec<_> = points.iter().map(|p| evaluator.evaluate(p)).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for (point, result) in points.iter().zip(&results) {
                    println!("=== {} ===", point.timestamp().unwrap_or("(no timestamp)"));
                    println!("{}\n", render_anomalies(result));
                }
            }
        }
        Commands::Analyze { input, json } => {
            let points = read_points(&input)?;
            let timeline = build_timeline(Arc::new(config.catalog()?), &points);
            let report = analyze_patterns(&timeline);

            if json {
                let output = serde_json::json!({ "timeline": timeline, "patterns": report });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("\n=== Infrascope Pattern Report ===");
                println!("{}", render_patterns(&report));
                println!("=================================\n");
            }
        }
        Commands::Catalog => {
            let catalog = config.catalog()?;
            println!("{:<24} | {:<8} | {:>10} | {:>10} | Category", "Metric", "Kind", "Warning", "Critical");
            println!("{:-<24}-|-{:-<8}-|-{:->10}-|-{:->10}-|-{:-<12}", "", "", "", "", "");
            for (metric, rule) in catalog.rules() {
                let (kind, warning, critical) = match rule {
                    MetricRule::Absolute(r) => ("absolute", r.warning.to_string(), r.critical.to_string()),
                    MetricRule::Relative(r) => (
                        "relative",
                        format!("{}x", r.warning_factor),
                        format!("{}x", r.critical_factor),
                    ),
                };
                println!(
                    "{:<24} | {:<8} | {:>10} | {:>10} | {}",
                    metric,
                    kind,
                    warning,
                    critical,
                    rule.category()
                );
            }
        }
        Commands::Validate { input } => {
            let payloads = read_payloads(&input)?;
            let mut failed = 0;
            for (i, payload) in payloads.iter().enumerate() {
                match validate_point(payload) {
                    Ok(_) => println!("point #{i}: ok"),
                    Err(issues) => {
                        failed += 1;
                        println!("point #{i}: {} issue(s)", issues.len());
                        for issue in issues {
                            println!("  - {}: {}", issue.field, issue.message);
                        }
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} points failed validation", payloads.len());
            }
        }
    }

    Ok(())
}
