//! Command-line interface for the recession backtester.

use recession_backtest::aggregate::{aggregate_all, ModelTable};
use recession_backtest::backtest::RunSummary;
use recession_backtest::config::RunConfig;
use recession_backtest::data::{load_csv, write_csv, DataConfig};
use recession_backtest::error::Result;
use recession_backtest::export::ResultStore;
use recession_backtest::labels::{label_series, LabelConfig, TRADING_DAYS_PER_YEAR};
use recession_backtest::pipeline;
use recession_backtest::types::{ByTest, Horizon, ModelKind, PredictionErrors};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{builder::Builder, settings::Style};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Walk-forward backtesting of recession forecasting models.
#[derive(Parser)]
#[command(name = "recession-backtest")]
#[command(version)]
#[command(about = "Walk-forward cross-validation and backtesting of recession forecasting models")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backtest from a configuration file
    Run {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured results directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize persisted results and rebuild the comparison tables
    Report {
        /// Results directory of a previous run
        #[arg(short, long, default_value = "results")]
        results: PathBuf,

        /// Only report this model
        #[arg(short, long)]
        model: Option<ModelKind>,
    },

    /// Attach recession labels to an observation file
    Label {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Rows per year, used to convert month horizons to row offsets
        #[arg(long, default_value_t = TRADING_DAYS_PER_YEAR)]
        rows_per_year: usize,
    },

    /// Write the default configuration file
    InitConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "backtest.toml")]
        output: PathBuf,
    },
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set tracing subscriber: {}", e);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_logging();

    let outcome = match &cli.command {
        Commands::Run { config, output } => run_from_config(config, output.as_ref(), cli.quiet),
        Commands::Report { results, model } => report(results, *model),
        Commands::Label {
            data,
            output,
            rows_per_year,
        } => label(data, output, *rows_per_year),
        Commands::InitConfig { output } => init_config(output),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_from_config(config_path: &PathBuf, output: Option<&PathBuf>, quiet: bool) -> Result<()> {
    let mut config = RunConfig::load(config_path)?;
    if let Some(dir) = output {
        config.output.dir = dir.clone();
    }
    if quiet {
        config.run.show_progress = false;
    }

    let result = pipeline::run(&config)?;

    println!("\nRun {}", result.manifest.run_id);
    print_summary(&result.report.summary);
    print_errors(&result.report.prediction_errors, None);
    println!("\nResults written to {}", config.output.dir.display());
    Ok(())
}

fn report(results: &PathBuf, model: Option<ModelKind>) -> Result<()> {
    let store = ResultStore::new(results);
    let full = store.load_full_predictions()?;
    info!("Loaded predictions for {} tests", full.len());

    let tables: Vec<ModelTable> = aggregate_all(&full)?
        .into_iter()
        .filter(|t| model.map_or(true, |m| t.model == m))
        .collect();
    for table in &tables {
        store.save_table(table)?;
    }

    if let Ok(manifest) = store.load_manifest() {
        println!("\nRun {} ({})", manifest.run_id, manifest.started_at);
        if let Some(summary) = &manifest.summary {
            print_summary(summary);
        }
    }

    print_errors(&store.load_prediction_errors()?, model);
    print_tables(&tables);
    Ok(())
}

fn label(data: &PathBuf, output: &PathBuf, rows_per_year: usize) -> Result<()> {
    let series = load_csv(data, &DataConfig::default())?;
    let config = LabelConfig {
        rows_per_year,
        ..Default::default()
    };
    let labeled = label_series(&series, &config)?;
    write_csv(&labeled, output)?;

    println!(
        "Labeled {} rows ({} to {}), written to {}",
        labeled.len(),
        labeled.first_date().map(|d| d.to_string()).unwrap_or_default(),
        labeled.last_date().map(|d| d.to_string()).unwrap_or_default(),
        output.display()
    );
    Ok(())
}

fn init_config(output: &PathBuf) -> Result<()> {
    RunConfig::default().save(output)?;
    println!("Created configuration file: {}", output.display());
    println!("\nEdit this file to customize your backtest, then run:");
    println!("  recession-backtest run -c {}", output.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Windows: {} run, {} completed",
        summary.windows_run, summary.windows_completed
    );
    if summary.is_clean() {
        return;
    }

    let mut builder = Builder::new();
    builder.push_record(["Test", "Stage", "Horizon", "Model", "Error"]);
    for f in &summary.window_failures {
        builder.push_record([
            f.test.to_string(),
            f.stage.to_string(),
            "-".to_string(),
            "-".to_string(),
            f.message.clone(),
        ]);
    }
    for f in &summary.pair_failures {
        builder.push_record([
            f.test.to_string(),
            f.failure.stage.to_string(),
            f.failure.horizon.to_string(),
            f.failure.model.to_string(),
            f.failure.message.clone(),
        ]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{}", table);
}

fn print_errors(errors: &ByTest<PredictionErrors>, model: Option<ModelKind>) {
    let mut builder = Builder::new();
    builder.push_record(["Test", "Horizon", "Model", "Obs", "Mismatches", "Rate %", "Brier"]);
    for (test, by_output) in errors {
        for (horizon, by_model) in by_output {
            for (kind, e) in by_model {
                if model.map_or(false, |m| m != *kind) {
                    continue;
                }
                builder.push_record([
                    test.to_string(),
                    horizon.to_string(),
                    kind.to_string(),
                    e.observations.to_string(),
                    e.mismatches.to_string(),
                    format!("{:.2}", e.mismatch_rate * 100.0),
                    format!("{:.4}", e.brier_score),
                ]);
            }
        }
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("\n{}", table);
}

fn print_tables(tables: &[ModelTable]) {
    let mut builder = Builder::new();
    builder.push_record(["Model", "Tests", "Rows", "Brier 6mo", "Brier 12mo", "Brier 24mo"]);
    for table in tables {
        let brier = |h: Horizon| {
            let pairs: Vec<(u8, f64)> = table.rows.iter().filter_map(|r| r.pair(h)).collect();
            if pairs.is_empty() {
                return "-".to_string();
            }
            let sum: f64 = pairs.iter().map(|&(t, p)| (p - t as f64).powi(2)).sum();
            format!("{:.4}", sum / pairs.len() as f64)
        };
        builder.push_record([
            table.model.to_string(),
            table.segments.len().to_string(),
            table.rows.len().to_string(),
            brier(Horizon::Within6Months),
            brier(Horizon::Within12Months),
            brier(Horizon::Within24Months),
        ]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("\n{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["recession-backtest", "run", "-c", "backtest.toml"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_report_model_filter() {
        let cli = Cli::try_parse_from([
            "recession-backtest",
            "-vv",
            "report",
            "--results",
            "out",
            "--model",
            "elastic-net",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Report { model, .. } => assert_eq!(model, Some(ModelKind::ElasticNet)),
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        let cli = Cli::try_parse_from(["recession-backtest", "report", "--model", "lstm"]);
        assert!(cli.is_err());
    }
}
