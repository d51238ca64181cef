use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use claimcheck_core::ValidationConfig;
use claimcheck_router::report::read_lane_files;
use claimcheck_router::{run_simulator, RunSummary, SimulatorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "claimcheck", version, about = "Claim treatment and validation orchestration")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (TOML); CLAIMCHECK_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the seeded simulator and check run-level guarantees
    Simulate {
        /// Number of claims to generate
        #[arg(long, default_value_t = 200)]
        claims: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Probability of injected download and oracle failures
        #[arg(long, default_value_t = 0.1)]
        failure_rate: f64,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
    /// Summarize lane result files in a directory
    Summarize {
        dir: PathBuf,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// `--config` file (or `fallback`), with `CLAIMCHECK_*` overrides applied
fn load_config(path: Option<&PathBuf>, fallback: ValidationConfig) -> Result<ValidationConfig> {
    ValidationConfig::resolve(path.map(PathBuf::as_path), fallback, |key| std::env::var(key).ok())
        .context("resolving configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Simulate {
            claims,
            seed,
            failure_rate,
            json,
        } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&failure_rate),
                "--failure-rate must be within [0, 1], got {failure_rate}"
            );
            let defaults = SimulatorConfig::default();
            let validation = load_config(cli.config.as_ref(), defaults.validation.clone())?;
            let config = SimulatorConfig {
                seed,
                claims,
                failure_rate,
                validation,
                ..defaults
            };

            let report = run_simulator(config).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            if !report.passed() {
                std::process::exit(1);
            }
        }
        Command::Config => {
            let config = load_config(cli.config.as_ref(), ValidationConfig::default())?;
            print!("{}", config.to_toml_string()?);
        }
        Command::Summarize { dir, json } => {
            let results = read_lane_files(&dir)
                .await
                .with_context(|| format!("reading lane files from {}", dir.display()))?;
            let summary = RunSummary::from_results(&results);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.generate_text());
            }
        }
    }

    Ok(())
}
