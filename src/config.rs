//! Command-line configuration

use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::{observability::LoggingConfig, settings::SettingsOverrides},
    io::default_output_path,
};

pub mod observability;
pub mod settings;

/// Stockwise budgeted stock allocation
#[derive(Debug, Parser)]
#[command(
    name = "stockwise",
    about = "Allocate a spend budget across SKUs to maximise profit",
    long_about = None
)]
pub struct AppConfig {
    /// Input CSV of stocking records
    #[arg(short, long, env = "STOCKWISE_INPUT")]
    pub input: PathBuf,

    /// Output CSV; defaults to a timestamped file in --output-dir
    #[arg(short, long, env = "STOCKWISE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory for timestamped output files
    #[arg(long, env = "STOCKWISE_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Budget to allocate; defaults to the baseline spend of the input
    #[arg(short, long, env = "STOCKWISE_BUDGET")]
    pub budget: Option<f64>,

    /// Solve each warehouse separately with a share of the budget
    #[arg(long, env = "STOCKWISE_PER_WAREHOUSE", default_value_t = false)]
    pub per_warehouse: bool,

    /// Optimiser settings.
    #[command(flatten)]
    pub optimizer: SettingsOverrides,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Where allocation rows are written.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.output_dir))
    }
}
