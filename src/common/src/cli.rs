use clap::Parser;
use std::path::PathBuf;

/// CLI arguments shared by every subcommand
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use crate::storage::redact_dsn;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Default log level implied by the CLI flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments, `RUST_LOG` wins when set
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Render the effective configuration with credentials redacted
    pub fn render_config(config: &Configuration) -> String {
        let export = &config.export;
        [
            "Partition Exporter Configuration:".to_string(),
            "=================================".to_string(),
            format!("Database DSN: {}", redact_dsn(&config.database.dsn)),
            format!("Database max connections: {}", config.database.max_connections),
            format!("Database connect timeout: {:?}", config.database.connect_timeout),
            format!("Storage DSN: {}", redact_dsn(&config.storage.dsn)),
            format!("Table: {}", export.table),
            format!("Root directory: {}", export.root_directory.display()),
            format!("Namespace prefix: {}", export.namespace_prefix),
            format!("Partition column: {}", export.partition_column),
            format!("Upload concurrency: {}", export.upload_concurrency),
            format!("Compression level: {}", export.compression_level),
            format!(
                "Multipart threshold: {} bytes",
                export.multipart_threshold_bytes
            ),
        ]
        .join("\n")
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        log::info!("Configuration validation passed");
        Ok(())
    }
}
