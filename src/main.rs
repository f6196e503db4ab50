use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use common::storage::{create_object_store, redact_dsn};
use exporter::{
    ExportError, ExportReport, ExportRequest, ExporterOptions, ObjectStoreUploader,
    PartitionDate, PartitionExporter, PartitionStatements, PgPartitionDatabase,
};

#[derive(Parser)]
#[command(name = "partition-exporter")]
#[command(about = "Exports a closed day partition to object storage and reclaims local disk")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, detach, upload and remove one day partition
    Export {
        #[arg(long, help = "Partition date (YYYY-MM-DD), defaults to yesterday in UTC")]
        date: Option<String>,

        #[arg(long, help = "Table to export, overrides export.table")]
        table: Option<String>,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    /// Validate the configuration and exit
    Validate,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

impl Cli {
    async fn run(self) -> Result<()> {
        utils::init_logging(&self.common);
        let config = utils::load_config(self.common.config.as_ref())?;

        match self.command {
            Commands::Export { date, table } => {
                validate(&config)?;
                let date = resolve_date(date.as_deref(), Utc::now().date_naive())?;
                export(&config, date, table).await
            }
            Commands::Config { json } => {
                if json {
                    println!("{}", render_json(&config)?);
                } else {
                    println!("{}", utils::render_config(&config));
                }
                Ok(())
            }
            Commands::Validate => {
                validate(&config)?;
                println!("Configuration is valid");
                Ok(())
            }
            Commands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }
}

/// Version line of this binary
fn version_info() -> String {
    format!(
        "{} {} (rust {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_RUST_VERSION")
    )
}

/// Configuration checks plus the identifier rules the exporter enforces
fn validate(config: &Configuration) -> Result<()> {
    utils::validate_config(config)?;
    PartitionStatements::new(&config.export.table, &config.export.partition_column)
        .context("Invalid configuration")?;
    Ok(())
}

/// Partition date to export, yesterday unless given. Only closed days are
/// accepted.
fn resolve_date(arg: Option<&str>, today: NaiveDate) -> Result<PartitionDate> {
    let date = match arg {
        Some(value) => PartitionDate::parse(value)
            .with_context(|| format!("Invalid partition date '{value}', expected YYYY-MM-DD"))?,
        None => today
            .pred_opt()
            .map(PartitionDate::new)
            .context("No day before today")?,
    };

    if !date.is_closed(today) {
        bail!("Partition {date} is not closed yet, only days before {today} can be exported");
    }
    Ok(date)
}

async fn export(config: &Configuration, date: PartitionDate, table: Option<String>) -> Result<()> {
    let settings = &config.export;
    let request = ExportRequest {
        table: table.unwrap_or_else(|| settings.table.clone()),
        root_directory: settings.root_directory.clone(),
        date,
        namespace_prefix: settings.namespace_prefix.clone(),
    };

    tracing::info!(
        table = %request.table,
        date = %request.date,
        root = %request.root_directory.display(),
        storage = %redact_dsn(&config.storage.dsn),
        "Starting partition export"
    );

    let object_store =
        create_object_store(&config.storage).context("Failed to initialize object store")?;
    let uploader = ObjectStoreUploader::new(object_store, settings.multipart_threshold_bytes);

    let database = PgPartitionDatabase::connect(
        &config.database.dsn,
        config.database.max_connections,
        config.database.connect_timeout,
    )
    .await
    .with_context(|| format!("Failed to connect to {}", redact_dsn(&config.database.dsn)))?;

    let exporter = PartitionExporter::new(
        Arc::new(database.clone()),
        Arc::new(uploader),
        ExporterOptions {
            partition_column: settings.partition_column.clone(),
            upload_concurrency: settings.upload_concurrency,
            compression_level: settings.compression_level,
        },
    );

    let result = tokio::select! {
        result = exporter.export_partition(&request) => result,
        _ = tokio::signal::ctrl_c() => {
            database.close().await;
            bail!("Interrupted before the export finished, local files are kept and the export can be re-run");
        }
    };

    database.close().await;
    exporter.metrics().summary().log();

    match result {
        Ok(report) => {
            log_report(&report);
            Ok(())
        }
        Err(e) => {
            if let Some(report) = e.report() {
                log_report(report);
            }
            Err(failure(e))
        }
    }
}

fn log_report(report: &ExportReport) {
    for key in report.uploaded_keys() {
        tracing::debug!(key = %key, "Exported object");
    }
    for error in report.failures() {
        tracing::error!(path = %error.path().display(), error = %error, "File not exported");
    }
    for (directory, error) in report.cleanup_failures() {
        tracing::error!(
            directory = %directory.display(),
            error = %error,
            "Detached partition could not be removed"
        );
    }
    tracing::info!(
        table = %report.table,
        date = %report.date,
        state = %report.state,
        directories = report.locations.len(),
        files = report.files_processed(),
        bytes_uploaded = report.bytes_uploaded(),
        "Export report"
    );
}

fn failure(e: ExportError) -> anyhow::Error {
    let stage = e.stage();
    anyhow::Error::new(e).context(format!("Partition export failed while {stage}"))
}

/// JSON rendering of the configuration with credentials redacted
fn render_json(config: &Configuration) -> Result<String> {
    let mut redacted = config.clone();
    redacted.database.dsn = redact_dsn(&redacted.database.dsn);
    redacted.storage.dsn = redact_dsn(&redacted.storage.dsn);
    serde_json::to_string_pretty(&redacted).context("Failed to render configuration")
}
