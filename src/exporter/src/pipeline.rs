//! Export pipeline orchestration.
//!
//! A run moves through `Idle → Converting → Detaching → Exporting →
//! CleaningUp → Done` and stops in `Failed(stage)` at the first stage-level
//! error. Within the export stage per-file failures are collected rather than
//! raised, so every discovered file is attempted before the run decides its
//! outcome.
//!
//! ## Safety Guarantees
//!
//! - A detached directory is only removed once every file under it was
//!   uploaded; each directory is judged on its own files
//! - Compression never touches the original file, so an interrupted run can
//!   always be repeated from the top
//! - Object keys are derived from paths only, so repeated runs overwrite the
//!   same objects

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, error, info, warn};

use crate::classifier::{ExportableFile, classify};
use crate::cleaner::clean_directory;
use crate::compressor::Compressor;
use crate::database::{PartitionDatabase, PartitionStatements};
use crate::error::{ExportError, FileError, Stage};
use crate::keys::{ObjectKey, map_key};
use crate::location::{PartitionDate, detached_pattern, resolve_detached_dirs};
use crate::metrics::ExportMetrics;
use crate::report::{CleanupStatus, ExportReport, LocationReport, PipelineState, UploadOutcome};
use crate::uploader::Uploader;

/// One partition to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub table: String,
    /// Database root holding the `{table}~N` directories
    pub root_directory: PathBuf,
    pub date: PartitionDate,
    pub namespace_prefix: String,
}

/// Tuning knobs of a [`PartitionExporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterOptions {
    /// Designated timestamp column the partition predicates filter on
    pub partition_column: String,
    /// Files compressed and uploaded concurrently per directory
    pub upload_concurrency: usize,
    /// Gzip level for columnar files
    pub compression_level: u32,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            partition_column: "ts".to_string(),
            upload_concurrency: 4,
            compression_level: 6,
        }
    }
}

/// Runs partition exports against a database and an object store.
pub struct PartitionExporter {
    database: Arc<dyn PartitionDatabase>,
    uploader: Arc<dyn Uploader>,
    compressor: Compressor,
    options: ExporterOptions,
    metrics: ExportMetrics,
}

impl PartitionExporter {
    pub fn new(
        database: Arc<dyn PartitionDatabase>,
        uploader: Arc<dyn Uploader>,
        options: ExporterOptions,
    ) -> Self {
        Self {
            database,
            uploader,
            compressor: Compressor::new(options.compression_level),
            options,
            metrics: ExportMetrics::new(),
        }
    }

    /// Share an existing metrics handle
    pub fn with_metrics(mut self, metrics: ExportMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &ExportMetrics {
        &self.metrics
    }

    /// Convert, detach, upload and clean up one day partition.
    ///
    /// Safe to call repeatedly for the same request: conversion and detach
    /// are idempotent on the database side, uploads overwrite, and cleanup of
    /// an already removed directory succeeds.
    ///
    /// # Errors
    ///
    /// Database failures abort the run immediately. Export and cleanup
    /// failures are reported after every file was attempted and carry the
    /// full [`ExportReport`].
    pub async fn export_partition(
        &self,
        request: &ExportRequest,
    ) -> Result<ExportReport, ExportError> {
        let started = Instant::now();
        self.metrics.record_run_started();

        let result = self.run(request).await;

        match &result {
            Ok(report) => {
                self.metrics.record_run_succeeded();
                info!(
                    table = %request.table,
                    date = %request.date,
                    directories = report.locations.len(),
                    files = report.files_processed(),
                    bytes_uploaded = report.bytes_uploaded(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Partition export completed"
                );
            }
            Err(e) => {
                self.metrics.record_run_failed();
                error!(
                    table = %request.table,
                    date = %request.date,
                    stage = %e.stage(),
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Partition export failed"
                );
            }
        }

        result
    }

    async fn run(&self, request: &ExportRequest) -> Result<ExportReport, ExportError> {
        let statements = PartitionStatements::new(&request.table, &self.options.partition_column)?;
        let mut state = PipelineState::Idle;

        advance(&mut state, PipelineState::Converting, request);
        self.execute(
            Stage::Converting,
            &statements.convert_to_parquet(request.date),
            request,
        )
        .await?;

        advance(&mut state, PipelineState::Detaching, request);
        self.execute(Stage::Detaching, &statements.detach(request.date), request)
            .await?;

        advance(&mut state, PipelineState::Exporting, request);
        let directories =
            resolve_detached_dirs(&request.root_directory, &request.table, request.date).map_err(
                |source| ExportError::Resolve {
                    root: request.root_directory.clone(),
                    source,
                },
            )?;

        if directories.is_empty() {
            warn!(
                table = %request.table,
                date = %request.date,
                pattern = %detached_pattern(&request.root_directory, &request.table, request.date),
                "No detached partition directories found, nothing to export"
            );
        } else {
            info!(
                table = %request.table,
                date = %request.date,
                directories = directories.len(),
                "Found detached partition directories"
            );
        }

        let mut report = ExportReport::new(&request.table, request.date);
        for directory in directories {
            let location = self.export_location(request, directory).await;
            report.locations.push(location);
        }

        if report.locations.iter().any(LocationReport::is_exported) {
            advance(&mut state, PipelineState::CleaningUp, request);
            for location in report.locations.iter_mut() {
                if location.is_exported() {
                    location.cleanup = self.clean(&location.directory).await;
                } else {
                    warn!(
                        directory = %location.directory.display(),
                        "Keeping detached partition, some files failed to export"
                    );
                }
            }
        }

        let outcome = if !report.locations.iter().all(LocationReport::is_exported) {
            PipelineState::Failed(Stage::Exporting)
        } else if !report.cleanup_failures().is_empty() {
            PipelineState::Failed(Stage::CleaningUp)
        } else {
            PipelineState::Done
        };
        advance(&mut state, outcome, request);
        report.state = outcome;

        match outcome {
            PipelineState::Failed(Stage::Exporting) => Err(ExportError::Export { report }),
            PipelineState::Failed(_) => Err(ExportError::Cleanup { report }),
            _ => Ok(report),
        }
    }

    async fn execute(
        &self,
        stage: Stage,
        statement: &str,
        request: &ExportRequest,
    ) -> Result<(), ExportError> {
        debug!(stage = %stage, statement = %statement, "Executing partition statement");

        self.database
            .execute(statement)
            .await
            .map_err(|source| ExportError::Database {
                stage,
                table: request.table.clone(),
                date: request.date,
                source,
            })
    }

    /// Enumerate one detached directory, then compress and upload its files
    /// on a bounded pool.
    async fn export_location(&self, request: &ExportRequest, directory: PathBuf) -> LocationReport {
        let mut files = Vec::new();
        let mut discovery_errors = Vec::new();

        for entry in classify(&directory, &request.root_directory) {
            match entry {
                Ok(file) => files.push(file),
                Err(e) => {
                    error!(path = %e.path().display(), error = %e, "Failed to enumerate file");
                    self.metrics.record_file_failed();
                    discovery_errors.push(e);
                }
            }
        }

        self.metrics.record_files_discovered(files.len());
        info!(
            directory = %directory.display(),
            files = files.len(),
            concurrency = self.options.upload_concurrency,
            "Exporting detached partition"
        );

        let mut outcomes: Vec<UploadOutcome> = stream::iter(files)
            .map(|file| self.export_file(file, &request.namespace_prefix))
            .buffer_unordered(self.options.upload_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.file.relative_path.cmp(&b.file.relative_path));

        let mut location = LocationReport::new(directory);
        location.outcomes = outcomes;
        location.discovery_errors = discovery_errors;
        location
    }

    async fn export_file(&self, file: ExportableFile, namespace_prefix: &str) -> UploadOutcome {
        let object_key = map_key(&file.upload_relative_path(), namespace_prefix);

        let prepared = match self.compressor.prepare(&file).await {
            Ok(prepared) => prepared,
            Err(e) => return self.file_failed(file, object_key, e),
        };

        match self.uploader.upload(&prepared.local_path, &object_key).await {
            Ok(bytes) => {
                self.metrics.record_file_uploaded(bytes);
                debug!(
                    path = %prepared.local_path.display(),
                    key = %object_key,
                    bytes = bytes,
                    compressed = prepared.compressed,
                    "Uploaded file"
                );
                UploadOutcome::uploaded(file, object_key, bytes)
            }
            Err(source) => {
                let error = FileError::Upload {
                    path: prepared.local_path,
                    key: object_key.to_string(),
                    source,
                };
                self.file_failed(file, object_key, error)
            }
        }
    }

    fn file_failed(
        &self,
        file: ExportableFile,
        object_key: ObjectKey,
        error: FileError,
    ) -> UploadOutcome {
        self.metrics.record_file_failed();
        error!(
            path = %file.local_path.display(),
            key = %object_key,
            error = %error,
            "Failed to export file"
        );
        UploadOutcome::failed(file, object_key, error)
    }

    async fn clean(&self, directory: &std::path::Path) -> CleanupStatus {
        match clean_directory(directory).await {
            Ok(()) => {
                self.metrics.record_directory_cleaned();
                CleanupStatus::Removed
            }
            Err(e) => {
                error!(
                    directory = %directory.display(),
                    error = %e,
                    "Failed to remove detached partition, export is already durable"
                );
                CleanupStatus::Failed(e)
            }
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState, request: &ExportRequest) {
    info!(
        table = %request.table,
        date = %request.date,
        from = %state,
        to = %next,
        "Pipeline state transition"
    );
    *state = next;
}
