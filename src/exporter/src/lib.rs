//! Partition Exporter Library
//!
//! Ships a closed day partition of a QuestDB table to object storage and
//! frees the local disk afterwards:
//! - Converts the partition to Parquet and detaches it from the table
//! - Finds the detached directories across all table shards
//! - Gzips Parquet files and uploads every file under a path-derived key
//! - Removes a detached directory only once all of its files are uploaded

pub mod classifier;
pub mod cleaner;
pub mod compressor;
pub mod database;
pub mod error;
pub mod keys;
pub mod location;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod uploader;

// Re-export commonly used types
pub use classifier::{ExportableFile, FileKind, classify};
pub use compressor::{Compressor, PreparedFile};
pub use database::{PartitionDatabase, PartitionStatements, PgPartitionDatabase};
pub use error::{ExportError, FileError, Stage, UploadError};
pub use keys::{ObjectKey, map_key};
pub use location::{PartitionDate, resolve_detached_dirs};
pub use metrics::{ExportMetrics, MetricsSummary};
pub use pipeline::{ExportRequest, ExporterOptions, PartitionExporter};
pub use report::{CleanupStatus, ExportReport, LocationReport, PipelineState, UploadOutcome};
pub use uploader::{ObjectStoreUploader, Uploader};
