//! Error taxonomy for the export pipeline.
//!
//! Stage-level errors ([`ExportError`]) abort a run. Per-file errors
//! ([`FileError`]) are collected into the run report so that every discovered
//! file is attempted before the run decides whether it succeeded.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::location::PartitionDate;
use crate::report::ExportReport;

/// Pipeline stage that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Converting,
    Detaching,
    Exporting,
    CleaningUp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Converting => "converting",
            Stage::Detaching => "detaching",
            Stage::Exporting => "exporting",
            Stage::CleaningUp => "cleaning up",
        };
        f.write_str(name)
    }
}

/// Failure pushing a single file to object storage.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read local file: {0}")]
    Read(#[source] io::Error),
    #[error("invalid object key: {0}")]
    InvalidKey(#[from] object_store::path::Error),
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),
}

/// Failure exporting a single file. Never aborts sibling files.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compress {}: {source}", .path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to upload {} to {key}: {source}", .path.display())]
    Upload {
        path: PathBuf,
        key: String,
        #[source]
        source: UploadError,
    },
}

impl FileError {
    /// Local path the error refers to
    pub fn path(&self) -> &std::path::Path {
        match self {
            FileError::Filesystem { path, .. }
            | FileError::Compression { path, .. }
            | FileError::Upload { path, .. } => path,
        }
    }
}

/// Aggregate failure of a partition export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid {kind} identifier '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("{stage} failed for table {table} partition {date}: {source}")]
    Database {
        stage: Stage,
        table: String,
        date: PartitionDate,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to resolve detached partitions under {}: {source}", .root.display())]
    Resolve {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "{} file(s) failed to export for table {} partition {}",
        .report.failures().len(),
        .report.table,
        .report.date
    )]
    Export { report: ExportReport },

    #[error(
        "{} detached partition director(ies) could not be removed for table {} partition {}",
        .report.cleanup_failures().len(),
        .report.table,
        .report.date
    )]
    Cleanup { report: ExportReport },
}

impl ExportError {
    /// Stage at which the run stopped
    pub fn stage(&self) -> Stage {
        match self {
            // Rejected before the first statement is issued
            ExportError::InvalidIdentifier { .. } => Stage::Converting,
            ExportError::Database { stage, .. } => *stage,
            ExportError::Resolve { .. } | ExportError::Export { .. } => Stage::Exporting,
            ExportError::Cleanup { .. } => Stage::CleaningUp,
        }
    }

    /// Report of the run, present once the export stage was reached
    pub fn report(&self) -> Option<&ExportReport> {
        match self {
            ExportError::Export { report } | ExportError::Cleanup { report } => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Converting.to_string(), "converting");
        assert_eq!(Stage::CleaningUp.to_string(), "cleaning up");
    }

    #[test]
    fn test_database_error_reports_stage() {
        let date = PartitionDate::parse("2025-03-10").unwrap();
        let err = ExportError::Database {
            stage: Stage::Detaching,
            table: "ecommerce_stats".to_string(),
            date,
            source: sqlx::Error::Protocol("connection reset".to_string()),
        };

        assert_eq!(err.stage(), Stage::Detaching);
        assert!(err.report().is_none());
        let message = err.to_string();
        assert!(message.contains("detaching failed"));
        assert!(message.contains("2025-03-10"));
    }

    #[test]
    fn test_file_error_path() {
        let err = FileError::Compression {
            path: PathBuf::from("/db/t~1/2025-03-10.detached/a.parquet"),
            source: io::Error::other("disk full"),
        };
        assert_eq!(
            err.path(),
            std::path::Path::new("/db/t~1/2025-03-10.detached/a.parquet")
        );
        assert!(err.to_string().contains("disk full"));
    }
}
