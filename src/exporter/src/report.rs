//! Per-run results of a partition export.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::classifier::ExportableFile;
use crate::error::{FileError, Stage};
use crate::keys::ObjectKey;
use crate::location::PartitionDate;

/// Where a pipeline run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Converting,
    Detaching,
    Exporting,
    CleaningUp,
    Done,
    Failed(Stage),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Converting => f.write_str("converting"),
            PipelineState::Detaching => f.write_str("detaching"),
            PipelineState::Exporting => f.write_str("exporting"),
            PipelineState::CleaningUp => f.write_str("cleaning up"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(stage) => write!(f, "failed while {stage}"),
        }
    }
}

/// Result of exporting one file.
#[derive(Debug)]
pub struct UploadOutcome {
    pub file: ExportableFile,
    pub object_key: ObjectKey,
    /// Bytes sent, zero unless the upload succeeded
    pub bytes: u64,
    pub error: Option<FileError>,
}

impl UploadOutcome {
    pub fn uploaded(file: ExportableFile, object_key: ObjectKey, bytes: u64) -> Self {
        Self {
            file,
            object_key,
            bytes,
            error: None,
        }
    }

    pub fn failed(file: ExportableFile, object_key: ObjectKey, error: FileError) -> Self {
        Self {
            file,
            object_key,
            bytes: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub enum CleanupStatus {
    /// Not attempted because some file of the location failed to export
    Skipped,
    Removed,
    Failed(io::Error),
}

/// Everything that happened to one detached directory.
#[derive(Debug)]
pub struct LocationReport {
    pub directory: PathBuf,
    pub outcomes: Vec<UploadOutcome>,
    /// Entries that could not be enumerated, these have no object key
    pub discovery_errors: Vec<FileError>,
    pub cleanup: CleanupStatus,
}

impl LocationReport {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            outcomes: Vec::new(),
            discovery_errors: Vec::new(),
            cleanup: CleanupStatus::Skipped,
        }
    }

    /// Every file of the directory was enumerated and uploaded
    pub fn is_exported(&self) -> bool {
        self.discovery_errors.is_empty() && self.outcomes.iter().all(UploadOutcome::is_success)
    }

    pub fn is_removed(&self) -> bool {
        matches!(self.cleanup, CleanupStatus::Removed)
    }
}

/// Aggregate result of one export run.
#[derive(Debug)]
pub struct ExportReport {
    pub table: String,
    pub date: PartitionDate,
    pub state: PipelineState,
    pub locations: Vec<LocationReport>,
}

impl ExportReport {
    pub fn new(table: impl Into<String>, date: PartitionDate) -> Self {
        Self {
            table: table.into(),
            date,
            state: PipelineState::Exporting,
            locations: Vec::new(),
        }
    }

    pub fn files_processed(&self) -> usize {
        self.locations.iter().map(|l| l.outcomes.len()).sum()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.locations
            .iter()
            .flat_map(|l| &l.outcomes)
            .map(|o| o.bytes)
            .sum()
    }

    /// Keys written by this run, sorted
    pub fn uploaded_keys(&self) -> Vec<&ObjectKey> {
        let mut keys: Vec<_> = self
            .locations
            .iter()
            .flat_map(|l| &l.outcomes)
            .filter(|o| o.is_success())
            .map(|o| &o.object_key)
            .collect();
        keys.sort();
        keys
    }

    /// Every per-file error of the run
    pub fn failures(&self) -> Vec<&FileError> {
        self.locations
            .iter()
            .flat_map(|l| {
                l.discovery_errors
                    .iter()
                    .chain(l.outcomes.iter().filter_map(|o| o.error.as_ref()))
            })
            .collect()
    }

    /// Local paths of the files that failed to export
    pub fn failed_files(&self) -> Vec<&Path> {
        self.failures().into_iter().map(FileError::path).collect()
    }

    /// Directories whose removal failed, with the cause
    pub fn cleanup_failures(&self) -> Vec<(&Path, &io::Error)> {
        self.locations
            .iter()
            .filter_map(|l| match &l.cleanup {
                CleanupStatus::Failed(e) => Some((l.directory.as_path(), e)),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(root: &Path, name: &str) -> ExportableFile {
        ExportableFile::new(root.join("t~1/2025-03-10.detached").join(name), root).unwrap()
    }

    fn key(name: &str) -> ObjectKey {
        crate::keys::map_key(&Path::new("t~1/2025-03-10.detached").join(name), "p")
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Done.to_string(), "done");
        assert_eq!(
            PipelineState::Failed(Stage::Exporting).to_string(),
            "failed while exporting"
        );
    }

    #[test]
    fn test_report_aggregation() {
        let root = Path::new("/db");
        let mut location = LocationReport::new(root.join("t~1/2025-03-10.detached"));
        location.outcomes.push(UploadOutcome::uploaded(
            file(root, "meta.txt"),
            key("meta.txt"),
            10,
        ));
        location.outcomes.push(UploadOutcome::failed(
            file(root, "a.parquet"),
            key("a.parquet.gz"),
            FileError::Compression {
                path: root.join("t~1/2025-03-10.detached/a.parquet"),
                source: io::Error::other("disk full"),
            },
        ));

        assert!(!location.is_exported());
        assert!(!location.is_removed());

        let mut report = ExportReport::new("t", PartitionDate::parse("2025-03-10").unwrap());
        report.locations.push(location);

        assert_eq!(report.files_processed(), 2);
        assert_eq!(report.bytes_uploaded(), 10);
        assert_eq!(report.uploaded_keys().len(), 1);
        assert_eq!(report.uploaded_keys()[0].as_str(), "p/t~1/2025-03-10.detached/meta.txt");
        assert_eq!(
            report.failed_files(),
            vec![Path::new("/db/t~1/2025-03-10.detached/a.parquet")]
        );
        assert!(report.cleanup_failures().is_empty());
        assert!(!report.is_success());
    }

    #[test]
    fn test_empty_location_is_exported() {
        let location = LocationReport::new(PathBuf::from("/db/t~1/2025-03-10.detached"));
        assert!(location.is_exported());
    }
}
