//! Gzip compression of columnar files prior to upload.
//!
//! The compressed copy is written next to the original as `{name}.gz`. The
//! original is left untouched; it only disappears when the whole detached
//! directory is removed after a successful export.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::classifier::{ExportableFile, FileKind};
use crate::error::FileError;

/// Suffix appended to compressed files and their object keys
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Suffix of the scratch file a compression writes before it is persisted.
/// Scratch names are unique per compression, so a leftover from an
/// interrupted run is never reused.
const SCRATCH_SUFFIX: &str = ".tmp";

/// The local file that gets uploaded for an [`ExportableFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    pub local_path: PathBuf,
    pub relative_path: PathBuf,
    pub compressed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor {
    /// `level` is clamped to the gzip range 0..=9
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Compress columnar files, pass everything else through unchanged.
    pub async fn prepare(&self, file: &ExportableFile) -> Result<PreparedFile, FileError> {
        match file.kind {
            FileKind::Other => Ok(PreparedFile {
                local_path: file.local_path.clone(),
                relative_path: file.relative_path.clone(),
                compressed: false,
            }),
            FileKind::Columnar => {
                let local_path = self.compress(&file.local_path).await?;
                Ok(PreparedFile {
                    local_path,
                    relative_path: file.upload_relative_path(),
                    compressed: true,
                })
            }
        }
    }

    /// Write `{source}.gz` and return its path.
    ///
    /// Runs on the blocking pool. An existing `.gz` from an earlier run is
    /// replaced atomically.
    pub async fn compress(&self, source: &Path) -> Result<PathBuf, FileError> {
        let source = source.to_path_buf();
        let target = with_suffix(&source, COMPRESSED_SUFFIX);
        let level = self.level;

        let task_source = source.clone();
        let task_target = target.clone();
        let result =
            tokio::task::spawn_blocking(move || gzip_file(&task_source, &task_target, level))
                .await
                .map_err(io::Error::other)
                .and_then(|inner| inner);

        match result {
            Ok(bytes) => {
                tracing::debug!(
                    source = %source.display(),
                    target = %target.display(),
                    compressed_bytes = bytes,
                    "Compressed columnar file"
                );
                Ok(target)
            }
            Err(source_err) => Err(FileError::Compression {
                path: source,
                source: source_err,
            }),
        }
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Compress `source` into `target` via a scratch file in the same directory,
/// returning the compressed size. The scratch file is removed on failure.
fn gzip_file(source: &Path, target: &Path, level: Compression) -> io::Result<u64> {
    let mut input = BufReader::new(File::open(source)?);

    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default()
    );
    let scratch = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(SCRATCH_SUFFIX)
        .tempfile_in(directory)?;

    let mut encoder = GzEncoder::new(BufWriter::new(scratch), level);
    io::copy(&mut input, &mut encoder)?;
    let scratch = encoder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?;

    scratch.as_file().sync_all()?;
    let bytes = scratch.as_file().metadata()?.len();
    scratch.persist(target).map_err(|e| e.error)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut decoded = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn exportable(root: &Path, name: &str, contents: &[u8]) -> ExportableFile {
        let dir = root.join("t~1/2025-03-10.detached");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        ExportableFile::new(path, root).unwrap()
    }

    #[tokio::test]
    async fn test_columnar_file_is_compressed_alongside_original() {
        let root = TempDir::new().unwrap();
        let file = exportable(root.path(), "a.parquet", b"PAR1 columnar bytes PAR1");

        let prepared = Compressor::default().prepare(&file).await.unwrap();

        assert!(prepared.compressed);
        assert_eq!(prepared.local_path, with_suffix(&file.local_path, ".gz"));
        assert_eq!(
            prepared.relative_path,
            PathBuf::from("t~1/2025-03-10.detached/a.parquet.gz")
        );
        assert_eq!(gunzip(&prepared.local_path), b"PAR1 columnar bytes PAR1");
        // The source stays in place, byte for byte
        assert_eq!(fs::read(&file.local_path).unwrap(), b"PAR1 columnar bytes PAR1");
        assert_eq!(entries(file.local_path.parent().unwrap()), ["a.parquet", "a.parquet.gz"]);
    }

    #[tokio::test]
    async fn test_other_file_passes_through() {
        let root = TempDir::new().unwrap();
        let file = exportable(root.path(), "meta.txt", b"meta");

        let prepared = Compressor::default().prepare(&file).await.unwrap();

        assert!(!prepared.compressed);
        assert_eq!(prepared.local_path, file.local_path);
        assert_eq!(prepared.relative_path, file.relative_path);
        assert!(!with_suffix(&file.local_path, ".gz").exists());
    }

    #[tokio::test]
    async fn test_recompression_replaces_stale_output() {
        let root = TempDir::new().unwrap();
        let file = exportable(root.path(), "a.parquet", b"fresh");
        let target = with_suffix(&file.local_path, ".gz");
        fs::write(&target, b"truncated garbage from a crash").unwrap();

        Compressor::new(9).prepare(&file).await.unwrap();

        assert_eq!(gunzip(&target), b"fresh");
    }

    #[tokio::test]
    async fn test_stale_scratch_file_is_left_alone() {
        let root = TempDir::new().unwrap();
        let file = exportable(root.path(), "a.parquet", b"fresh");
        let dir = file.local_path.parent().unwrap().to_path_buf();
        fs::write(dir.join("a.parquet.gz.partial"), b"interrupted").unwrap();

        Compressor::default().prepare(&file).await.unwrap();

        assert_eq!(fs::read(dir.join("a.parquet.gz.partial")).unwrap(), b"interrupted");
        assert_eq!(gunzip(&dir.join("a.parquet.gz")), b"fresh");
        assert_eq!(
            entries(&dir),
            ["a.parquet", "a.parquet.gz", "a.parquet.gz.partial"]
        );
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let root = TempDir::new().unwrap();
        let file = exportable(root.path(), "a.parquet", b"same input every time");
        let compressor = Compressor::new(6);

        let first = compressor.compress(&file.local_path).await.unwrap();
        let first_bytes = fs::read(&first).unwrap();
        let second = compressor.compress(&file.local_path).await.unwrap();

        assert_eq!(first_bytes, fs::read(&second).unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_is_compression_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("gone.parquet");

        let err = Compressor::default().compress(&missing).await.unwrap_err();

        assert!(matches!(err, FileError::Compression { .. }));
        assert_eq!(err.path(), missing.as_path());
        assert!(!with_suffix(&missing, ".gz").exists());
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(Compressor::new(42).level, Compression::new(9));
        assert_eq!(Compressor::new(0).level, Compression::none());
    }
}
