//! Enumerates the files of a detached partition.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::compressor::{COMPRESSED_SUFFIX, with_suffix};
use crate::error::FileError;

/// Suffix of files written by the columnar conversion
pub const COLUMNAR_SUFFIX: &str = ".parquet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Parquet data, gzip-compressed before upload
    Columnar,
    /// Anything else (metadata, symbol tables, leftovers), uploaded as-is
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let is_columnar = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(COLUMNAR_SUFFIX));

        if is_columnar {
            FileKind::Columnar
        } else {
            FileKind::Other
        }
    }
}

/// A file found under a detached partition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportableFile {
    pub local_path: PathBuf,
    /// Path relative to the database root, not to the shard directory
    pub relative_path: PathBuf,
    pub kind: FileKind,
}

impl ExportableFile {
    pub fn new(local_path: PathBuf, root: &Path) -> Result<Self, FileError> {
        let relative_path = local_path
            .strip_prefix(root)
            .map_err(|_| FileError::Filesystem {
                path: local_path.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not located under root {}", root.display()),
                ),
            })?
            .to_path_buf();
        let kind = FileKind::of(&local_path);

        Ok(Self {
            local_path,
            relative_path,
            kind,
        })
    }

    /// Relative path of the object that ends up in storage for this file
    pub fn upload_relative_path(&self) -> PathBuf {
        match self.kind {
            FileKind::Columnar => with_suffix(&self.relative_path, COMPRESSED_SUFFIX),
            FileKind::Other => self.relative_path.clone(),
        }
    }
}

/// Lazily walk `directory` and yield every file below it.
///
/// Directories are never yielded, entries come out in file-name order so
/// repeated walks of an unchanged tree agree. Entries that cannot be read are
/// yielded as errors and the walk carries on.
pub fn classify<'a>(
    directory: &Path,
    root: &'a Path,
) -> impl Iterator<Item = Result<ExportableFile, FileError>> + use<'a> {
    let fallback = directory.to_path_buf();

    WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => None,
            Ok(entry) => Some(ExportableFile::new(entry.into_path(), root)),
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| fallback.clone());
                Some(Err(FileError::Filesystem {
                    path,
                    source: io::Error::from(err),
                }))
            }
        })
}
