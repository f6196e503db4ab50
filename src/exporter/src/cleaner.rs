//! Removal of exported detached partitions.
//!
//! The cleaner does not check anything itself. The pipeline only calls it
//! for a directory whose every file was uploaded.

use std::io;
use std::path::Path;

/// Recursively delete `directory`. A directory that is already gone counts
/// as removed, so a retried cleanup converges.
pub async fn clean_directory(directory: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(directory).await {
        Ok(()) => {
            tracing::info!(directory = %directory.display(), "Removed detached partition");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(
                directory = %directory.display(),
                "Detached partition already removed"
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_removes_tree() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("t~1/2025-03-10.detached");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.parquet"), b"a").unwrap();
        fs::write(dir.join("nested/b.txt"), b"b").unwrap();

        clean_directory(&dir).await.unwrap();

        assert!(!dir.exists());
        // The shard directory itself is left alone
        assert!(root.path().join("t~1").is_dir());
    }

    #[tokio::test]
    async fn test_missing_directory_is_success() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("t~1/2025-03-10.detached");

        clean_directory(&dir).await.unwrap();
        clean_directory(&dir).await.unwrap();
    }
}
