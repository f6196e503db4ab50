//! Locating detached partition directories on disk.
//!
//! After a partition is detached the database leaves it at
//! `{root}/{table}~{N}/{YYYY-MM-DD}.detached`, where `N` is assigned by the
//! storage engine and not known in advance. Any number of `{table}~*`
//! directories may carry a detached copy of the same day.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use glob::Pattern;

/// Suffix the database appends to detached partition directories
pub const DETACHED_SUFFIX: &str = ".detached";

/// Calendar day identifying the partition to export.
///
/// Callers are expected to only pass closed days; see
/// [`PartitionDate::is_closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionDate(NaiveDate);

impl PartitionDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse an ISO-8601 calendar date (`YYYY-MM-DD`)
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// A partition is closed once its day lies strictly before `today`
    pub fn is_closed(&self, today: NaiveDate) -> bool {
        self.0 < today
    }

    /// Name of the directory the database detaches this partition into
    pub fn detached_dir_name(&self) -> String {
        format!("{self}{DETACHED_SUFFIX}")
    }
}

impl From<NaiveDate> for PartitionDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for PartitionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Human-readable glob of the directories [`resolve_detached_dirs`] looks for
pub fn detached_pattern(root: &Path, table: &str, date: PartitionDate) -> String {
    root.join(format!("{table}~*"))
        .join(date.detached_dir_name())
        .display()
        .to_string()
}

/// Find every `{root}/{table}~*/{date}.detached` directory.
///
/// Returns an empty list when nothing matches, including when `root` itself
/// does not exist. Results are sorted. Table names are matched literally.
pub fn resolve_detached_dirs(
    root: &Path,
    table: &str,
    date: PartitionDate,
) -> io::Result<Vec<PathBuf>> {
    let table_pattern = Pattern::new(&format!("{}~*", Pattern::escape(table)))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(root = %root.display(), "Database root directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let detached_name = date.detached_dir_name();
    let mut matches = Vec::new();

    for entry in entries {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !table_pattern.matches(&name) {
            continue;
        }

        let candidate = entry.path().join(&detached_name);
        if candidate.is_dir() {
            matches.push(candidate);
        }
    }

    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn date(value: &str) -> PartitionDate {
        PartitionDate::parse(value).unwrap()
    }

    #[test]
    fn test_partition_date_formatting() {
        let d = date("2025-03-10");
        assert_eq!(d.to_string(), "2025-03-10");
        assert_eq!(d.detached_dir_name(), "2025-03-10.detached");
        assert!(PartitionDate::parse("10/03/2025").is_err());
    }

    #[test]
    fn test_partition_date_is_closed() {
        let d = date("2025-03-10");
        let today = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        assert!(d.is_closed(today));
        assert!(!d.is_closed(d.date()));
        assert!(!date("2025-03-12").is_closed(today));
    }

    #[test]
    fn test_pattern_rendering() {
        let pattern = detached_pattern(Path::new("/db"), "ecommerce_stats", date("2025-03-10"));
        assert_eq!(pattern, "/db/ecommerce_stats~*/2025-03-10.detached");
    }

    #[test]
    fn test_resolve_single_match() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("ecommerce_stats~42/2025-03-10.detached");
        fs::create_dir_all(&dir).unwrap();

        let found =
            resolve_detached_dirs(root.path(), "ecommerce_stats", date("2025-03-10")).unwrap();
        assert_eq!(found, vec![dir]);
    }

    #[test]
    fn test_resolve_multiple_shards_sorted() {
        let root = TempDir::new().unwrap();
        for shard in ["t~7", "t~12", "t~3"] {
            fs::create_dir_all(root.path().join(shard).join("2025-03-10.detached")).unwrap();
        }

        let found = resolve_detached_dirs(root.path(), "t", date("2025-03-10")).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| {
                p.parent()
                    .unwrap()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["t~12", "t~3", "t~7"]);
    }

    #[test]
    fn test_resolve_ignores_other_states_and_tables() {
        let root = TempDir::new().unwrap();
        let p = root.path();
        // Live partition, other day, other suffix, other table, sibling prefix
        fs::create_dir_all(p.join("t~1/2025-03-10")).unwrap();
        fs::create_dir_all(p.join("t~1/2025-03-09.detached")).unwrap();
        fs::create_dir_all(p.join("t~1/2025-03-10.detached.tmp")).unwrap();
        fs::create_dir_all(p.join("other~1/2025-03-10.detached")).unwrap();
        fs::create_dir_all(p.join("t_archive~1/2025-03-10.detached")).unwrap();
        // A plain file with the detached name is not a partition
        fs::create_dir_all(p.join("t~2")).unwrap();
        fs::write(p.join("t~2/2025-03-10.detached"), b"").unwrap();

        let found = resolve_detached_dirs(p, "t", date("2025-03-10")).unwrap();
        assert!(found.is_empty(), "unexpected matches: {found:?}");
    }

    #[test]
    fn test_resolve_matches_table_name_literally() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a[b]~1/2025-03-10.detached")).unwrap();
        fs::create_dir_all(root.path().join("ab~1/2025-03-10.detached")).unwrap();

        let found = resolve_detached_dirs(root.path(), "a[b]", date("2025-03-10")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with(root.path().join("a[b]~1")));
    }

    #[test]
    fn test_resolve_missing_root_is_empty() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");

        let found = resolve_detached_dirs(&missing, "t", date("2025-03-10")).unwrap();
        assert!(found.is_empty());
    }
}
