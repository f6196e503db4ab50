//! Object key layout: `{namespace_prefix}/{path relative to the database root}`.

use std::fmt;
use std::path::{Component, Path};

/// Destination key of an exported file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object store path for this key, keeping characters such as `~` verbatim
    pub fn to_path(&self) -> Result<object_store::path::Path, object_store::path::Error> {
        object_store::path::Path::parse(&self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Map a root-relative path to its object key.
///
/// Deterministic: the same path and prefix always give the same key, which is
/// what makes re-running an export overwrite rather than duplicate objects.
pub fn map_key(relative_path: &Path, namespace_prefix: &str) -> ObjectKey {
    let relative = relative_path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let prefix = namespace_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        ObjectKey(relative)
    } else {
        ObjectKey(format!("{prefix}/{relative}"))
    }
}
