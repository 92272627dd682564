//! # Schema Catalog
//!
//! Info documents live in JSON files that change rarely but are read on
//! every request, so parsed schemas are cached process-wide keyed by
//! dataset id. An entry remembers the backing file's modification time and
//! is re-parsed when the file changes.
//!
//! Lookup is double-checked: a read lock serves the common hit, and only a
//! miss or a stale entry takes the write lock, where freshness is checked
//! again before parsing (another request may have refreshed the entry while
//! this one waited). The catalog never holds per-request state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::schema::Schema;

struct Entry {
    schema: Arc<Schema>,
    mtime: SystemTime,
}

#[derive(Default)]
pub struct Catalog {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parsed schema for `id`, loading or refreshing from `path` as
    /// needed.
    pub fn get_or_load(&self, id: &str, path: &Path) -> Result<Arc<Schema>> {
        let mtime = fs::metadata(path)
            .and_then(|m| m.modified())
            .wrap_err_with(|| format!("stat {}", path.display()))?;

        if let Some(entry) = self.entries.read().get(id) {
            if entry.mtime == mtime {
                return Ok(entry.schema.clone());
            }
        }

        let mut entries = self.entries.write();
        // another request may have refreshed while we waited for the lock
        if let Some(entry) = entries.get(id) {
            if entry.mtime == mtime {
                return Ok(entry.schema.clone());
            }
        }
        tracing::debug!(dataset = %id, path = %path.display(), "loading schema");
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        let schema = Arc::new(
            Schema::from_json(&text).wrap_err_with(|| format!("dataset {:?}", id))?,
        );
        entries.insert(
            id.to_string(),
            Entry {
                schema: schema.clone(),
                mtime,
            },
        );
        Ok(schema)
    }

    /// Drop the cached entry for `id`, forcing a reload on next use.
    pub fn invalidate(&self, id: &str) {
        self.entries.write().remove(id);
    }
}

/// A catalog rooted at a directory of `<dataset id>.json` info documents.
pub struct DirectoryCatalog {
    root: PathBuf,
    catalog: Catalog,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: Catalog::new(),
        }
    }

    pub fn schema(&self, id: &str) -> Result<Arc<Schema>> {
        self.catalog
            .get_or_load(id, &self.root.join(format!("{}.json", id)))
    }
}
