//! In-memory cache of bundles, invalidated when any input file changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use super::Bundler;
use crate::error::BundleError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    entry: PathBuf,
    production: bool,
}

/// Modification time and size of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileSignature {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
}

impl FileSignature {
    fn read(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }

    fn is_current(&self) -> bool {
        FileSignature::read(&self.path).as_ref() == Some(self)
    }
}

struct CachedBundle {
    code: Arc<str>,
    signature: Vec<FileSignature>,
}

/// Bundles keyed by entry path and production flag.
///
/// A cached bundle is reused until one of the files it was built from is
/// modified, resized or removed.
#[derive(Default)]
pub struct BundleCache {
    entries: Mutex<HashMap<CacheKey, CachedBundle>>,
}

impl BundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_bundle(&self, bundler: &Bundler, entry: &Path) -> Result<Arc<str>, BundleError> {
        let key = CacheKey {
            entry: entry.to_path_buf(),
            production: bundler.production(),
        };

        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = entries.get(&key) {
                if cached.signature.iter().all(FileSignature::is_current) {
                    tracing::debug!(entry = %entry.display(), "Bundle cache hit");
                    return Ok(Arc::clone(&cached.code));
                }
            }
        }

        // Bundle outside the lock; concurrent misses for one entry may both build.
        let bundle = bundler.bundle(entry)?;
        let signature = bundle
            .inputs
            .iter()
            .filter_map(|path| FileSignature::read(path))
            .collect();
        let code: Arc<str> = Arc::from(bundle.code);

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                CachedBundle {
                    code: Arc::clone(&code),
                    signature,
                },
            );

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::BundleOptions;
    use std::fs;
    use tempfile::tempdir;

    fn dev_bundler() -> Bundler {
        Bundler::new(BundleOptions {
            production: false,
            ..BundleOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reuses_bundle_until_input_changes() {
        let dir = tempdir().unwrap();
        let entry = dir.path().join("entry.js");
        let dep = dir.path().join("dep.js");
        fs::write(&entry, "import { v } from './dep.js';\nglobalThis.v = v;\n").unwrap();
        fs::write(&dep, "export const v = 1;\n").unwrap();

        let cache = BundleCache::new();
        let bundler = dev_bundler();

        let first = cache.get_or_bundle(&bundler, &entry).unwrap();
        let second = cache.get_or_bundle(&bundler, &entry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Different length guarantees a new signature even on coarse mtimes.
        fs::write(&dep, "export const v = 12345;\n").unwrap();
        let third = cache.get_or_bundle(&bundler, &entry).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.contains("12345"));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let dir = tempdir().unwrap();
        let entry = dir.path().join("entry.js");
        fs::write(&entry, "import './later.js';\n").unwrap();

        let cache = BundleCache::new();
        let bundler = dev_bundler();
        assert!(cache.get_or_bundle(&bundler, &entry).is_err());

        fs::write(dir.path().join("later.js"), "globalThis.ok = true;\n").unwrap();
        assert!(cache.get_or_bundle(&bundler, &entry).is_ok());
    }
}
