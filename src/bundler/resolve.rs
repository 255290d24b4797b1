//! Module resolution for the bundler.
//!
//! Specifiers resolve on the local filesystem with browser-platform
//! conventions (`browser` field, `browser`/`import` export conditions).
//! Remote specifiers are rejected outright; nothing is ever fetched.

use std::path::{Path, PathBuf};

use oxc_resolver::{ResolveError, ResolveOptions, Resolver};

use crate::error::BundleError;

/// Extensions tried, in order, for extension-less specifiers.
const EXTENSIONS: &[&str] = &[".jsx", ".js", ".tsx", ".ts", ".mjs", ".cjs", ".json"];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModule {
    /// A file to load and bundle.
    File(PathBuf),
    /// A module mapped to `false` by a `browser` field; bundles as an empty module.
    Ignored(PathBuf),
}

impl ResolvedModule {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Ignored(path) => path,
        }
    }
}

/// Resolves import specifiers relative to the importing file.
pub struct ModuleResolver {
    resolver: Resolver,
}

impl ModuleResolver {
    pub fn new() -> Self {
        let options = ResolveOptions {
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            condition_names: ["browser", "import", "module", "default"]
                .into_iter()
                .map(String::from)
                .collect(),
            main_fields: ["browser", "module", "main"]
                .into_iter()
                .map(String::from)
                .collect(),
            alias_fields: vec![vec!["browser".to_string()]],
            ..ResolveOptions::default()
        };

        Self {
            resolver: Resolver::new(options),
        }
    }

    fn is_remote(specifier: &str) -> bool {
        specifier.starts_with("http://")
            || specifier.starts_with("https://")
            || specifier.starts_with("data:")
            || specifier.starts_with("blob:")
    }

    /// Resolve `specifier` as imported from the file at `importer`.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<ResolvedModule, BundleError> {
        if Self::is_remote(specifier) {
            return Err(BundleError::RemoteImport(specifier.to_string()));
        }

        let dir = importer.parent().unwrap_or_else(|| Path::new("/"));

        match self.resolver.resolve(dir, specifier) {
            Ok(resolution) => Ok(ResolvedModule::File(resolution.into_path_buf())),
            Err(ResolveError::Ignored(path)) => Ok(ResolvedModule::Ignored(path)),
            Err(e) => Err(BundleError::Resolve {
                specifier: specifier.to_string(),
                importer: importer.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}
