//! JSX/ES module bundler.
//!
//! Turns an entry module and everything it imports into one self-contained
//! IIFE script that runs both in the embedded runtime and in browsers.
//!
//! ```rust,ignore
//! use jsx_ssr::bundler::{Bundler, BundleOptions};
//! use std::path::Path;
//!
//! let bundler = Bundler::new(BundleOptions::default())?;
//! let bundle = bundler.bundle(Path::new("./web/ssr.jsx"))?;
//! println!("{} bytes from {} files", bundle.code.len(), bundle.inputs.len());
//! ```

mod cache;
mod link;
mod minify;
mod resolve;
mod transform;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::BundleError;
use crate::polyfills::node_env;

pub use cache::BundleCache;
pub use resolve::{ModuleResolver, ResolvedModule};

use link::{LinkedModule, ModuleId};
use transform::{loader_for, Loader, ModuleTransformer};

/// Default ECMAScript target for emitted code.
pub const DEFAULT_TARGET: &str = "es2020";

/// Options fixed for the lifetime of a [`Bundler`].
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Minify the output and define `process.env.NODE_ENV` as `"production"`.
    pub production: bool,
    /// ECMAScript version the output is lowered to.
    pub target: String,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            production: true,
            target: DEFAULT_TARGET.to_string(),
        }
    }
}

/// A bundled script and the files it was built from.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub code: String,
    /// Every file read while bundling, entry first.
    pub inputs: Vec<PathBuf>,
}

pub struct Bundler {
    options: BundleOptions,
    resolver: ModuleResolver,
    transformer: ModuleTransformer,
}

impl Bundler {
    pub fn new(options: BundleOptions) -> Result<Self, BundleError> {
        let transformer = ModuleTransformer::new(&options.target)?;
        Ok(Self {
            options,
            resolver: ModuleResolver::new(),
            transformer,
        })
    }

    pub fn production(&self) -> bool {
        self.options.production
    }

    /// Bundle `entry` and its static dependency graph.
    pub fn bundle(&self, entry: &Path) -> Result<Bundle, BundleError> {
        let entry = entry.canonicalize().map_err(|source| BundleError::Io {
            path: entry.display().to_string(),
            source,
        })?;
        let root = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut graph = ModuleGraph::new(ResolvedModule::File(entry.clone()));
        let mut linked = Vec::new();

        while let Some((id, module)) = graph.pop_pending() {
            debug_assert_eq!(id, linked.len());
            let importer = module.path().to_path_buf();
            let body = self.load(&module, &mut |specifier| {
                graph.request(&self.resolver, specifier, &importer)
            })?;
            linked.push(LinkedModule {
                label: label_for(&root, module.path()),
                body,
            });
        }

        let mut code = link::assemble(&linked);
        if self.options.production {
            code = minify::minify(&entry.display().to_string(), &code)?;
        }
        if code.trim().is_empty() {
            return Err(BundleError::EmptyOutput(entry.display().to_string()));
        }

        tracing::debug!(
            entry = %entry.display(),
            modules = linked.len(),
            bytes = code.len(),
            production = self.options.production,
            "Bundled"
        );

        Ok(Bundle {
            code,
            inputs: graph.into_inputs(),
        })
    }

    fn load(
        &self,
        module: &ResolvedModule,
        request: &mut dyn FnMut(&str) -> Result<ModuleId, BundleError>,
    ) -> Result<String, BundleError> {
        let path = match module {
            ResolvedModule::Ignored(_) => return Ok(String::new()),
            ResolvedModule::File(path) => path,
        };

        let loader =
            loader_for(path).ok_or_else(|| BundleError::UnsupportedFile(path.display().to_string()))?;
        let source = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match loader {
            Loader::Json => json_module(path, &source),
            Loader::Js => {
                let transformed = self.transformer.transform(path, &source)?;
                link::link_module(
                    path,
                    &transformed.code,
                    transformed.source_type,
                    node_env(self.options.production),
                    request,
                )
            }
        }
    }
}

/// Bundle `path` with default options and the given production flag.
pub fn bundle_js(path: &Path, production: bool) -> Result<String, BundleError> {
    let bundler = Bundler::new(BundleOptions {
        production,
        ..BundleOptions::default()
    })?;
    Ok(bundler.bundle(path)?.code)
}

/// Modules discovered so far, numbered in discovery order.
struct ModuleGraph {
    modules: Vec<ResolvedModule>,
    ids: HashMap<PathBuf, ModuleId>,
    pending: VecDeque<ModuleId>,
}

impl ModuleGraph {
    fn new(entry: ResolvedModule) -> Self {
        let mut graph = Self {
            modules: Vec::new(),
            ids: HashMap::new(),
            pending: VecDeque::new(),
        };
        graph.insert(entry);
        graph
    }

    fn insert(&mut self, module: ResolvedModule) -> ModuleId {
        if let Some(&id) = self.ids.get(module.path()) {
            return id;
        }
        let id = self.modules.len();
        self.ids.insert(module.path().to_path_buf(), id);
        self.modules.push(module);
        self.pending.push_back(id);
        id
    }

    fn request(
        &mut self,
        resolver: &ModuleResolver,
        specifier: &str,
        importer: &Path,
    ) -> Result<ModuleId, BundleError> {
        let module = resolver.resolve(specifier, importer)?;
        Ok(self.insert(module))
    }

    fn pop_pending(&mut self) -> Option<(ModuleId, ResolvedModule)> {
        let id = self.pending.pop_front()?;
        Some((id, self.modules[id].clone()))
    }

    fn into_inputs(self) -> Vec<PathBuf> {
        self.modules
            .into_iter()
            .filter_map(|m| match m {
                ResolvedModule::File(path) => Some(path),
                ResolvedModule::Ignored(_) => None,
            })
            .collect()
    }
}

fn json_module(path: &Path, source: &str) -> Result<String, BundleError> {
    serde_json::from_str::<serde_json::Value>(source).map_err(|e| BundleError::Json {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(format!("module.exports = {};", source.trim()))
}

fn label_for(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
        .replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn dev_bundler() -> Bundler {
        Bundler::new(BundleOptions {
            production: false,
            ..BundleOptions::default()
        })
        .unwrap()
    }

    fn write_app(dir: &Path) {
        fs::write(
            dir.join("entry.jsx"),
            "import React from './react.js';\nimport { greet } from './greet';\nimport data from './data.json';\nglobalThis.out = greet(data.name);\n",
        )
        .unwrap();
        fs::write(
            dir.join("greet.js"),
            "export function greet(name) { return 'hi ' + name; }\n",
        )
        .unwrap();
        fs::write(dir.join("react.js"), "module.exports = { createElement() {} };\n").unwrap();
        fs::write(dir.join("data.json"), "{\"name\": \"rust\"}\n").unwrap();
    }

    #[test]
    fn test_bundle_is_iife_with_all_modules() {
        let dir = tempdir().unwrap();
        write_app(dir.path());

        let bundle = dev_bundler().bundle(&dir.path().join("entry.jsx")).unwrap();
        assert!(bundle.code.starts_with("(function () {"));
        assert!(bundle.code.contains("// entry.jsx"));
        assert!(bundle.code.contains("// greet.js"));
        assert!(bundle.code.contains("module.exports = {\"name\": \"rust\"};"));
        assert_eq!(bundle.inputs.len(), 4);
        assert!(bundle.inputs[0].ends_with("entry.jsx"));
    }

    #[test]
    fn test_bundling_is_deterministic() {
        let dir = tempdir().unwrap();
        write_app(dir.path());
        let entry = dir.path().join("entry.jsx");

        for production in [false, true] {
            let first = bundle_js(&entry, production).unwrap();
            let second = bundle_js(&entry, production).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_production_output_is_smaller() {
        let dir = tempdir().unwrap();
        write_app(dir.path());
        let entry = dir.path().join("entry.jsx");

        let dev = bundle_js(&entry, false).unwrap();
        let prod = bundle_js(&entry, true).unwrap();
        assert!(prod.len() < dev.len());
        assert!(!prod.contains("// greet.js"));
    }

    #[test]
    fn test_unresolved_import_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("entry.js"), "import x from './missing';\n").unwrap();

        let result = dev_bundler().bundle(&dir.path().join("entry.js"));
        assert!(matches!(result, Err(BundleError::Resolve { .. })));
    }

    #[test]
    fn test_missing_entry_fails() {
        let dir = tempdir().unwrap();
        let result = dev_bundler().bundle(&dir.path().join("nope.jsx"));
        assert!(matches!(result, Err(BundleError::Io { .. })));
    }

    #[test]
    fn test_unsupported_import_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("entry.js"), "import './style.css';\n").unwrap();
        fs::write(dir.path().join("style.css"), "body {}\n").unwrap();

        let result = dev_bundler().bundle(&dir.path().join("entry.js"));
        assert!(matches!(result, Err(BundleError::UnsupportedFile(_))));
    }

    #[test]
    fn test_invalid_json_module_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("entry.js"), "import d from './d.json';\n").unwrap();
        fs::write(dir.path().join("d.json"), "{ nope }").unwrap();

        let result = dev_bundler().bundle(&dir.path().join("entry.js"));
        assert!(matches!(result, Err(BundleError::Json { .. })));
    }

    #[test]
    fn test_shared_dependency_is_bundled_once() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("entry.js"),
            "import './a.js';\nimport './b.js';\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.js"), "import './shared.js';\n").unwrap();
        fs::write(dir.path().join("b.js"), "import './shared.js';\n").unwrap();
        fs::write(dir.path().join("shared.js"), "globalThis.count = (globalThis.count || 0) + 1;\n").unwrap();

        let bundle = dev_bundler().bundle(&dir.path().join("entry.js")).unwrap();
        assert_eq!(bundle.code.matches("// shared.js").count(), 1);
        assert_eq!(bundle.inputs.len(), 4);
    }
}
