//! Per-file transformation: TypeScript stripping, JSX and syntax lowering.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};

use crate::error::BundleError;

/// How a file is turned into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Json,
}

/// Pick a loader from the file extension.
pub fn loader_for(path: &Path) -> Option<Loader> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "mts" | "cts") => Some(Loader::Js),
        Some("json") => Some(Loader::Json),
        _ => None,
    }
}

/// Output of transforming one source file.
pub struct TransformedModule {
    pub code: String,
    /// Source type to re-parse `code` with: same module kind, plain JavaScript.
    pub source_type: SourceType,
}

/// Transforms JS/JSX/TS sources to plain JavaScript for the configured target.
pub struct ModuleTransformer {
    options: TransformOptions,
}

impl ModuleTransformer {
    /// `target` is an ECMAScript version such as `es2015` or `es2020`.
    pub fn new(target: &str) -> Result<Self, BundleError> {
        let mut options =
            TransformOptions::from_target(target).map_err(|reason| BundleError::InvalidTarget {
                target: target.to_string(),
                reason,
            })?;

        // Classic runtime: `React.createElement`, resolved through the module's own `React` import.
        options.jsx = JsxOptions {
            runtime: JsxRuntime::Classic,
            ..JsxOptions::default()
        };

        Ok(Self { options })
    }

    pub fn transform(&self, path: &Path, source: &str) -> Result<TransformedModule, BundleError> {
        let source_type = SourceType::from_path(path)
            .map_err(|_| BundleError::UnsupportedFile(path.display().to_string()))?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();
        if !parsed.errors.is_empty() {
            return Err(BundleError::Parse {
                path: path.display().to_string(),
                message: join_messages(&parsed.errors),
            });
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();

        let transformed = Transformer::new(&allocator, path, &self.options)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(BundleError::Transform {
                path: path.display().to_string(),
                message: join_messages(&transformed.errors),
            });
        }

        let code = Codegen::new().build(&program).code;

        Ok(TransformedModule {
            code,
            source_type: source_type.with_typescript(false).with_jsx(false),
        })
    }
}

fn join_messages<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
