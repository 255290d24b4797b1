//! Production minification of a linked bundle.

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc_mangler::MangleOptions;
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::error::BundleError;

/// Strip whitespace, mangle identifiers and compress syntax.
///
/// The bundle is a classic script (an IIFE), so only names inside it are
/// mangled; globals it assigns keep their names.
pub fn minify(label: &str, source: &str) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(BundleError::Parse {
            path: label.to_string(),
            message: error.to_string(),
        });
    }
    let mut program = parsed.program;

    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let minified = Minifier::new(options).minify(&allocator, &mut program);

    let codegen_options = CodegenOptions {
        minify: true,
        comments: CommentOptions::disabled(),
        ..CodegenOptions::default()
    };

    Ok(Codegen::new()
        .with_options(codegen_options)
        .with_scoping(minified.scoping)
        .build(&program)
        .code)
}
