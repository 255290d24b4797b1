//! Error types for bundling, JS evaluation and page assembly.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors produced while turning an entry module into a single script.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Could not resolve '{specifier}' from {importer}: {reason}")]
    Resolve {
        specifier: String,
        importer: String,
        reason: String,
    },

    #[error("Remote imports are not supported: {0}")]
    RemoteImport(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Syntax error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Transform failed for {path}: {message}")]
    Transform { path: String, message: String },

    #[error("Invalid JSON module {path}: {message}")]
    Json { path: String, message: String },

    #[error("No loader is configured for {0}")]
    UnsupportedFile(String),

    #[error("Invalid bundle target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Bundling {0} produced no output")]
    EmptyOutput(String),
}

/// Errors from the embedded JS runtime and the worker pool.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to evaluate SSR script: {0}")]
    Eval(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Failed to start SSR worker: {0}")]
    WorkerStart(#[source] std::io::Error),

    #[error("Invalid props: {0}")]
    InvalidProps(String),

    #[error("SSR runtime is not initialized")]
    NotInitialized,

    #[error("SSR runtime is already initialized")]
    AlreadyInitialized,

    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    #[error("Worker channel closed")]
    ChannelClosed,

    #[error("All SSR workers are busy")]
    Overloaded,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid pool or runtime configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("Render timeout must be positive")]
    InvalidTimeout,

    #[error("Worker queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("Heap limit of {0} MB is too large")]
    InvalidHeapSize(usize),
}

/// Page template substitution failure.
#[derive(Error, Debug)]
#[error("Failed to render page template: {0}")]
pub struct TemplateError(#[from] pub askama::Error);

/// Anything that can fail while serving a page.
///
/// Every variant answers `500 text/plain` with the error text.
#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Page render failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_start_failure_is_not_an_eval_error() {
        let error = RuntimeError::WorkerStart(std::io::Error::other("no threads left"));
        assert_eq!(
            error.to_string(),
            "Failed to start SSR worker: no threads left"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
