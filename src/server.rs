//! HTTP surface: the page handler and the favicon stub.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::Html,
    routing::get,
    Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::bundler::{BundleCache, Bundler};
use crate::error::PageError;
use crate::page::render_page;
use crate::pool::SsrPool;
use crate::props::PropsProvider;

/// Shared state for the page handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<SsrPool>,
    /// Bundler for the hydration entry.
    pub bundler: Arc<Bundler>,
    /// None rebuilds the hydration bundle on every request.
    pub cache: Option<Arc<BundleCache>>,
    pub hydrate_entry: Arc<PathBuf>,
    pub props: Arc<dyn PropsProvider>,
    pub title: Arc<str>,
}

/// Create the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(render_page_handler))
        .route("/favicon.ico", get(favicon))
        .fallback(render_page_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Bundle hydration script, render the app, fill the page shell.
async fn render_page_handler(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Html<String>, PageError> {
    let javascript = hydration_bundle(&state).await?;

    let props = Value::Object(state.props.props(&uri)).to_string();

    let rendered = state.pool.render(props.clone()).await?;
    tracing::debug!(
        path = %uri.path(),
        html_bytes = rendered.html.len(),
        "Rendered app HTML"
    );

    let page = render_page(&state.title, &javascript, &rendered.html, &props)?;
    Ok(Html(page))
}

async fn hydration_bundle(state: &AppState) -> Result<Arc<str>, PageError> {
    let bundler = Arc::clone(&state.bundler);
    let cache = state.cache.clone();
    let entry = Arc::clone(&state.hydrate_entry);

    let bundle = tokio::task::spawn_blocking(move || match cache {
        Some(cache) => cache.get_or_bundle(&bundler, &entry),
        None => bundler.bundle(&entry).map(|bundle| Arc::from(bundle.code)),
    })
    .await
    .map_err(|e| PageError::Task(e.to_string()))??;

    Ok(bundle)
}
