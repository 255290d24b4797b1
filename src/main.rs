//! jsx-ssr server
//!
//!   jsx-ssr [--port 8080] [--ssr-entry ./web/ssr.jsx] [--hydrate-entry ./web/hydrate.jsx]
//!
//! Every flag can also be set through its environment variable; see `--help`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jsx_ssr::bundler::{BundleCache, Bundler};
use jsx_ssr::config::Config;
use jsx_ssr::server::{create_app, AppState};
use jsx_ssr::{compose_ssr_script, node_env, SsrPool, StaticProps};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsx_ssr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bundler = Arc::new(Bundler::new(config.bundle_options())?);

    let ssr_bundle = {
        let bundler = Arc::clone(&bundler);
        let entry = config.ssr_entry.clone();
        tokio::task::spawn_blocking(move || bundler.bundle(&entry))
            .await?
            .with_context(|| format!("failed to bundle {}", config.ssr_entry.display()))?
    };
    let script = compose_ssr_script(&ssr_bundle.code, node_env(config.production));
    tracing::info!(
        entry = %config.ssr_entry.display(),
        bytes = script.len(),
        production = config.production,
        "Bundled SSR script"
    );

    let pool = SsrPool::start(config.pool_config()?, Arc::from(script))
        .await
        .context("failed to evaluate SSR script")?;

    let state = AppState {
        pool: Arc::new(pool),
        bundler,
        cache: (!config.no_bundle_cache).then(|| Arc::new(BundleCache::new())),
        hydrate_entry: Arc::new(config.hydrate_entry.clone()),
        props: Arc::new(StaticProps::message(config.message.clone())),
        title: Arc::from(config.title.as_str()),
    };

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Serving at http://{}", listener.local_addr()?);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
