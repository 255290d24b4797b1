//! Command line and environment configuration.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::bundler::{BundleOptions, DEFAULT_TARGET};
use crate::error::ConfigError;
use crate::pool::PoolConfig;
use crate::props::DEFAULT_MESSAGE;
use crate::runtime::RuntimeConfig;

/// Server-side rendering of a JSX application
#[derive(Parser, Debug, Clone)]
#[command(name = "jsx-ssr")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(long, short = 'H', default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(long, short, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Entry module defining the global `render` function
    #[arg(long, default_value = "./web/ssr.jsx", env = "SSR_ENTRY")]
    pub ssr_entry: PathBuf,

    /// Entry module hydrating the page in the browser
    #[arg(long, default_value = "./web/hydrate.jsx", env = "HYDRATE_ENTRY")]
    pub hydrate_entry: PathBuf,

    /// Minify bundles and set NODE_ENV to "production"
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "SSR_PRODUCTION")]
    pub production: bool,

    /// ECMAScript target for bundled code
    #[arg(long, default_value = DEFAULT_TARGET, env = "SSR_TARGET")]
    pub target: String,

    /// Number of render workers (default: available parallelism)
    #[arg(long, env = "SSR_WORKERS")]
    pub workers: Option<usize>,

    /// Queued renders per worker before requests are rejected
    #[arg(long, default_value_t = 100, env = "SSR_MAX_PENDING")]
    pub max_pending: usize,

    /// Maximum time for one render in milliseconds
    #[arg(long, default_value_t = 10_000, env = "SSR_RENDER_TIMEOUT_MS")]
    pub render_timeout_ms: u64,

    /// V8 heap limit per worker in MiB (0 = unlimited)
    #[arg(long, default_value_t = 64, env = "SSR_MAX_HEAP_MB")]
    pub max_heap_mb: usize,

    /// Rebuild the hydration bundle on every request
    #[arg(long, env = "SSR_NO_BUNDLE_CACHE")]
    pub no_bundle_cache: bool,

    /// Message passed to the application as `props.message`
    #[arg(long, default_value = DEFAULT_MESSAGE, env = "SSR_MESSAGE")]
    pub message: String,

    /// Page title
    #[arg(long, default_value = "PAGE", env = "SSR_TITLE")]
    pub title: String,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            production: self.production,
            target: self.target.clone(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        })
    }

    pub fn pool_config(&self) -> Result<PoolConfig, ConfigError> {
        let max_heap_size = match self.max_heap_mb {
            0 => None,
            mb => Some(
                mb.checked_mul(1024 * 1024)
                    .ok_or(ConfigError::InvalidHeapSize(mb))?,
            ),
        };
        let runtime = RuntimeConfig {
            max_heap_size,
            render_timeout_ms: Some(self.render_timeout_ms),
        };
        PoolConfig::new(self.worker_count(), self.max_pending, runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("jsx-ssr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }

    #[test]
    fn test_flag_overrides() {
        let config = parse(&[
            "--port",
            "3000",
            "-H",
            "127.0.0.1",
            "--production",
            "false",
            "--workers",
            "2",
            "--max-heap-mb",
            "0",
            "--no-bundle-cache",
            "--target",
            "es2015",
        ]);

        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(!config.production);
        assert!(config.no_bundle_cache);
        assert_eq!(config.bundle_options().target, "es2015");

        let pool = config.pool_config().unwrap();
        assert_eq!(pool.worker_count, 2);
        assert_eq!(pool.runtime.max_heap_size, None);
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let config = parse(&["--workers", "0"]);
        assert_eq!(
            config.pool_config().unwrap_err(),
            ConfigError::InvalidWorkerCount
        );
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = parse(&["--render-timeout-ms", "0"]);
        assert_eq!(config.pool_config().unwrap_err(), ConfigError::InvalidTimeout);
    }

    #[test]
    fn test_oversized_heap_is_rejected() {
        let huge = usize::MAX.to_string();
        let config = parse(&["--max-heap-mb", &huge]);
        assert_eq!(
            config.pool_config().unwrap_err(),
            ConfigError::InvalidHeapSize(usize::MAX)
        );

        let config = parse(&["--max-heap-mb", "128"]);
        assert_eq!(
            config.pool_config().unwrap().runtime.max_heap_size,
            Some(128 * 1024 * 1024)
        );
    }
}
