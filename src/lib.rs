//! # jsx-ssr
//!
//! Server-side rendering of a JSX component tree.
//!
//! At startup the SSR entry is bundled into one script, prefixed with a small
//! polyfill bank and evaluated once in every worker of a pool of embedded V8
//! runtimes. Each request then:
//!
//! 1. bundles the hydration entry (cached until a source file changes),
//! 2. builds props for the request and renders them with the global
//!    `render` function on a pool worker,
//! 3. wraps the HTML, the props and the hydration script in a page shell.
//!
//! ## Sandbox
//!
//! - **No filesystem, network or environment access** from rendered code
//! - **No remote imports**: `http:`/`https:`/`data:` specifiers fail to bundle
//! - **Bounded renders**: per-render timeout and per-worker heap limit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jsx_ssr::{bundler::Bundler, compose_ssr_script, PoolConfig, SsrPool};
//!
//! let bundler = Bundler::new(Default::default())?;
//! let bundle = bundler.bundle("./web/ssr.jsx".as_ref())?;
//! let script = compose_ssr_script(&bundle.code, "production");
//!
//! let pool = SsrPool::start(PoolConfig::with_defaults(4)?, Arc::from(script)).await?;
//! let out = pool.render(r#"{"message":"hi"}"#.to_string()).await?;
//! println!("{}", out.html);
//! ```

pub mod bundler;
mod compose;
pub mod config;
pub mod error;
mod ops;
mod page;
mod polyfills;
mod pool;
mod props;
mod runtime;
mod sanitize;
pub mod server;
mod worker;

pub use compose::{compose_scripts, compose_ssr_script};
pub use error::{BundleError, ConfigError, PageError, RuntimeError, TemplateError};
pub use ops::ConsoleOutput;
pub use page::{escape_script, render_page};
pub use polyfills::{node_env, process_polyfill, CONSOLE_POLYFILL, TEXT_ENCODING_POLYFILL};
pub use pool::{PoolConfig, SsrPool};
pub use props::{Props, PropsProvider, StaticProps, DEFAULT_MESSAGE};
pub use runtime::{JsHost, RenderOutput, RuntimeConfig};
pub use sanitize::parse_props;
