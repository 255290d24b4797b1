//! SSR worker pool for concurrent rendering.
//!
//! The pool manages multiple worker threads, distributing render requests
//! using round-robin scheduling with backpressure support.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc::error::TrySendError, oneshot};

use crate::error::{ConfigError, RuntimeError};
use crate::runtime::{RenderOutput, RuntimeConfig};
use crate::worker::{RenderRequest, SsrWorker};

/// Configuration for the SSR worker pool (validated).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Queue capacity per worker before requests are rejected.
    pub max_pending: usize,
    pub runtime: RuntimeConfig,
}

impl PoolConfig {
    /// Create and validate pool config.
    pub fn new(
        worker_count: usize,
        max_pending: usize,
        runtime: RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if max_pending == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        if runtime.render_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            worker_count,
            max_pending,
            runtime,
        })
    }

    /// Create with defaults (100 pending, 10s timeout, 64MB heap).
    pub fn with_defaults(worker_count: usize) -> Result<Self, ConfigError> {
        Self::new(worker_count, 100, RuntimeConfig::default())
    }
}

/// A pool of SSR workers, each pre-loaded with the same script.
pub struct SsrPool {
    workers: Vec<SsrWorker>,
    next_worker: AtomicUsize,
}

impl SsrPool {
    /// Spawn the workers and wait until every one has evaluated `script`.
    ///
    /// Fails with the first initialization error; workers already started
    /// shut down when the pool is dropped.
    pub async fn start(config: PoolConfig, script: Arc<str>) -> Result<Self, RuntimeError> {
        let config = Arc::new(config);
        let mut workers = Vec::with_capacity(config.worker_count);
        let mut ready = Vec::with_capacity(config.worker_count);

        for id in 0..config.worker_count {
            let (ready_tx, ready_rx) = oneshot::channel();
            let worker = SsrWorker::spawn(id, Arc::clone(&script), Arc::clone(&config), ready_tx)
                .map_err(RuntimeError::WorkerStart)?;
            workers.push(worker);
            ready.push(ready_rx);
        }

        for (id, ready_rx) in ready.into_iter().enumerate() {
            ready_rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
            tracing::debug!(worker = id, "SSR worker ready");
        }

        tracing::info!(
            worker_count = workers.len(),
            max_pending = config.max_pending,
            script_bytes = script.len(),
            "SSR pool initialized"
        );

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Render HTML on the next worker with queue space.
    ///
    /// Returns `Overloaded` if every queue is full.
    pub async fn render(&self, props_json: String) -> Result<RenderOutput, RuntimeError> {
        let (response_tx, response_rx) = oneshot::channel();
        let mut request = RenderRequest {
            props_json,
            response_tx,
        };

        let start = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let mut any_open = false;
        let mut sent = false;

        for offset in 0..self.workers.len() {
            let worker = &self.workers[(start + offset) % self.workers.len()];
            match worker.try_send(request) {
                Ok(()) => {
                    sent = true;
                    break;
                }
                Err(TrySendError::Full(returned)) => {
                    any_open = true;
                    request = returned;
                }
                Err(TrySendError::Closed(returned)) => request = returned,
            }
        }

        if !sent {
            return Err(if any_open {
                RuntimeError::Overloaded
            } else {
                RuntimeError::ChannelClosed
            });
        }

        response_rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_ssr_script;

    fn script(app: &str) -> Arc<str> {
        Arc::from(compose_ssr_script(app, "production"))
    }

    #[test]
    fn test_pool_config_valid() {
        let config = PoolConfig::with_defaults(4).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_pending, 100);
        assert_eq!(config.runtime.render_timeout_ms, Some(10_000));
    }

    #[test]
    fn test_pool_config_invalid() {
        assert_eq!(
            PoolConfig::with_defaults(0).unwrap_err(),
            ConfigError::InvalidWorkerCount
        );
        assert_eq!(
            PoolConfig::new(1, 0, RuntimeConfig::default()).unwrap_err(),
            ConfigError::InvalidQueueCapacity
        );
        let zero_timeout = RuntimeConfig {
            render_timeout_ms: Some(0),
            ..RuntimeConfig::default()
        };
        assert_eq!(
            PoolConfig::new(1, 10, zero_timeout).unwrap_err(),
            ConfigError::InvalidTimeout
        );
    }

    #[tokio::test]
    async fn test_start_fails_without_render() {
        let result = SsrPool::start(PoolConfig::with_defaults(2).unwrap(), script("var x = 1;")).await;
        assert!(matches!(result, Err(RuntimeError::Eval(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renders_do_not_share_props() {
        let pool = Arc::new(
            SsrPool::start(
                PoolConfig::with_defaults(4).unwrap(),
                script(
                    "globalThis.render = async function (p) { await Promise.resolve(); return '<b>' + p.n + '</b>'; };",
                ),
            )
            .await
            .unwrap(),
        );
        assert_eq!(pool.worker_count(), 4);

        let handles: Vec<_> = (0..50)
            .map(|n| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let out = pool.render(format!("{{\"n\":{n}}}")).await.unwrap();
                    (n, out.html)
                })
            })
            .collect();

        for handle in handles {
            let (n, html) = handle.await.unwrap();
            assert_eq!(html, format!("<b>{n}</b>"));
        }
    }

    #[tokio::test]
    async fn test_overloaded_when_queues_are_full() {
        let config = PoolConfig::new(1, 1, RuntimeConfig::default()).unwrap();
        let pool = SsrPool::start(
            config,
            script(
                "globalThis.render = function () { var end = Date.now() + 300; while (Date.now() < end) {} return 'slow'; };",
            ),
        )
        .await
        .unwrap();

        // One render in progress plus one queued is the most a single worker accepts.
        let (a, b, c) = tokio::join!(
            pool.render("{}".to_string()),
            pool.render("{}".to_string()),
            pool.render("{}".to_string())
        );
        let results = [a, b, c];
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RuntimeError::Overloaded))));
        assert!(results.iter().any(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_timed_out_worker_keeps_serving() {
        let runtime = RuntimeConfig {
            render_timeout_ms: Some(200),
            ..RuntimeConfig::default()
        };
        let pool = SsrPool::start(
            PoolConfig::new(1, 10, runtime).unwrap(),
            script("globalThis.render = function (p) { while (p.spin) {} return 'ok'; };"),
        )
        .await
        .unwrap();

        assert!(matches!(
            pool.render(r#"{"spin":true}"#.to_string()).await,
            Err(RuntimeError::Timeout(200))
        ));
        assert_eq!(pool.render("{}".to_string()).await.unwrap().html, "ok");
    }
}
