//! SSR worker thread management.
//!
//! Each worker runs in a dedicated thread with its own Tokio runtime
//! because `deno_core::JsRuntime` is not `Send`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::RuntimeError;
use crate::pool::PoolConfig;
use crate::runtime::{JsHost, RenderOutput};

/// Request sent to a worker for rendering.
pub struct RenderRequest {
    /// Props as a JSON document.
    pub props_json: String,
    /// Channel to send the result back.
    pub response_tx: oneshot::Sender<Result<RenderOutput, RuntimeError>>,
}

/// A dedicated SSR worker thread owning one [`JsHost`].
pub struct SsrWorker {
    request_tx: mpsc::Sender<RenderRequest>,
}

impl SsrWorker {
    /// Spawn a worker thread that initializes its host with `script`.
    ///
    /// The outcome of initialization is reported on `ready_tx`; the worker
    /// only starts taking requests after a successful report.
    pub fn spawn(
        id: usize,
        script: Arc<str>,
        config: Arc<PoolConfig>,
        ready_tx: oneshot::Sender<Result<(), RuntimeError>>,
    ) -> std::io::Result<Self> {
        let (request_tx, mut request_rx) = mpsc::channel::<RenderRequest>(config.max_pending);

        std::thread::Builder::new()
            .name(format!("ssr-worker-{id}"))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(RuntimeError::WorkerStart(e)));
                        return;
                    }
                };

                rt.block_on(async move {
                    let mut host = JsHost::new(&config.runtime);
                    match host.initialize(&script) {
                        Ok(console) => {
                            console.emit();
                            let _ = ready_tx.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    }

                    tracing::debug!(worker = id, "SSR worker started");

                    while let Some(req) = request_rx.recv().await {
                        let result = host.render(&req.props_json).await;
                        if let Err(e) = &result {
                            tracing::debug!(worker = id, error = %e, "Render failed");
                        }
                        // Receiver may have gone away with its request.
                        let _ = req.response_tx.send(result);
                    }

                    tracing::debug!(worker = id, "SSR worker shutting down");
                });
            })?;

        Ok(Self { request_tx })
    }

    /// Queue a request without waiting.
    pub fn try_send(
        &self,
        request: RenderRequest,
    ) -> Result<(), mpsc::error::TrySendError<RenderRequest>> {
        self.request_tx.try_send(request)
    }
}
