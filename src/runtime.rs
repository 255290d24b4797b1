//! JS runtime host - one V8 isolate pre-loaded with the SSR script.
//!
//! The host exposes only what rendering needs:
//! - console.log/warn/error (captured, re-emitted through `tracing`)
//! - the polyfill bank evaluated ahead of the bundle
//! - no fs, net, env or module loading
//!
//! A `JsRuntime` is `!Send`; a host lives on the thread that created it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use deno_core::v8;
use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions};

use crate::error::RuntimeError;
use crate::ops::{ssr_runtime, ConsoleOutput};
use crate::sanitize::parse_props;

/// Configuration for one runtime host.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum V8 heap size in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for a single render in milliseconds (None = unlimited)
    pub render_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024),
            render_timeout_ms: Some(10_000),
        }
    }
}

/// Result of a render call.
#[derive(Debug)]
pub struct RenderOutput {
    pub html: String,
    pub console: ConsoleOutput,
}

pub struct JsHost {
    runtime: JsRuntime,
    watchdog: Option<Watchdog>,
    render_timeout_ms: Option<u64>,
    max_heap_size: Option<usize>,
    heap_exhausted: Arc<AtomicBool>,
    initialized: bool,
}

impl JsHost {
    pub fn new(config: &RuntimeConfig) -> Self {
        let create_params = config
            .max_heap_size
            .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![ssr_runtime::init_ops()],
            create_params,
            ..Default::default()
        });

        runtime.op_state().borrow_mut().put(ConsoleOutput::default());

        let watchdog = config
            .render_timeout_ms
            .map(|_| Watchdog::spawn(runtime.v8_isolate().thread_safe_handle()));

        let mut host = Self {
            runtime,
            watchdog,
            render_timeout_ms: config.render_timeout_ms,
            max_heap_size: config.max_heap_size,
            heap_exhausted: Arc::new(AtomicBool::new(false)),
            initialized: false,
        };
        if host.max_heap_size.is_some() {
            host.install_heap_guard();
        }
        host
    }

    /// Terminate the running script when the heap nears its limit.
    fn install_heap_guard(&mut self) {
        let handle = self.runtime.v8_isolate().thread_safe_handle();
        let exhausted = Arc::clone(&self.heap_exhausted);
        self.runtime
            .add_near_heap_limit_callback(move |current, initial| {
                tracing::warn!(
                    current_mb = current / (1024 * 1024),
                    initial_mb = initial / (1024 * 1024),
                    "Near heap limit, terminating script"
                );
                exhausted.store(true, Ordering::SeqCst);
                handle.terminate_execution();
                // Headroom for the isolate to unwind; reset in `recover_from_termination`.
                current + initial / 2
            });
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Evaluate the composed SSR script. Allowed exactly once.
    ///
    /// The script must define a global `render` function.
    pub fn initialize(&mut self, script: &str) -> Result<ConsoleOutput, RuntimeError> {
        if self.initialized {
            return Err(RuntimeError::AlreadyInitialized);
        }

        let result = self.runtime.execute_script("<ssr>", script.to_string());
        self.recover_from_termination();
        result.map_err(|e| RuntimeError::Eval(e.to_string()))?;

        let check = self
            .runtime
            .execute_script("<ssr-check>", "typeof globalThis.render === 'function'")
            .map_err(|e| RuntimeError::Eval(e.to_string()))?;
        let has_render = {
            let scope = &mut self.runtime.handle_scope();
            v8::Local::new(scope, &check).is_true()
        };
        if !has_render {
            return Err(RuntimeError::Eval(
                "script does not define a global `render` function".to_string(),
            ));
        }

        self.initialized = true;
        Ok(self.take_console())
    }

    /// Call `render(<props>)` and return the string form of its result.
    ///
    /// Promise results are awaited by driving the event loop.
    pub async fn render(&mut self, props_json: &str) -> Result<RenderOutput, RuntimeError> {
        if !self.initialized {
            return Err(RuntimeError::NotInitialized);
        }
        let props = parse_props(props_json)?;

        if let (Some(watchdog), Some(ms)) = (&self.watchdog, self.render_timeout_ms) {
            watchdog.arm(Duration::from_millis(ms));
        }
        let result = self.render_inner(&props).await;
        let timed_out = self.watchdog.as_ref().is_some_and(Watchdog::disarm);
        let terminated = self.recover_from_termination();

        let console = self.take_console();
        console.emit();

        if timed_out {
            return Err(RuntimeError::Timeout(self.render_timeout_ms.unwrap_or_default()));
        }
        if terminated {
            return Err(RuntimeError::Render("heap limit exceeded".to_string()));
        }

        result.map(|html| RenderOutput { html, console })
    }

    async fn render_inner(&mut self, props: &str) -> Result<String, RuntimeError> {
        let value = self
            .runtime
            .execute_script("<render>", format!("render({props})"))
            .map_err(|e| RuntimeError::Render(e.to_string()))?;

        self.runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
            .map_err(|e| RuntimeError::Render(e.to_string()))?;

        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, &value);

        match v8::Local::<v8::Promise>::try_from(local) {
            Ok(promise) => match promise.state() {
                v8::PromiseState::Fulfilled => Ok(promise.result(scope).to_rust_string_lossy(scope)),
                v8::PromiseState::Rejected => {
                    let exception = promise.result(scope);
                    Err(RuntimeError::Render(exception.to_rust_string_lossy(scope)))
                }
                v8::PromiseState::Pending => Err(RuntimeError::Render(
                    "render returned a promise that never settled".to_string(),
                )),
            },
            Err(_) => Ok(local.to_rust_string_lossy(scope)),
        }
    }

    /// Clear a pending termination so the isolate can run again.
    ///
    /// Returns true when the heap limit callback had fired.
    fn recover_from_termination(&mut self) -> bool {
        self.runtime.v8_isolate().cancel_terminate_execution();
        let exhausted = self.heap_exhausted.swap(false, Ordering::SeqCst);
        if exhausted {
            if let Some(max_bytes) = self.max_heap_size {
                // Collect what the failed script left behind, then drop the
                // raised limit back to the configured one.
                self.runtime.v8_isolate().low_memory_notification();
                self.runtime.remove_near_heap_limit_callback(max_bytes);
                self.install_heap_guard();
            }
        }
        exhausted
    }

    #[cfg(test)]
    fn heap_size_limit(&mut self) -> usize {
        let mut stats = v8::HeapStatistics::default();
        self.runtime.v8_isolate().get_heap_statistics(&mut stats);
        stats.heap_size_limit()
    }

    fn take_console(&mut self) -> ConsoleOutput {
        self.runtime
            .op_state()
            .borrow_mut()
            .try_borrow_mut::<ConsoleOutput>()
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct WatchState {
    deadline: Option<Instant>,
    fired: bool,
    shutdown: bool,
}

/// Terminates the isolate when an armed deadline passes.
///
/// Runs on its own thread: a synchronous script blocks the thread that owns
/// the runtime, so nothing on that thread could interrupt it.
struct Watchdog {
    shared: Arc<(Mutex<WatchState>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(handle: v8::IsolateHandle) -> Self {
        let shared = Arc::new((Mutex::new(WatchState::default()), Condvar::new()));
        let thread_shared = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("ssr-watchdog".to_string())
            .spawn(move || {
                let (lock, cvar) = &*thread_shared;
                let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
                while !state.shutdown {
                    let deadline = state.deadline;
                    state = match deadline {
                        None => cvar.wait(state).unwrap_or_else(PoisonError::into_inner),
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                handle.terminate_execution();
                                state.fired = true;
                                state.deadline = None;
                                state
                            } else {
                                cvar.wait_timeout(state, deadline - now)
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .0
                            }
                        }
                    };
                }
            })
            .ok();

        if thread.is_none() {
            tracing::warn!("Failed to spawn render watchdog; renders will not time out");
        }

        Self { shared, thread }
    }

    fn arm(&self, timeout: Duration) {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        state.deadline = Some(Instant::now() + timeout);
        state.fired = false;
        cvar.notify_one();
    }

    /// Cancel the deadline; returns whether it had already fired.
    fn disarm(&self) -> bool {
        let (lock, _) = &*self.shared;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        state.deadline = None;
        std::mem::take(&mut state.fired)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
            cvar.notify_one();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
