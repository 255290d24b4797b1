//! Ops exposed to the embedded runtime.
//!
//! Only console capture is provided; scripts get no filesystem, network or
//! environment access.

use deno_core::{op2, OpState};

/// Console output captured during one evaluation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    /// Re-emit captured lines through `tracing`.
    pub fn emit(&self) {
        for line in &self.logs {
            tracing::info!(target: "jsx_ssr::js", "{line}");
        }
        for line in &self.warns {
            tracing::warn!(target: "jsx_ssr::js", "{line}");
        }
        for line in &self.errors {
            tracing::error!(target: "jsx_ssr::js", "{line}");
        }
    }
}

#[op2(fast)]
pub fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

deno_core::extension!(
    ssr_runtime,
    ops = [op_console_log, op_console_warn, op_console_error],
);

