//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use orchid::{EchoProvider, Interp, InterpOptions, RunResult, Value, parse};

/// Current-thread runtime with timers, matching how hosts drive the
/// interpreter.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

pub fn run_with(interp: &Interp, source: &str) -> RunResult<Value> {
    let program = parse(source)?;
    runtime().block_on(interp.run(&program))
}

/// Runs `source` on a default interpreter (echo provider, no MCP).
pub fn run(source: &str) -> RunResult<Value> {
    run_with(&Interp::new(InterpOptions::default()), source)
}

pub fn run_ok(source: &str) -> Value {
    run(source).expect("script should succeed")
}

/// An interpreter wired to an echo provider the test keeps a handle on.
pub fn echo_interp() -> (Rc<EchoProvider>, Interp) {
    let provider = Rc::new(EchoProvider::new());
    let interp = Interp::builder().provider(provider.clone()).build();
    (provider, interp)
}

pub fn failing_interp(ops: &[&str]) -> (Rc<EchoProvider>, Interp) {
    let provider = Rc::new(EchoProvider::failing(ops.iter().copied()));
    let interp = Interp::builder().provider(provider.clone()).build();
    (provider, interp)
}

pub fn as_str(value: &Value) -> &str {
    value.as_str().expect("expected a string value")
}
