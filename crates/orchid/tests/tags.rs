//! Behavior-tag semantics: retry, fallback, best_effort, cached, private,
//! append, frozen, isolated, timeout.

mod common;

use std::{cell::Cell, rc::Rc, time::Duration};

use common::{echo_interp, failing_interp, run, run_ok, run_with};
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use orchid::{
    Asset, ErrorKind, GenerateFormat, Interp, Provider, ResolvedTag, RunResult, Value,
};
use pretty_assertions::assert_eq;

/// Provider whose `execute` fails the first `failures` calls, then succeeds.
struct FlakyProvider {
    remaining: Cell<u32>,
    calls: Cell<u32>,
}

impl FlakyProvider {
    fn new(failures: u32) -> Self {
        Self {
            remaining: Cell::new(failures),
            calls: Cell::new(0),
        }
    }
}

impl Provider for FlakyProvider {
    fn execute<'a>(
        &'a self,
        _operation: &'a str,
        input: &'a str,
        _context: &'a IndexMap<String, String>,
        _tags: &'a [ResolvedTag],
        _attachments: &'a [Rc<Asset>],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            self.calls.set(self.calls.get() + 1);
            if self.remaining.get() > 0 {
                self.remaining.set(self.remaining.get() - 1);
                return Err(orchid::OrchidError::new(ErrorKind::RuntimeError, "flaky"));
            }
            Ok(Value::string(format!("recovered: {input}")))
        })
    }

    fn search<'a>(&'a self, query: &'a str, _tags: &'a [ResolvedTag]) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move { Ok(Value::string(query.to_owned())) })
    }

    fn confidence<'a>(&'a self, _scope: Option<&'a str>) -> LocalBoxFuture<'a, RunResult<f64>> {
        Box::pin(async { Ok(1.0) })
    }

    fn tool_call<'a>(
        &'a self,
        _namespace: &'a str,
        _operation: &'a str,
        _args: &'a IndexMap<String, Value>,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async { Ok(Value::Null) })
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _format: GenerateFormat,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move { Ok(Value::string(prompt.to_owned())) })
    }
}

/// Provider that never answers in time.
struct SlowProvider;

impl Provider for SlowProvider {
    fn execute<'a>(
        &'a self,
        _operation: &'a str,
        _input: &'a str,
        _context: &'a IndexMap<String, String>,
        _tags: &'a [ResolvedTag],
        _attachments: &'a [Rc<Asset>],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Value::string("too late"))
        })
    }

    fn search<'a>(&'a self, _query: &'a str, _tags: &'a [ResolvedTag]) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Value::Null)
        })
    }

    fn confidence<'a>(&'a self, _scope: Option<&'a str>) -> LocalBoxFuture<'a, RunResult<f64>> {
        Box::pin(async { Ok(0.5) })
    }

    fn tool_call<'a>(
        &'a self,
        _namespace: &'a str,
        _operation: &'a str,
        _args: &'a IndexMap<String, Value>,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async { Ok(Value::Null) })
    }

    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _format: GenerateFormat,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async { Ok(Value::Null) })
    }
}

#[test]
fn retry_recovers_after_transient_failures() {
    let provider = Rc::new(FlakyProvider::new(2));
    let interp = Interp::builder().provider(provider.clone()).build();
    let value = run_with(&interp, "CoT(\"x\")<retry=3>\n").unwrap();
    assert_eq!(value, Value::string("recovered: x"));
    assert_eq!(provider.calls.get(), 3);
}

#[test]
fn bare_retry_defaults_to_three() {
    let (provider, interp) = failing_interp(&["CoT"]);
    let err = run_with(&interp, "CoT(\"x\")<retry>\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    // One initial call plus three retries.
    assert_eq!(provider.execute_count("CoT"), 4);
}

#[test]
fn best_effort_yields_null_on_terminal_failure() {
    let (_, interp) = failing_interp(&["Boom"]);
    let value = run_with(&interp, "Boom(\"x\")<best_effort>\n").unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn cached_memoizes_by_input_and_sorted_kwargs() {
    let (provider, interp) = echo_interp();
    run_with(&interp, "CoT(\"q\")<cached>\nCoT(\"q\")<cached>\n").unwrap();
    assert_eq!(provider.execute_count("CoT"), 1);

    let (provider, interp) = echo_interp();
    run_with(&interp, "CoT(\"a\")<cached>\nCoT(\"b\")<cached>\n").unwrap();
    assert_eq!(provider.execute_count("CoT"), 2);

    // Keyword order does not defeat the cache.
    let (provider, interp) = echo_interp();
    run_with(
        &interp,
        "Op(\"x\", b=1, a=2)<cached>\nOp(\"x\", a=2, b=1)<cached>\n",
    )
    .unwrap();
    assert_eq!(provider.execute_count("Op"), 1);
}

#[test]
fn pure_is_an_alias_for_cached() {
    let (provider, interp) = echo_interp();
    run_with(&interp, "CoT(\"q\")<pure>\nCoT(\"q\")<pure>\n").unwrap();
    assert_eq!(provider.execute_count("CoT"), 1);
}

#[test]
fn private_does_not_touch_the_context() {
    let value = run_ok("\"keep\"\nCoT(\"q\")<private>\n_\n");
    assert_eq!(value, Value::string("keep"));
}

#[test]
fn append_merges_into_the_context() {
    let value = run_ok("\"base\"\nNote(\"extra\")<append>\n_\n");
    assert_eq!(value, Value::string("base\n\n[Note] extra"));
}

#[test]
fn cached_composes_with_private() {
    let (provider, interp) = echo_interp();
    let value = run_with(&interp, "\"keep\"\nCoT(\"q\")<cached, private>\nCoT(\"q\")<cached, private>\n_\n").unwrap();
    assert_eq!(value, Value::string("keep"));
    assert_eq!(provider.execute_count("CoT"), 1);
}

#[test]
fn frozen_rejects_reassignment_and_merge() {
    let err = run("cfg := Fetch(\"c\")<frozen>\ncfg := 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
    let err = run("cfg := Fetch(\"c\")<frozen>\ncfg += 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
}

#[test]
fn isolated_empties_the_provider_context() {
    // The echo provider sizes list results from `_count` in its context;
    // `<isolated>` hides it.
    let value = run_ok("r := Brainstorm[5](\"x\")\nlen(r)\n");
    assert_eq!(value, Value::number(5.0));
    let value = run_ok("r := Brainstorm[5](\"x\")<isolated>\nlen(r)\n");
    assert_eq!(value, Value::number(3.0));
}

#[test]
fn timeout_interrupts_the_operation() {
    let interp = Interp::builder().provider(Rc::new(SlowProvider)).build();
    let err = run_with(&interp, "Slow(\"x\")<timeout=50>\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
}

#[test]
fn timeout_composes_with_fallback() {
    let interp = Interp::builder().provider(Rc::new(SlowProvider)).build();
    let value = run_with(&interp, "Slow(\"x\")<timeout=50, fallback=\"plan b\">\n").unwrap();
    assert_eq!(value, Value::string("plan b"));
}

#[test]
fn retry_does_not_absorb_unrelated_statements() {
    // The tag guards only the tagged operation; a later failure is untouched.
    let (provider, interp) = failing_interp(&["Late"]);
    let err = run_with(&interp, "Fine(\"a\")<retry=5>\nLate(\"b\")\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(provider.execute_count("Late"), 1);
}
