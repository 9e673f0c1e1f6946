//! Event system: emit / on / listen / Stream.

mod common;

use common::{run_ok, run};
use orchid::{ErrorKind, Value};
use pretty_assertions::assert_eq;

#[test]
fn handlers_run_in_registration_order() {
    let value = run_ok(
        "seen := []\n\
         on Ping as e:\n    \
             seen := seen + [\"first:\" * e.payload]\n\
         on Ping as e:\n    \
             seen := seen + [\"second:\" * e.payload]\n\
         emit Ping(\"x\")\n\
         seen\n",
    );
    assert_eq!(
        value,
        Value::list(vec![Value::string("first:x"), Value::string("second:x")])
    );
}

#[test]
fn registration_drains_buffered_payloads() {
    let value = run_ok(
        "emit Ping(\"1\")\n\
         emit Ping(\"2\")\n\
         seen := []\n\
         on Ping as e:\n    \
             seen := seen + [e.payload]\n\
         seen\n",
    );
    assert_eq!(
        value,
        Value::list(vec![Value::string("1"), Value::string("2")])
    );
}

#[test]
fn listen_returns_oldest_buffered_event() {
    let value = run_ok("emit A(\"first\")\nemit B(\"second\")\ne := listen()\ne.name\n");
    assert_eq!(value, Value::string("A"));
}

#[test]
fn listen_blocks_until_a_sibling_emits() {
    let value = run_ok(
        "macro send():\n    \
             emit Go(\"now\")\n    \
             return \"sent\"\n\
         r := fork:\n    \
             w: listen()\n    \
             s: send()\n\
         r.w.payload\n",
    );
    assert_eq!(value, Value::string("now"));
}

#[test]
fn emit_prefers_waiter_over_handler() {
    // The fork's listener wins; the handler never fires.
    let value = run_ok(
        "seen := []\n\
         on Go as e:\n    \
             seen := seen + [e.payload]\n\
         macro send():\n    \
             emit Go(\"now\")\n    \
             return \"sent\"\n\
         r := fork:\n    \
             w: listen()\n    \
             s: send()\n\
         len(seen)\n",
    );
    assert_eq!(value, Value::number(0.0));
}

#[test]
fn event_members() {
    let value = run_ok("emit Ping({code: 7})\ne := listen()\ne.payload.code\n");
    assert_eq!(value, Value::number(7.0));
}

#[test]
fn stream_is_idempotent_on_lists() {
    let value = run_ok("Stream(Stream([1, 2]))\n");
    assert_eq!(value, Value::list(vec![Value::number(1.0), Value::number(2.0)]));
}

#[test]
fn stream_wraps_scalars() {
    let value = run_ok("Stream(5)\n");
    assert_eq!(value, Value::list(vec![Value::number(5.0)]));
}

#[test]
fn stream_drains_only_the_named_buffer() {
    let value = run_ok(
        "emit A(\"1\")\n\
         emit B(\"2\")\n\
         a := Stream(\"A\")\n\
         b := Stream(\"B\")\n\
         len(a) + len(b)\n",
    );
    assert_eq!(value, Value::number(2.0));
    // Draining twice yields nothing the second time.
    let value = run_ok("emit A(\"1\")\nStream(\"A\")\nsecond := Stream(\"A\")\nlen(second)\n");
    assert_eq!(value, Value::number(0.0));
}

#[test]
fn handler_failure_propagates_from_emit() {
    let err = run(
        "on Ping as e:\n    \
             Error(\"handler boom\")\n\
         emit Ping(\"x\")\n",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UserError);
}
