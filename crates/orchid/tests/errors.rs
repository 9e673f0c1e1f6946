//! Error-handling policy: except matching, finally, return propagation.

mod common;

use common::{run, run_ok};
use orchid::{ErrorKind, Value};
use pretty_assertions::assert_eq;

#[test]
fn except_matches_by_kind() {
    let value = run_ok(
        "caught := \"no\"\n\
         try:\n    \
             try:\n        \
                 Error(\"boom\")\n    \
             except TypeError:\n        \
                 caught := \"wrong\"\n\
         except UserError:\n    \
             caught := \"right\"\n\
         caught\n",
    );
    assert_eq!(value, Value::string("right"));
}

#[test]
fn unnamed_except_catches_any_kind() {
    let value = run_ok("try:\n    assert false\nexcept:\n    \"caught\"\n");
    assert_eq!(value, Value::string("caught"));
}

#[test]
fn except_binds_kind_and_message() {
    let value = run_ok(
        "try:\n    \
             assert false, \"boom\"\n\
         except ValidationError as e:\n    \
             e.kind * \":\" * e.message\n",
    );
    assert_eq!(value, Value::string("ValidationError:boom"));
}

#[test]
fn return_passes_through_except_arms() {
    let value = run_ok(
        "macro f():\n    \
             try:\n        \
                 return \"early\"\n    \
             except:\n        \
                 return \"caught\"\n\
         f()\n",
    );
    assert_eq!(value, Value::string("early"));
}

#[test]
fn finally_always_runs() {
    let value = run_ok(
        "r := \"none\"\n\
         try:\n    \
             try:\n        \
             	Error(\"original\")\n    \
             finally:\n        \
             	r := \"cleaned\"\n\
         except UserError as e:\n    \
             msg := e.message\n\
         msg * \"/\" * r\n",
    );
    assert_eq!(value, Value::string("original/cleaned"));
}

#[test]
fn finally_failure_does_not_mask_the_original_error() {
    let value = run_ok(
        "try:\n    \
             try:\n        \
                 Error(\"original\")\n    \
             finally:\n        \
                 Error(\"cleanup fails\")\n\
         except UserError as e:\n    \
             e.message\n",
    );
    assert_eq!(value, Value::string("original"));
}

#[test]
fn finally_runs_through_return() {
    let value = run_ok(
        "r := \"none\"\n\
         macro f():\n    \
             try:\n        \
                 return \"early\"\n    \
             finally:\n        \
                 r := \"cleaned\"\n\
         f() * \"/\" * r\n",
    );
    assert_eq!(value, Value::string("early/cleaned"));
}

#[test]
fn uncaught_errors_carry_kind_and_position() {
    let err = run("x := 1\nassert false, \"nope\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
    let pos = err.pos.expect("position");
    assert_eq!(pos.line, 2);
    let display = err.to_string();
    assert!(display.contains("ValidationError"), "{display}");
    assert!(display.contains("line 2"), "{display}");
}

#[test]
fn rethrow_when_no_arm_matches() {
    let err = run("try:\n    Error(\"boom\")\nexcept Timeout:\n    \"wrong\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UserError);
}
