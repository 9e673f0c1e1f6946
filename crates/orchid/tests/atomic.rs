//! Atomic block commit/rollback discipline.

mod common;

use common::run_ok;
use orchid::Value;
use pretty_assertions::assert_eq;

#[test]
fn commit_keeps_bindings_and_events() {
    let value = run_ok(
        "###\n\
         x := \"committed\"\n\
         emit E(\"kept\")\n\
         ###\n\
         events := Stream(\"E\")\n\
         x * \":\" + len(events)\n",
    );
    assert_eq!(value, Value::string("committed:\n\n1"));
}

#[test]
fn rollback_restores_event_buffer() {
    let value = run_ok(
        "emit E(\"before\")\n\
         try:\n    \
             ###\n    \
             emit E(\"inside\")\n    \
             Error(\"fail\")\n    \
             ###\n\
         except:\n    \
             \"caught\"\n\
         events := Stream(\"E\")\n\
         len(events)\n",
    );
    assert_eq!(value, Value::number(1.0));
}

#[test]
fn rollback_restores_handlers() {
    let value = run_ok(
        "seen := []\n\
         try:\n    \
             ###\n    \
             on Ping as e:\n        \
                 seen := seen + [e.payload]\n    \
             Error(\"fail\")\n    \
             ###\n\
         except:\n    \
             \"caught\"\n\
         emit Ping(\"after\")\n\
         len(seen)\n",
    );
    // The handler registered inside the failed block is gone; the emit
    // lands in the buffer instead.
    assert_eq!(value, Value::number(0.0));
}

#[test]
fn rollback_restores_checkpoints() {
    let value = run_ok(
        "try:\n    \
             ###\n    \
             Checkpoint(\"inner\")\n    \
             Error(\"fail\")\n    \
             ###\n\
         except:\n    \
             \"caught\"\n\
         try:\n    \
             Rollback(\"inner\")\n\
         except RuntimeError as e:\n    \
             missing := true\n\
         missing\n",
    );
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn rollback_restores_the_implicit_context() {
    let value = run_ok(
        "\"outer\"\n\
         try:\n    \
             ###\n    \
             \"inner\"\n    \
             Error(\"x\")\n    \
             ###\n\
         except:\n    \
             _\n",
    );
    assert_eq!(value, Value::string("outer"));
}

#[test]
fn return_from_atomic_still_commits() {
    let value = run_ok(
        "x := \"before\"\n\
         macro f():\n    \
             ###\n    \
             x := \"inside\"\n    \
             return \"early\"\n    \
             ###\n\
         r := f()\n\
         x * \"/\" * r\n",
    );
    assert_eq!(value, Value::string("inside/early"));
}

#[test]
fn nested_scope_writes_roll_back_along_the_chain() {
    let value = run_ok(
        "x := \"keep\"\n\
         macro f():\n    \
             ###\n    \
             x := \"clobbered\"\n    \
             Error(\"fail\")\n    \
             ###\n\
         try:\n    \
             f()\n\
         except:\n    \
             \"caught\"\n\
         x\n",
    );
    assert_eq!(value, Value::string("keep"));
}
