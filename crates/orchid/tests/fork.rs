//! Fork semantics: result shapes, ordering, context isolation, failure.

mod common;

use common::{failing_interp, run_ok, run_with};
use orchid::Value;
use pretty_assertions::assert_eq;

#[test]
fn unnamed_fork_returns_list_in_branch_order() {
    let value = run_ok("r := fork:\n    Search(\"one\")\n    Search(\"two\")\nr\n");
    assert_eq!(
        value,
        Value::list(vec![
            Value::string("results for one"),
            Value::string("results for two"),
        ])
    );
}

#[test]
fn fork_for_maps_elements_in_order() {
    let value = run_ok(
        "items := [\"a\", \"b\", \"c\"]\n\
         results := fork[2]:\n    \
             for item in items:\n        \
                 Process(item)\n\
         results\n",
    );
    assert_eq!(
        value,
        Value::list(vec![
            Value::string("[Process] a"),
            Value::string("[Process] b"),
            Value::string("[Process] c"),
        ])
    );
}

#[test]
fn fork_result_replaces_the_context() {
    let value = run_ok("fork:\n    a: Search(\"A\")\n    b: Search(\"B\")\n_\n");
    let Value::Dict(entries) = &value else {
        panic!("expected dict, got {value:?}");
    };
    assert_eq!(entries.len(), 2);
}

#[test]
fn branches_keep_private_contexts() {
    let value = run_ok(
        "data := fork:\n    \
             a: \"A\" >> Tag(_)\n    \
             b: \"B\" >> Tag(_)\n\
         data\n",
    );
    let Value::Dict(entries) = &value else { panic!() };
    assert_eq!(entries["a"], Value::string("[Tag] A"));
    assert_eq!(entries["b"], Value::string("[Tag] B"));
}

#[test]
fn failing_branch_fails_the_fork() {
    let (_, interp) = failing_interp(&["Boom"]);
    let value = run_with(
        &interp,
        "outcome := \"none\"\n\
         try:\n    \
             fork:\n        \
                 a: Boom(\"x\")\n        \
                 b: Search(\"y\")\n\
         except RuntimeError as e:\n    \
             outcome := e.message\n\
         outcome\n",
    )
    .unwrap();
    let text = value.as_str().expect("string");
    assert!(text.contains("Boom"), "got {text}");
}

#[test]
fn fork_for_requires_a_list() {
    let err = common::run("fork:\n    for x in 5:\n        x\n").unwrap_err();
    assert_eq!(err.kind, orchid::ErrorKind::TypeError);
}

#[test]
fn branch_starts_from_the_callers_context() {
    let value = run_ok(
        "\"seed\"\n\
         r := fork:\n    \
             a: Summarize()\n\
         r.a\n",
    );
    // No argument: the branch's local context starts from the caller's.
    assert_eq!(value, Value::string("[Summarize] seed"));
}
