//! End-to-end scenarios.

mod common;

use common::{as_str, echo_interp, failing_interp, run, run_ok, run_with};
use orchid::{ErrorKind, Value};
use pretty_assertions::assert_eq;

#[test]
fn assignment_yields_number() {
    assert_eq!(run_ok("x := 42\n"), Value::number(42.0));
}

#[test]
fn interpolation_sees_bindings() {
    let value = run_ok("name := \"world\"\ng := \"hello $name\"\n");
    assert_eq!(value, Value::string("hello world"));
}

#[test]
fn named_fork_returns_dict_with_isolated_queries() {
    let value = run_ok("data := fork:\n    a: Search(\"A\")\n    b: Search(\"B\")\n");
    let Value::Dict(entries) = &value else {
        panic!("expected dict, got {value:?}");
    };
    let keys: Vec<&String> = entries.keys().collect();
    assert_eq!(keys, vec!["a", "b"]);
    let a = as_str(&entries["a"]);
    let b = as_str(&entries["b"]);
    assert!(a.contains('A') && !a.contains('B'), "a = {a}");
    assert!(b.contains('B') && !b.contains('A'), "b = {b}");
}

#[test]
fn atomic_rollback_restores_outer_binding() {
    let value = run_ok(
        "x := \"before\"\n\
         try:\n    \
             ###\n    \
             x := \"inside\"\n    \
             assert false, \"boom\"\n    \
             ###\n\
         except:\n    \
             result := x\n\
         result\n",
    );
    assert_eq!(value, Value::string("before"));
}

#[test]
fn stream_drains_buffered_events_in_order() {
    let value = run_ok("emit E(\"1\")\nemit E(\"2\")\nevents := Stream(\"E\")\n");
    let Value::List(events) = &value else {
        panic!("expected list, got {value:?}");
    };
    assert_eq!(events.len(), 2);
    let Value::Event(first) = &events[0] else { panic!() };
    let Value::Event(second) = &events[1] else { panic!() };
    assert_eq!(first.name, "E");
    assert_eq!(first.payload, Value::string("1"));
    assert_eq!(second.name, "E");
    assert_eq!(second.payload, Value::string("2"));
}

#[test]
fn retry_exhaustion_uses_fallback_and_counts_attempts() {
    let (provider, interp) = failing_interp(&["CoT"]);
    let value = run_with(&interp, "CoT(\"x\")<retry=2, fallback=\"safe\">\n").unwrap();
    assert_eq!(value, Value::string("safe"));
    assert_eq!(provider.execute_count("CoT"), 3);
}

#[test]
fn string_division_removes_substring() {
    let value = run_ok("a := \"banana\"\nb := \"a\"\nc := a / b\n");
    assert_eq!(value, Value::string("bnn"));
}

#[test]
fn implicit_context_tracks_last_value() {
    assert_eq!(run_ok("x := 42\n_\n"), Value::number(42.0));
    // A private operation leaves `_` alone.
    let value = run_ok("x := 42\nCoT(\"q\")<private>\n_\n");
    assert_eq!(value, Value::number(42.0));
}

#[test]
fn pipe_feeds_the_implicit_context() {
    let value = run_ok("\"data\" >> Summarize(_)\n");
    assert_eq!(value, Value::string("[Summarize] data"));
    // Without an argument the operation reads the piped context itself.
    let value = run_ok("\"data\" >> Summarize()\n");
    assert_eq!(value, Value::string("[Summarize] data"));
}

#[test]
fn alternative_swallows_failures_and_nulls() {
    assert_eq!(run_ok("null | \"backup\"\n"), Value::string("backup"));
    let (_, interp) = failing_interp(&["Boom"]);
    let value = run_with(&interp, "Boom(\"x\") | \"safe\"\n").unwrap();
    assert_eq!(value, Value::string("safe"));
}

#[test]
fn merge_and_arithmetic_operators() {
    assert_eq!(run_ok("2 + 3\n"), Value::number(5.0));
    assert_eq!(run_ok("5 - 2\n"), Value::number(3.0));
    assert_eq!(run_ok("10 / 4\n"), Value::number(2.5));
    assert_eq!(run_ok("\"ab\" * \"cd\"\n"), Value::string("abcd"));
    assert_eq!(run_ok("\"a\" + \"b\"\n"), Value::string("a\n\nb"));
    // Mixed operand types collapse to null.
    assert_eq!(run_ok("5 * \"a\"\n"), Value::Null);
}

#[test]
fn semantic_subtraction_goes_through_the_provider() {
    let (provider, interp) = echo_interp();
    let value = run_with(&interp, "\"banana\" - \"na\"\n").unwrap();
    assert_eq!(value, Value::string("ba"));
    assert_eq!(provider.execute_count("Subtract"), 1);
}

#[test]
fn membership_checks() {
    assert_eq!(run_ok("\"a\" in [\"a\", \"b\"]\n"), Value::Bool(true));
    assert_eq!(run_ok("\"an\" in \"banana\"\n"), Value::Bool(true));
    assert_eq!(run_ok("\"k\" in {k: 1}\n"), Value::Bool(true));
    assert_eq!(run_ok("2 in 5\n"), Value::Bool(false));
}

#[test]
fn comparison_ordering() {
    assert_eq!(run_ok("2 < 3\n"), Value::Bool(true));
    assert_eq!(run_ok("\"apple\" < \"banana\"\n"), Value::Bool(true));
    let err = run("2 < \"a\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn macro_binding_and_defaults() {
    let source = "macro greet(name, punct=\"!\"):\n    return \"hello $name$punct\"\n";
    assert_eq!(
        run_ok(&format!("{source}greet(\"world\")\n")),
        Value::string("hello world!")
    );
    assert_eq!(
        run_ok(&format!("{source}greet(punct=\"?\", name=\"x\")\n")),
        Value::string("hello x?")
    );
    // Unbound parameters fall back to null.
    assert_eq!(
        run_ok("macro show(a, b):\n    return b\nshow(1)\n"),
        Value::Null
    );
}

#[test]
fn agents_behave_like_macros() {
    assert_eq!(
        run_ok("agent helper():\n    return \"done\"\nhelper()\n"),
        Value::string("done")
    );
}

#[test]
fn destructure_assignment_binds_elementwise() {
    let value = run_ok("[a, b] := [\"x\", \"y\", \"z\"]\nb\n");
    assert_eq!(value, Value::string("y"));
    let err = run("[a, b] := \"nope\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn for_requires_list_and_supports_break() {
    let err = run("for x in 5:\n    x\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    let value = run_ok(
        "total := 0\n\
         for x in [1, 2, 3, 4]:\n    \
             if x == 3:\n        \
                 break\n    \
             total := total + x\n\
         total\n",
    );
    assert_eq!(value, Value::number(3.0));
}

#[test]
fn while_is_capped() {
    let err = run("while true:\n    x := 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert!(err.message.contains("1000"));
}

#[test]
fn until_runs_body_then_tests() {
    let value = run_ok("i := 0\nuntil i >= 3:\n    i := i + 1\ni\n");
    assert_eq!(value, Value::number(3.0));
}

#[test]
fn until_exhaustion_policies() {
    let value = run_ok("until false <retry=2, fallback=\"gave up\">:\n    \"try\"\n");
    assert_eq!(value, Value::string("gave up"));
    let value = run_ok("until false <retry=2, best_effort>:\n    \"partial\"\n");
    assert_eq!(value, Value::string("partial"));
    let err = run("until false <retry=2>:\n    \"try\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
}

#[test]
fn len_builtin() {
    assert_eq!(run_ok("len([1, 2, 3])\n"), Value::number(3.0));
    assert_eq!(run_ok("len(\"hello\")\n"), Value::number(5.0));
    assert_eq!(run_ok("len({a: 1, b: 2})\n"), Value::number(2.0));
    assert_eq!(run_ok("len(42)\n"), Value::number(0.0));
}

#[test]
fn checkpoint_and_rollback() {
    let value = run_ok(
        "x := 1\n\
         Checkpoint(\"start\")\n\
         x := 2\n\
         Rollback(\"start\")\n\
         x\n",
    );
    assert_eq!(value, Value::number(1.0));
    let err = run("Rollback(\"missing\")\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
}

#[test]
fn elapsed_is_stringified_milliseconds() {
    let value = run_ok("Elapsed()\n");
    let text = as_str(&value);
    assert!(text.ends_with("ms"), "got {text}");
    assert!(text.trim_end_matches("ms").parse::<u64>().is_ok());
}

#[test]
fn error_builtin_raises_user_error() {
    let err = run("Error(\"boom\")\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UserError);
    assert_eq!(err.message, "boom");
}

#[test]
fn top_level_return_yields_value() {
    assert_eq!(run_ok("return 7\nError(\"unreachable\")\n"), Value::number(7.0));
}

#[test]
fn break_outside_loop_is_an_error() {
    let err = run("break\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
}

#[test]
fn member_and_index_access() {
    assert_eq!(run_ok("d := {a: {b: 2}}\nd.a.b\n"), Value::number(2.0));
    assert_eq!(run_ok("xs := [10, 20, 30]\nxs[1]\n"), Value::number(20.0));
    assert_eq!(run_ok("xs := [10, 20]\nxs[-1]\n"), Value::number(20.0));
    assert_eq!(run_ok("xs := [10]\nxs[5]\n"), Value::Null);
    assert_eq!(run_ok("\"abc\"[1]\n"), Value::string("b"));
    assert_eq!(run_ok("d := {a: 1}\nd.missing\n"), Value::Null);
}

#[test]
fn docstring_and_metadata_accepted() {
    let value = run_ok("@orchid\n@name pipeline\n\"\"\"doc\ntext\"\"\"\nx := 1\n");
    assert_eq!(value, Value::number(1.0));
}
