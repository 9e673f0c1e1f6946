//! Built-ins with host-observable behavior: Log, Trace, Cost, Confidence,
//! Generate, Save, Discover defaults, Checkpoint labels.

mod common;

use std::{cell::RefCell, fs, rc::Rc};

use common::{echo_interp, run_ok, run_with, runtime};
use orchid::{BufferPrint, ErrorKind, Interp, InterpOptions, MediaType, Value, parse};
use pretty_assertions::assert_eq;

#[test]
fn log_writes_through_the_print_writer() {
    let buffer = Rc::new(RefCell::new(BufferPrint::default()));
    let interp = Interp::builder().print(buffer.clone()).build();
    let program = parse("Log(\"hello\", 42)\n").unwrap();
    runtime().block_on(interp.run(&program)).unwrap();
    assert_eq!(buffer.borrow().lines, vec!["hello 42".to_owned()]);
}

#[test]
fn log_preserves_the_context() {
    assert_eq!(run_ok("\"keep\"\nLog(\"noise\")\n_\n"), Value::string("keep"));
}

#[test]
fn trace_returns_the_joined_log() {
    let (_, interp) = echo_interp();
    let value = run_with(&interp, "CoT(\"q\")\nTrace()\n").unwrap();
    let text = value.as_str().expect("string");
    assert!(text.contains("reasoning CoT"), "trace was: {text}");
}

#[test]
fn trace_depth_limits_entries() {
    let (_, interp) = echo_interp();
    let value = run_with(&interp, "A(\"1\")\nB(\"2\")\nC(\"3\")\nTrace(1)\n").unwrap();
    let text = value.as_str().expect("string");
    assert!(text.contains("reasoning C"));
    assert!(!text.contains("reasoning A"));
}

#[test]
fn cost_reports_the_session_meter() {
    let (_, interp) = echo_interp();
    let value = run_with(&interp, "CoT(\"q\")\nCost()\n").unwrap();
    let Value::Dict(entries) = &value else { panic!() };
    assert_eq!(entries["operations"], Value::number(1.0));
    assert_eq!(entries["tool_calls"], Value::number(0.0));
    assert!(entries.contains_key("elapsed_ms"));
}

#[test]
fn confidence_blends_to_the_provider_score_when_clean() {
    let (provider, interp) = echo_interp();
    provider.set_confidence(1.0);
    let value = run_with(&interp, "Confidence()\n").unwrap();
    assert_eq!(value, Value::number(1.0));
}

#[test]
fn generate_media_returns_an_asset() {
    let value = run_ok("Generate(\"a cat\", format=\"image\")\n");
    let Value::Asset(asset) = &value else {
        panic!("expected asset, got {value:?}");
    };
    assert_eq!(asset.media, MediaType::Image);
    assert_eq!(asset.description, "a cat");

    assert_eq!(run_ok("Generate(\"text\")\n"), Value::string("[generated] text"));

    let err = common::run("Generate(\"x\", format=\"hologram\")\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
}

#[test]
fn asset_inputs_travel_as_attachments() {
    // Piping an asset into an operation passes a description string input.
    let value = run_ok("Generate(\"a cat\", format=\"image\") >> Describe(_)\n");
    let text = value.as_str().expect("string");
    assert!(text.contains("[Describe]"), "got {text}");
    assert!(text.contains("a cat"), "got {text}");
}

#[test]
fn save_appends_and_returns_the_text() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let options = InterpOptions {
        save_path: Some(target.clone()),
        ..InterpOptions::default()
    };
    let interp = Interp::builder().options(options).build();
    let program = parse("Save(\"hello\")\nSave(\"again\")\n").unwrap();
    let value = runtime().block_on(interp.run(&program)).unwrap();
    assert_eq!(value, Value::string("again"));
    assert_eq!(fs::read_to_string(&target).unwrap(), "hello\nagain\n");
}

#[test]
fn save_defaults_to_the_implicit_context() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let options = InterpOptions {
        save_path: Some(target.clone()),
        ..InterpOptions::default()
    };
    let interp = Interp::builder().options(options).build();
    let program = parse("\"context text\"\nSave()\n").unwrap();
    runtime().block_on(interp.run(&program)).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "context text\n");
}

#[test]
fn checkpoint_uses_a_default_label() {
    let value = run_ok("x := 1\nCheckpoint()\nx := 2\nRollback()\nx\n");
    assert_eq!(value, Value::number(1.0));
}

#[test]
fn discover_includes_user_definitions() {
    let value = run_ok("macro my_helper(x):\n    return x\nDiscover(\"my_*\")\n");
    let Value::List(items) = &value else { panic!() };
    assert_eq!(items.as_slice(), &[Value::string("my_helper")]);
}
