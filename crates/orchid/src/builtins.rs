//! Distinguished built-in operations.
//!
//! These names short-circuit reasoning-macro dispatch: `Search`,
//! `Confidence`, `Checkpoint`, `Rollback`, `Trace`, `Cost`, `Elapsed`,
//! `Log`, `Error`, `Save`, `len`, `Discover`, `Generate`, plus the
//! `MCP`/`Plugin` availability probes used by `require`.
//!
//! Reporting utilities (`Log`, `Trace`, `Checkpoint`, `Rollback`, `Save`,
//! `Cost`) leave the implicit context alone; data-producing built-ins
//! update it like any operation.

use std::str::FromStr;

use indexmap::IndexMap;
use regex::Regex;

use crate::{
    env::ScopeId,
    error::{Control, ErrorKind, Flow, raise},
    interp::{Interp, ResolvedArgs, SavedCheckpoint},
    provider::{GenerateFormat, ResolvedTag},
    token::Pos,
    value::Value,
};

/// All distinguished built-in names, also the built-in slice of the
/// `Discover` candidate set.
pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "Search",
    "Confidence",
    "Checkpoint",
    "Rollback",
    "Trace",
    "Cost",
    "Elapsed",
    "Log",
    "Error",
    "Save",
    "len",
    "Discover",
    "Generate",
    "MCP",
    "Plugin",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Whether a successful call updates the implicit context by default.
pub(crate) fn updates_context(name: &str) -> bool {
    !matches!(
        name,
        "Checkpoint" | "Rollback" | "Trace" | "Cost" | "Log" | "Error" | "Save" | "MCP" | "Plugin"
    )
}

pub(crate) async fn call(
    interp: &Interp,
    name: &str,
    args: ResolvedArgs,
    tags: Vec<ResolvedTag>,
    pos: Pos,
    scope: ScopeId,
) -> Flow<Value> {
    match name {
        "Search" => {
            let query = args
                .positional
                .first()
                .map_or_else(|| interp.get_ctx().display(), Value::display);
            interp.meter.borrow_mut().operations += 1;
            interp
                .provider
                .search(&query, &tags)
                .await
                .map_err(|err| Control::Raise(err.at(pos)))
        }
        "Confidence" => confidence(interp, &args).await,
        "Checkpoint" => {
            let label = label_of(&args);
            let snapshot = SavedCheckpoint {
                bindings: interp.scopes.borrow().own_bindings(scope),
                ctx: interp.get_ctx(),
            };
            interp.checkpoints.borrow_mut().insert(label.clone(), snapshot);
            interp.trace(format!("checkpoint '{label}'"));
            Ok(Value::Null)
        }
        "Rollback" => {
            let label = label_of(&args);
            let Some(snapshot) = interp.checkpoints.borrow().get(&label).cloned() else {
                return raise(
                    ErrorKind::RuntimeError,
                    format!("no checkpoint labeled '{label}'"),
                    pos,
                );
            };
            interp
                .scopes
                .borrow_mut()
                .restore_bindings(scope, snapshot.bindings);
            interp.set_ctx(snapshot.ctx);
            interp.trace(format!("rollback to '{label}'"));
            Ok(Value::Null)
        }
        "Trace" => {
            let depth = args
                .positional
                .first()
                .and_then(Value::as_number)
                .map(|n| n as usize);
            let text = interp.tracer.borrow().render(depth);
            for line in text.lines() {
                interp.print.borrow_mut().print_line(line);
            }
            Ok(Value::string(text))
        }
        "Cost" => {
            let meter = *interp.meter.borrow();
            let mut entries = IndexMap::new();
            entries.insert("operations".to_owned(), Value::number(meter.operations as f64));
            entries.insert("tool_calls".to_owned(), Value::number(meter.tool_calls as f64));
            entries.insert(
                "elapsed_ms".to_owned(),
                Value::number(interp.started.elapsed().as_millis() as f64),
            );
            Ok(Value::dict(entries))
        }
        "Elapsed" => Ok(Value::string(format!(
            "{}ms",
            interp.started.elapsed().as_millis()
        ))),
        "Log" => {
            let line = args
                .positional
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(" ");
            interp.print.borrow_mut().print_line(&line);
            Ok(Value::Null)
        }
        "Error" => {
            let message = args
                .positional
                .first()
                .map_or_else(|| "error".to_owned(), Value::display);
            raise(ErrorKind::UserError, message, pos)
        }
        "Save" => save(interp, &args, pos),
        "len" => {
            let length = match args.positional.first() {
                Some(Value::List(items)) => items.len(),
                Some(Value::Str(text)) => text.chars().count(),
                Some(Value::Dict(entries)) => entries.len(),
                _ => 0,
            };
            Ok(Value::number(length as f64))
        }
        "Discover" => discover(interp, &args, pos),
        "Generate" => generate(interp, &args, &tags, pos).await,
        "MCP" => {
            let target = args
                .positional
                .first()
                .map_or_else(String::new, Value::display);
            Ok(Value::Bool(interp.mcp_available(&target)))
        }
        "Plugin" => {
            let target = args
                .positional
                .first()
                .map_or_else(String::new, Value::display);
            Ok(Value::Bool(interp.plugin_available(&target)))
        }
        _ => raise(
            ErrorKind::RuntimeError,
            format!("unknown builtin '{name}'"),
            pos,
        ),
    }
}

fn label_of(args: &ResolvedArgs) -> String {
    args.positional
        .first()
        .map_or_else(|| "default".to_owned(), Value::display)
}

/// Provider confidence blended, with equal weight, against the session's
/// observable success ratio, clamped to `[0, 1]`.
async fn confidence(interp: &Interp, args: &ResolvedArgs) -> Flow<Value> {
    let scope_arg = args.positional.first().map(Value::display);
    let provider_score = interp
        .provider
        .confidence(scope_arg.as_deref())
        .await
        .map_err(Control::Raise)?;
    let meter = *interp.meter.borrow();
    let mut total = provider_score;
    let mut weights = 1.0;
    if meter.attempts > 0 {
        total += 1.0 - meter.failures as f64 / meter.attempts as f64;
        weights += 1.0;
    }
    Ok(Value::number((total / weights).clamp(0.0, 1.0)))
}

fn save(interp: &Interp, args: &ResolvedArgs, pos: Pos) -> Flow<Value> {
    let content = args
        .positional
        .first()
        .map_or_else(|| interp.get_ctx().display(), Value::display);
    let target = interp.options.save_target();
    let write = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&target)
        .and_then(|mut file| {
            use std::io::Write as _;
            writeln!(file, "{content}")
        });
    if let Err(err) = write {
        return raise(
            ErrorKind::RuntimeError,
            format!("Save failed ({}): {err}", target.display()),
            pos,
        );
    }
    interp.trace(format!("saved {} bytes to {}", content.len(), target.display()));
    Ok(Value::string(content))
}

/// Glob over everything the session can call: namespace aliases,
/// `alias.tool` / `alias.operation` pairs, built-ins, and user macros and
/// agents. Case-insensitive, duplicate-free, sorted.
fn discover(interp: &Interp, args: &ResolvedArgs, pos: Pos) -> Flow<Value> {
    let pattern = args
        .positional
        .first()
        .map_or_else(|| "*".to_owned(), Value::display);
    // The default pattern lists everything, dotted names included, so that
    // `Discover("*")` is a superset of any narrower glob.
    let regex = if pattern == "*" {
        None
    } else {
        match glob_regex(&pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                return raise(
                    ErrorKind::ValidationError,
                    format!("invalid Discover pattern '{pattern}': {err}"),
                    pos,
                );
            }
        }
    };
    let mut candidates: Vec<String> = Vec::new();
    for (alias, canonical) in interp.aliases.borrow().iter() {
        candidates.push(alias.clone());
        for tool in interp.mcp.get_tools(canonical) {
            candidates.push(format!("{alias}.{tool}"));
        }
    }
    for (alias, plugin) in interp.plugins.borrow().iter() {
        candidates.push(alias.clone());
        let ops = match plugin {
            crate::interp::LoadedPlugin::Native(module) => module.operation_names(),
            crate::interp::LoadedPlugin::Script(script) => script.macros.keys().cloned().collect(),
        };
        for op in ops {
            candidates.push(format!("{alias}.{op}"));
        }
    }
    candidates.extend(BUILTIN_NAMES.iter().map(|&n| n.to_owned()));
    candidates.extend(interp.macros.borrow().keys().cloned());
    candidates.extend(interp.agents.borrow().keys().cloned());

    let mut matched: Vec<String> = candidates
        .into_iter()
        .filter(|c| regex.as_ref().is_none_or(|re| re.is_match(c)))
        .collect();
    matched.sort_unstable();
    matched.dedup();
    Ok(Value::list(matched.into_iter().map(Value::string).collect()))
}

/// `*` matches within a segment (everything but `.`), `**` matches across
/// segments. Matching is case-insensitive and anchored.
fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::from("(?i)^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '*' {
            if chars.get(i + 1) == Some(&'*') {
                source.push_str(".*");
                i += 2;
            } else {
                source.push_str("[^.]*");
                i += 1;
            }
        } else {
            source.push_str(&regex::escape(&chars[i].to_string()));
            i += 1;
        }
    }
    source.push('$');
    Regex::new(&source)
}

async fn generate(interp: &Interp, args: &ResolvedArgs, tags: &[ResolvedTag], pos: Pos) -> Flow<Value> {
    let prompt = args
        .positional
        .first()
        .map_or_else(|| interp.get_ctx().display(), Value::display);
    let format_arg = args
        .keywords
        .get("format")
        .or_else(|| args.positional.get(1))
        .map(Value::display);
    let format = match format_arg {
        None => GenerateFormat::Text,
        Some(text) => match GenerateFormat::from_str(&text.to_lowercase()) {
            Ok(format) => format,
            Err(_) => {
                return raise(
                    ErrorKind::ValidationError,
                    format!("unknown Generate format '{text}'"),
                    pos,
                );
            }
        },
    };
    interp.meter.borrow_mut().operations += 1;
    interp
        .provider
        .generate(&prompt, format, tags)
        .await
        .map_err(|err| Control::Raise(err.at(pos)))
}
