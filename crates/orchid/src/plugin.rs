//! In-process plugin modules and the plugin search path.
//!
//! Native plugins are Rust values implementing a small operations table;
//! hosts register them at interpreter construction. Script plugins are
//! `.orch` files found under the plugin roots and run in a sub-interpreter;
//! their macros and agents become the namespace's operations. A `.js` file
//! on the search path is recognized but not loadable here — the foreign-code
//! host loader is an external collaborator.

use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
};

use ahash::AHashMap;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;

use crate::{
    error::{ErrorKind, OrchidError, RunResult},
    provider::{Provider, ResolvedTag},
    tracer::TraceLog,
    value::Value,
};

/// Shared handle plugins use to write trace entries.
#[derive(Clone)]
pub struct TraceHandle(Rc<RefCell<TraceLog>>);

impl TraceHandle {
    #[must_use]
    pub fn new(log: Rc<RefCell<TraceLog>>) -> Self {
        Self(log)
    }

    pub fn note(&self, message: impl Into<String>) {
        self.0.borrow_mut().note(message);
    }
}

/// Context handed to every plugin operation invocation.
pub struct PluginCtx {
    pub provider: Rc<dyn Provider>,
    pub implicit_context: Value,
    pub tags: Vec<ResolvedTag>,
    pub trace: TraceHandle,
}

type PluginOpFn = Box<dyn Fn(IndexMap<String, Value>, PluginCtx) -> LocalBoxFuture<'static, RunResult<Value>>>;
type SetupFn = Box<dyn Fn(&PluginCtx) -> RunResult<()>>;
type TeardownFn = Box<dyn Fn() -> RunResult<()>>;

/// A native plugin: a named table of async operations with an optional
/// setup/teardown lifecycle.
pub struct PluginModule {
    pub name: String,
    pub description: Option<String>,
    operations: AHashMap<String, PluginOpFn>,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
}

impl PluginModule {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            operations: AHashMap::new(),
            setup: None,
            teardown: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Registers an async operation.
    #[must_use]
    pub fn operation<F>(mut self, name: impl Into<String>, op: F) -> Self
    where
        F: Fn(IndexMap<String, Value>, PluginCtx) -> LocalBoxFuture<'static, RunResult<Value>> + 'static,
    {
        self.operations.insert(name.into(), Box::new(op));
        self
    }

    /// Convenience for synchronous operations.
    #[must_use]
    pub fn sync_operation<F>(self, name: impl Into<String>, op: F) -> Self
    where
        F: Fn(IndexMap<String, Value>, PluginCtx) -> RunResult<Value> + 'static,
    {
        self.operation(name, move |args, ctx| {
            let result = op(args, ctx);
            Box::pin(async move { result })
        })
    }

    #[must_use]
    pub fn on_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&PluginCtx) -> RunResult<()> + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    #[must_use]
    pub fn on_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn() -> RunResult<()> + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    #[must_use]
    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    #[must_use]
    pub fn operation_names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }

    pub async fn call(&self, op: &str, args: IndexMap<String, Value>, ctx: PluginCtx) -> RunResult<Value> {
        let Some(operation) = self.operations.get(op) else {
            return Err(OrchidError::new(
                ErrorKind::ToolNotFound,
                format!("plugin '{}' has no operation '{op}'", self.name),
            ));
        };
        operation(args, ctx).await
    }

    pub fn run_setup(&self, ctx: &PluginCtx) -> RunResult<()> {
        match &self.setup {
            Some(setup) => setup(ctx),
            None => Ok(()),
        }
    }

    /// Best-effort teardown; failures are reported, not thrown.
    pub fn run_teardown(&self) -> RunResult<()> {
        match &self.teardown {
            Some(teardown) => teardown(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// What a plugin search found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginFile {
    /// A `.orch` script plugin.
    Script(PathBuf),
    /// A native-code plugin file this host cannot load (`.js`).
    ForeignNative(PathBuf),
}

/// Searches each root for `<name>.js`, `<name>/index.js`, `<name>.orch`,
/// `<name>/index.orch`, in that order, returning the first hit.
#[must_use]
pub fn find_plugin_file(name: &str, roots: &[PathBuf]) -> Option<PluginFile> {
    for root in roots {
        let candidates = [
            (root.join(format!("{name}.js")), true),
            (root.join(name).join("index.js"), true),
            (root.join(format!("{name}.orch")), false),
            (root.join(name).join("index.orch"), false),
        ];
        for (path, foreign) in candidates {
            if path.is_file() {
                return Some(if foreign {
                    PluginFile::ForeignNative(path)
                } else {
                    PluginFile::Script(path)
                });
            }
        }
    }
    None
}

/// The roots a given interpreter searches: `plugins/` next to the script
/// first, then each configured extra root.
#[must_use]
pub fn plugin_roots(script_dir: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots = vec![script_dir.join("plugins")];
    roots.extend(extra.iter().cloned());
    roots
}
