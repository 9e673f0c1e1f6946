//! Tree-walking interpreter.
//!
//! One [`Interp`] owns a session: the scope arena, the implicit context,
//! checkpoints, the event hub, caches, loaded plugins and modules. All
//! mutable state sits in `RefCell` fields so fork branches — futures polled
//! cooperatively on one task — can share it; borrows never live across an
//! `.await`.

mod atomic;
mod events;
mod exec;
mod fork;
mod imports;
mod ops;
mod tags;

use std::{
    cell::{Cell, RefCell},
    path::PathBuf,
    rc::Rc,
    time::Instant,
};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    ast::{MetaEntry, Metadata, Program, RequireKind, Spanned},
    config::InterpOptions,
    env::{ScopeId, Scopes},
    error::{Control, ErrorKind, Flow, OrchidError, RunResult},
    io::{PrintWriter, StdPrint},
    mcp::{McpManager, NoMcp},
    plugin::{PluginCtx, PluginModule, TraceHandle, find_plugin_file, plugin_roots},
    provider::{EchoProvider, Provider, ResolvedTag},
    tracer::TraceLog,
    value::{Callable, Value},
};

pub(crate) use events::EventHub;
pub(crate) use imports::ImportState;
pub(crate) use ops::ResolvedArgs;

/// A labeled snapshot of the current scope's bindings and the implicit
/// context.
#[derive(Debug, Clone)]
pub(crate) struct SavedCheckpoint {
    pub bindings: IndexMap<String, Value>,
    pub ctx: Value,
}

/// Session counters backing `Cost()` and the `Confidence` blend.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Meter {
    /// Provider `execute`/`search`/`generate` dispatches.
    pub operations: u64,
    /// Namespaced tool dispatches (plugin, MCP, or provider-simulated).
    pub tool_calls: u64,
    /// Individual attempts, including retries.
    pub attempts: u64,
    /// Failed attempts.
    pub failures: u64,
}

/// A plugin bound to a namespace alias.
#[derive(Debug, Clone)]
pub(crate) enum LoadedPlugin {
    Native(Rc<PluginModule>),
    Script(Rc<ScriptPlugin>),
}

/// A `.orch` plugin: its macros and agents, exposed by name.
#[derive(Debug)]
pub(crate) struct ScriptPlugin {
    pub name: String,
    pub macros: AHashMap<String, Rc<Callable>>,
}

/// Builder for [`Interp`].
pub struct InterpBuilder {
    options: InterpOptions,
    provider: Option<Rc<dyn Provider>>,
    mcp: Option<Rc<dyn McpManager>>,
    print: Option<Rc<RefCell<dyn PrintWriter>>>,
    native_plugins: AHashMap<String, Rc<PluginModule>>,
}

impl InterpBuilder {
    #[must_use]
    pub fn options(mut self, options: InterpOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Rc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn mcp(mut self, mcp: Rc<dyn McpManager>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    #[must_use]
    pub fn print(mut self, print: Rc<RefCell<dyn PrintWriter>>) -> Self {
        self.print = Some(print);
        self
    }

    /// Registers a native plugin, available to scripts via
    /// `Use Plugin("name")`.
    #[must_use]
    pub fn plugin(mut self, module: PluginModule) -> Self {
        self.native_plugins.insert(module.name.clone(), Rc::new(module));
        self
    }

    #[must_use]
    pub fn build(self) -> Interp {
        let mut scopes = Scopes::new();
        let global = scopes.new_root();
        Interp {
            options: self.options,
            provider: self.provider.unwrap_or_else(|| Rc::new(EchoProvider::new())),
            mcp: self.mcp.unwrap_or_else(|| Rc::new(NoMcp)),
            print: self.print.unwrap_or_else(|| Rc::new(RefCell::new(StdPrint))),
            scopes: Rc::new(RefCell::new(scopes)),
            global,
            ctx: RefCell::new(Value::Null),
            checkpoints: RefCell::new(IndexMap::new()),
            hub: RefCell::new(EventHub::default()),
            aliases: RefCell::new(AHashMap::new()),
            macros: RefCell::new(AHashMap::new()),
            agents: RefCell::new(AHashMap::new()),
            plugins: RefCell::new(AHashMap::new()),
            native_plugins: Rc::new(self.native_plugins),
            imports: Rc::new(RefCell::new(ImportState::default())),
            cache: RefCell::new(AHashMap::new()),
            frozen: RefCell::new(AHashSet::new()),
            tracer: Rc::new(RefCell::new(TraceLog::new())),
            meter: RefCell::new(Meter::default()),
            depth: Cell::new(0),
            started: Instant::now(),
        }
    }
}

/// The interpreter session.
pub struct Interp {
    pub(crate) options: InterpOptions,
    pub(crate) provider: Rc<dyn Provider>,
    pub(crate) mcp: Rc<dyn McpManager>,
    pub(crate) print: Rc<RefCell<dyn PrintWriter>>,
    /// Shared scope arena — sub-interpreters (modules, script plugins) keep
    /// their roots in the same arena so closure handles stay valid.
    pub(crate) scopes: Rc<RefCell<Scopes>>,
    pub(crate) global: ScopeId,
    pub(crate) ctx: RefCell<Value>,
    pub(crate) checkpoints: RefCell<IndexMap<String, SavedCheckpoint>>,
    pub(crate) hub: RefCell<EventHub>,
    /// Namespace alias → canonical name.
    pub(crate) aliases: RefCell<AHashMap<String, String>>,
    pub(crate) macros: RefCell<AHashMap<String, Rc<Callable>>>,
    pub(crate) agents: RefCell<AHashMap<String, Rc<Callable>>>,
    pub(crate) plugins: RefCell<AHashMap<String, LoadedPlugin>>,
    pub(crate) native_plugins: Rc<AHashMap<String, Rc<PluginModule>>>,
    pub(crate) imports: Rc<RefCell<ImportState>>,
    pub(crate) cache: RefCell<AHashMap<String, Value>>,
    pub(crate) frozen: RefCell<AHashSet<String>>,
    pub(crate) tracer: Rc<RefCell<TraceLog>>,
    pub(crate) meter: RefCell<Meter>,
    pub(crate) depth: Cell<usize>,
    pub(crate) started: Instant,
}

impl Interp {
    #[must_use]
    pub fn builder() -> InterpBuilder {
        InterpBuilder {
            options: InterpOptions::default(),
            provider: None,
            mcp: None,
            print: None,
            native_plugins: AHashMap::new(),
        }
    }

    /// An interpreter with the defaults: echo provider, no MCP, stdout.
    #[must_use]
    pub fn new(options: InterpOptions) -> Self {
        Self::builder().options(options).build()
    }

    /// Runs a program to completion: metadata pass first (so missing
    /// `@requires` fail before any statement), then the body in order. The
    /// result is the last statement's value; a top-level `return` yields its
    /// value.
    pub async fn run(&self, program: &Program) -> RunResult<Value> {
        self.process_metadata(&program.metadata)?;
        match self.run_block(&program.body, self.global).await {
            Ok(value) => Ok(value),
            Err(Control::Return(value)) => Ok(value),
            Err(ctl) => Err(ctl.into_error()),
        }
    }

    /// Best-effort shutdown: plugin teardowns run in load order; failures
    /// are logged, never thrown.
    pub fn shutdown(&self) {
        let plugins: Vec<LoadedPlugin> = self.plugins.borrow().values().cloned().collect();
        for plugin in plugins {
            if let LoadedPlugin::Native(module) = plugin {
                if let Err(err) = module.run_teardown() {
                    log::warn!("plugin '{}' teardown failed: {err}", module.name);
                    self.trace(format!("plugin {} teardown failed: {err}", module.name));
                }
            }
        }
    }

    /// Rendered trace log (what `Trace()` returns).
    #[must_use]
    pub fn trace_log(&self) -> String {
        self.tracer.borrow().render(None)
    }

    /// Current implicit context (`_`).
    #[must_use]
    pub fn context(&self) -> Value {
        self.ctx.borrow().clone()
    }

    // --- internal helpers ---

    pub(crate) fn get_ctx(&self) -> Value {
        self.ctx.borrow().clone()
    }

    pub(crate) fn set_ctx(&self, value: Value) {
        *self.ctx.borrow_mut() = value;
    }

    pub(crate) fn trace(&self, message: impl Into<String>) {
        self.tracer.borrow_mut().note(message);
    }

    pub(crate) fn trace_handle(&self) -> TraceHandle {
        TraceHandle::new(Rc::clone(&self.tracer))
    }

    pub(crate) fn plugin_ctx(&self, tags: Vec<ResolvedTag>) -> PluginCtx {
        PluginCtx {
            provider: Rc::clone(&self.provider),
            implicit_context: self.get_ctx(),
            tags,
            trace: self.trace_handle(),
        }
    }

    /// A fresh interpreter for a module or script plugin rooted at
    /// `script_dir`, sharing the arena, import state, and host boundaries
    /// with this one.
    pub(crate) fn submodule(&self, script_dir: PathBuf) -> Self {
        let global = self.scopes.borrow_mut().new_root();
        Self {
            options: InterpOptions {
                script_path: None,
                script_dir,
                plugin_path: self.options.plugin_path.clone(),
                save_path: self.options.save_path.clone(),
            },
            provider: Rc::clone(&self.provider),
            mcp: Rc::clone(&self.mcp),
            print: Rc::clone(&self.print),
            scopes: Rc::clone(&self.scopes),
            global,
            ctx: RefCell::new(Value::Null),
            checkpoints: RefCell::new(IndexMap::new()),
            hub: RefCell::new(EventHub::default()),
            aliases: RefCell::new(AHashMap::new()),
            macros: RefCell::new(AHashMap::new()),
            agents: RefCell::new(AHashMap::new()),
            plugins: RefCell::new(AHashMap::new()),
            native_plugins: Rc::clone(&self.native_plugins),
            imports: Rc::clone(&self.imports),
            cache: RefCell::new(AHashMap::new()),
            frozen: RefCell::new(AHashSet::new()),
            tracer: Rc::clone(&self.tracer),
            meter: RefCell::new(Meter::default()),
            depth: Cell::new(0),
            started: self.started,
        }
    }

    /// Validates `@requires` eagerly; other directives are noted and
    /// otherwise accepted without effect.
    fn process_metadata(&self, metadata: &[Metadata]) -> RunResult<()> {
        for directive in metadata {
            match directive.name.as_str() {
                "requires" => {
                    for entry in &directive.entries {
                        let MetaEntry::Requires { kind, name } = entry else {
                            continue;
                        };
                        let available = match kind {
                            RequireKind::Mcp => self.mcp_available(name),
                            RequireKind::Plugin => self.plugin_available(name),
                        };
                        if !available {
                            let what = match kind {
                                RequireKind::Mcp => "MCP server",
                                RequireKind::Plugin => "plugin",
                            };
                            return Err(OrchidError::new(
                                ErrorKind::ToolNotFound,
                                format!("@requires: {what} '{name}' is not available"),
                            )
                            .at(directive.pos));
                        }
                    }
                }
                other => self.trace(format!("directive @{other}")),
            }
        }
        Ok(())
    }

    pub(crate) fn mcp_available(&self, name: &str) -> bool {
        self.mcp.is_configured(name) || self.mcp.has_server(name)
    }

    pub(crate) fn plugin_available(&self, name: &str) -> bool {
        if self.plugins.borrow().contains_key(name) || self.native_plugins.contains_key(name) {
            return true;
        }
        let roots = plugin_roots(&self.options.script_dir, &self.options.plugin_path);
        matches!(
            find_plugin_file(name, &roots),
            Some(crate::plugin::PluginFile::Script(_))
        )
    }

    /// Executes a statement sequence, maintaining the implicit context: each
    /// pure-expression statement's value becomes `_`; operations, pipes,
    /// forks, and assignments manage the context themselves; declarations
    /// and event statements leave it alone.
    pub(crate) async fn run_block(&self, body: &[Spanned], scope: ScopeId) -> Flow<Value> {
        let mut last = Value::Null;
        for stmt in body {
            last = self.exec_and_update(stmt, scope).await?;
        }
        Ok(last)
    }

    pub(crate) async fn exec_and_update(&self, stmt: &Spanned, scope: ScopeId) -> Flow<Value> {
        let value = self.exec(stmt, scope).await?;
        if exec::updates_context(&stmt.node) {
            self.set_ctx(value.clone());
        }
        Ok(value)
    }
}
