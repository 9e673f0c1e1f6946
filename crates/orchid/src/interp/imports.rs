//! Module imports and `Use` declarations.
//!
//! `import a.b` resolves `a/b.orch` relative to the script directory and
//! runs it in a fresh sub-interpreter that shares this session's scope
//! arena, provider, MCP manager, and import state. The import cache
//! guarantees at-most-one execution per resolved path; the in-progress
//! stack detects cycles.

use std::{fs, path::PathBuf, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{Control, ErrorKind, Flow, OrchidError, raise},
    parse::parse,
    plugin::{PluginFile, find_plugin_file, plugin_roots},
    token::Pos,
    value::{Callable, Value},
};

use super::{Interp, LoadedPlugin, ScriptPlugin};

/// Session-wide import bookkeeping, shared between the main interpreter and
/// every sub-interpreter it spawns.
#[derive(Debug, Default)]
pub(crate) struct ImportState {
    pub cache: AHashMap<PathBuf, Rc<ModuleExports>>,
    pub stack: Vec<PathBuf>,
}

/// What a module contributes to its importer.
#[derive(Debug)]
pub(crate) struct ModuleExports {
    pub bindings: IndexMap<String, Value>,
    pub macros: Vec<(String, Rc<Callable>)>,
    pub agents: Vec<(String, Rc<Callable>)>,
}

impl Interp {
    pub(crate) async fn exec_import(&self, path: &str, alias: Option<&str>, pos: Pos) -> Flow<Value> {
        let relative: PathBuf = format!("{}.orch", path.replace('.', "/")).into();
        let file = self.options.script_dir.join(relative);
        let resolved = fs::canonicalize(&file).unwrap_or_else(|_| file.clone());

        if self.imports.borrow().stack.contains(&resolved) {
            let mut chain: Vec<String> = self
                .imports
                .borrow()
                .stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(resolved.display().to_string());
            return raise(
                ErrorKind::CyclicDependency,
                format!("import cycle detected: {}", chain.join(" -> ")),
                pos,
            );
        }

        let cached = self.imports.borrow().cache.get(&resolved).cloned();
        let exports = match cached {
            Some(exports) => exports,
            None => {
                let exports = self.load_module(path, &file, &resolved, pos).await?;
                self.imports
                    .borrow_mut()
                    .cache
                    .insert(resolved.clone(), Rc::clone(&exports));
                exports
            }
        };
        self.merge_exports(&exports, alias);
        self.trace(format!("import {path} done"));
        Ok(Value::Null)
    }

    async fn load_module(
        &self,
        path: &str,
        file: &PathBuf,
        resolved: &PathBuf,
        pos: Pos,
    ) -> Flow<Rc<ModuleExports>> {
        let source = fs::read_to_string(file).map_err(|err| {
            Control::Raise(
                OrchidError::new(
                    ErrorKind::ImportError,
                    format!("cannot import '{path}' ({}): {err}", file.display()),
                )
                .at(pos),
            )
        })?;
        let program = parse(&source).map_err(|err| {
            Control::Raise(OrchidError::new(err.kind, format!("in module '{path}': {}", err.message)))
        })?;
        self.trace(format!("import {path} begin"));
        self.imports.borrow_mut().stack.push(resolved.clone());
        let module_dir = file
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let sub = self.submodule(module_dir);
        let run_result = sub.run(&program).await;
        self.imports.borrow_mut().stack.pop();
        if let Err(err) = run_result {
            return Err(Control::Raise(err));
        }
        let bindings = sub.scopes.borrow().own_bindings(sub.global);
        let macros = sub
            .macros
            .borrow()
            .iter()
            .map(|(name, callable)| (name.clone(), Rc::clone(callable)))
            .collect();
        let agents = sub
            .agents
            .borrow()
            .iter()
            .map(|(name, callable)| (name.clone(), Rc::clone(callable)))
            .collect();
        Ok(Rc::new(ModuleExports {
            bindings,
            macros,
            agents,
        }))
    }

    /// With an alias, the module lands as one dict binding; otherwise its
    /// bindings merge member-by-member into the global scope. Macros and
    /// agents propagate either way, alias-prefixed when one is present.
    fn merge_exports(&self, exports: &ModuleExports, alias: Option<&str>) {
        match alias {
            Some(alias) => {
                self.scopes
                    .borrow_mut()
                    .set(self.global, alias, Value::dict(exports.bindings.clone()));
                let mut macros = self.macros.borrow_mut();
                for (name, callable) in &exports.macros {
                    macros.insert(format!("{alias}.{name}"), Rc::clone(callable));
                }
                drop(macros);
                let mut agents = self.agents.borrow_mut();
                for (name, callable) in &exports.agents {
                    agents.insert(format!("{alias}.{name}"), Rc::clone(callable));
                }
            }
            None => {
                let mut scopes = self.scopes.borrow_mut();
                for (name, value) in &exports.bindings {
                    scopes.set(self.global, name, value.clone());
                }
                drop(scopes);
                let mut macros = self.macros.borrow_mut();
                for (name, callable) in &exports.macros {
                    macros.insert(name.clone(), Rc::clone(callable));
                }
                drop(macros);
                let mut agents = self.agents.borrow_mut();
                for (name, callable) in &exports.agents {
                    agents.insert(name.clone(), Rc::clone(callable));
                }
            }
        }
    }

    pub(crate) async fn exec_use_mcp(&self, name: &str) -> Flow<Value> {
        self.aliases
            .borrow_mut()
            .insert(name.to_owned(), name.to_owned());
        if self.mcp.is_configured(name) {
            match self.mcp.connect(name).await {
                Ok(()) => self.trace(format!("mcp connected to {name}")),
                Err(err) => {
                    log::warn!("cannot connect MCP server '{name}': {err}");
                    self.trace(format!("mcp connect failed for {name}: {}", err.message));
                }
            }
        } else {
            log::warn!("MCP server '{name}' is not configured; '{name}:*' calls fall through to the provider");
            self.trace(format!("mcp {name} not configured"));
        }
        Ok(Value::Null)
    }

    pub(crate) async fn exec_use_plugin(&self, name: &str, alias: Option<&str>, pos: Pos) -> Flow<Value> {
        let alias = alias.unwrap_or(name);
        self.aliases
            .borrow_mut()
            .insert(alias.to_owned(), name.to_owned());

        if let Some(native) = self.native_plugins.get(name) {
            let ctx = self.plugin_ctx(Vec::new());
            native
                .run_setup(&ctx)
                .map_err(|err| Control::Raise(err.at(pos)))?;
            self.plugins
                .borrow_mut()
                .insert(alias.to_owned(), LoadedPlugin::Native(Rc::clone(native)));
            self.trace(format!("plugin {name} loaded (native) as {alias}"));
            return Ok(Value::Null);
        }

        let roots = plugin_roots(&self.options.script_dir, &self.options.plugin_path);
        match find_plugin_file(name, &roots) {
            Some(PluginFile::Script(path)) => {
                let source = fs::read_to_string(&path).map_err(|err| {
                    Control::Raise(
                        OrchidError::new(
                            ErrorKind::ImportError,
                            format!("cannot load plugin '{name}' ({}): {err}", path.display()),
                        )
                        .at(pos),
                    )
                })?;
                let program = parse(&source).map_err(|err| {
                    Control::Raise(OrchidError::new(
                        err.kind,
                        format!("in plugin '{name}': {}", err.message),
                    ))
                })?;
                let plugin_dir = path
                    .parent()
                    .map_or_else(|| PathBuf::from("."), PathBuf::from);
                let sub = self.submodule(plugin_dir);
                sub.run(&program).await.map_err(Control::Raise)?;
                let mut macros: AHashMap<String, Rc<Callable>> = AHashMap::new();
                for (mname, callable) in sub.macros.borrow().iter() {
                    macros.insert(mname.clone(), Rc::clone(callable));
                }
                for (aname, callable) in sub.agents.borrow().iter() {
                    macros.insert(aname.clone(), Rc::clone(callable));
                }
                self.plugins.borrow_mut().insert(
                    alias.to_owned(),
                    LoadedPlugin::Script(Rc::new(ScriptPlugin {
                        name: name.to_owned(),
                        macros,
                    })),
                );
                self.trace(format!("plugin {name} loaded (script) as {alias}"));
                Ok(Value::Null)
            }
            Some(PluginFile::ForeignNative(path)) => raise(
                ErrorKind::ToolNotFound,
                format!(
                    "plugin '{name}' at {} is native code and needs the external plugin host",
                    path.display()
                ),
                pos,
            ),
            None => raise(
                ErrorKind::ToolNotFound,
                format!("plugin '{name}' was not found under any plugin root"),
                pos,
            ),
        }
    }
}
