//! Operation dispatch.
//!
//! Unqualified calls resolve in order: user macro/agent, callable binding,
//! distinguished built-in, reasoning macro (Provider). Namespaced calls
//! route plugin → live MCP → configured MCP (auto-connect) → Provider
//! simulated tool call. Every path runs through the tag pipeline.

use std::rc::Rc;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    ast::{Arg, Spanned, Tags},
    builtins,
    config::MAX_CALL_DEPTH,
    env::ScopeId,
    error::{Control, ErrorKind, Flow, raise},
    token::Pos,
    value::{Asset, Callable, Value},
};

use super::{Interp, LoadedPlugin, tags::TagSet};

/// Evaluated call arguments.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedArgs {
    pub positional: Vec<Value>,
    pub keywords: IndexMap<String, Value>,
}

/// What a successful call does to the implicit context.
enum CtxUpdate {
    Replace,
    Append,
    Keep,
}

impl Interp {
    pub(crate) async fn eval_args(&self, args: &[Arg], scope: ScopeId) -> Flow<ResolvedArgs> {
        let mut resolved = ResolvedArgs::default();
        for arg in args {
            let value = self.exec(&arg.value, scope).await?;
            match &arg.name {
                Some(name) => {
                    resolved.keywords.insert(name.clone(), value);
                }
                None => resolved.positional.push(value),
            }
        }
        Ok(resolved)
    }

    fn apply_ctx_policy(&self, tags: &TagSet, updates_by_default: bool, value: &Value) {
        let update = if tags.private {
            CtxUpdate::Keep
        } else if tags.append {
            CtxUpdate::Append
        } else if updates_by_default {
            CtxUpdate::Replace
        } else {
            CtxUpdate::Keep
        };
        match update {
            CtxUpdate::Replace => self.set_ctx(value.clone()),
            CtxUpdate::Append => {
                let merged = self.get_ctx().merge(value);
                self.set_ctx(merged);
            }
            CtxUpdate::Keep => {}
        }
    }

    pub(crate) async fn call_operation(
        &self,
        name: &str,
        args: &[Arg],
        tag_nodes: &Tags,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        let tags = self.resolve_tags(tag_nodes, scope).await?;
        let rargs = self.eval_args(args, scope).await?;
        let cache_key = tags.cached.then(|| self.cache_key(name, &rargs));

        let callable = self
            .macros
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.agents.borrow().get(name).cloned())
            .or_else(|| match self.scopes.borrow().get(scope, name) {
                Value::Callable(c) => Some(c),
                _ => None,
            });

        if let Some(callable) = callable {
            self.trace(format!("call {name}"));
            let value = self
                .run_guarded(name, &tags, cache_key, pos, || {
                    let callable = Rc::clone(&callable);
                    let rargs = rargs.clone();
                    Box::pin(async move { self.call_callable(callable, rargs, pos, scope).await })
                })
                .await?;
            self.apply_ctx_policy(&tags, true, &value);
            return Ok(value);
        }

        if builtins::is_builtin(name) {
            let value = self
                .run_guarded(name, &tags, cache_key, pos, || {
                    let rargs = rargs.clone();
                    let tag_list = tags.list.clone();
                    Box::pin(async move { builtins::call(self, name, rargs, tag_list, pos, scope).await })
                })
                .await?;
            self.apply_ctx_policy(&tags, builtins::updates_context(name), &value);
            return Ok(value);
        }

        // Reasoning macro: delegate to the Provider.
        let (input, attachments) = self.primary_input(&rargs);
        let context = self.provider_context(&rargs, &tags);
        self.trace(format!("reasoning {name}({input})"));
        let value = self
            .run_guarded(name, &tags, cache_key, pos, || {
                let input = input.clone();
                let context = context.clone();
                let attachments = attachments.clone();
                let tag_list = tags.list.clone();
                Box::pin(async move {
                    self.meter.borrow_mut().operations += 1;
                    self.provider
                        .execute(name, &input, &context, &tag_list, &attachments)
                        .await
                        .map_err(|err| Control::Raise(err.at(pos)))
                })
            })
            .await?;
        self.apply_ctx_policy(&tags, true, &value);
        Ok(value)
    }

    pub(crate) async fn call_namespaced(
        &self,
        namespace: &str,
        op: &str,
        args: &[Arg],
        tag_nodes: &Tags,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        let tags = self.resolve_tags(tag_nodes, scope).await?;
        let rargs = self.eval_args(args, scope).await?;
        let full_name = format!("{namespace}:{op}");
        let cache_key = tags.cached.then(|| self.cache_key(&full_name, &rargs));
        let canonical = self
            .aliases
            .borrow()
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| namespace.to_owned());
        let plugin = self.plugins.borrow().get(namespace).cloned();
        let args_dict = tool_args(&rargs);

        self.trace(format!("tool {full_name}"));
        let value = self
            .run_guarded(&full_name, &tags, cache_key, pos, || {
                let plugin = plugin.clone();
                let canonical = canonical.clone();
                let args_dict = args_dict.clone();
                let rargs = rargs.clone();
                let tag_list = tags.list.clone();
                Box::pin(async move {
                    self.meter.borrow_mut().tool_calls += 1;
                    match plugin {
                        Some(LoadedPlugin::Native(module)) => module
                            .call(op, args_dict, self.plugin_ctx(tag_list))
                            .await
                            .map_err(|err| Control::Raise(err.at(pos))),
                        Some(LoadedPlugin::Script(script)) => match script.macros.get(op) {
                            Some(callable) => {
                                self.call_callable(Rc::clone(callable), rargs, pos, scope).await
                            }
                            None => raise(
                                ErrorKind::ToolNotFound,
                                format!("plugin '{}' has no operation '{op}'", script.name),
                                pos,
                            ),
                        },
                        None => self.mcp_or_provider(&canonical, op, args_dict, &tag_list, pos).await,
                    }
                })
            })
            .await?;
        self.apply_ctx_policy(&tags, true, &value);
        Ok(value)
    }

    /// Live connection → call; configured → connect then call (falling back
    /// to the Provider when the connect fails); otherwise the Provider's
    /// simulated tool call.
    async fn mcp_or_provider(
        &self,
        server: &str,
        op: &str,
        args_dict: IndexMap<String, Value>,
        tag_list: &[crate::provider::ResolvedTag],
        pos: Pos,
    ) -> Flow<Value> {
        if self.mcp.has_server(server) {
            return self
                .mcp
                .call_tool(server, op, args_dict)
                .await
                .map_err(|err| Control::Raise(err.at(pos)));
        }
        if self.mcp.is_configured(server) {
            match self.mcp.connect(server).await {
                Ok(()) => {
                    self.trace(format!("mcp connected to {server}"));
                    return self
                        .mcp
                        .call_tool(server, op, args_dict)
                        .await
                        .map_err(|err| Control::Raise(err.at(pos)));
                }
                Err(err) => {
                    log::warn!("cannot connect MCP server '{server}': {err}; falling back to provider");
                    self.trace(format!("mcp connect failed for {server}: {}", err.message));
                }
            }
        }
        self.provider
            .tool_call(server, op, &args_dict, tag_list)
            .await
            .map_err(|err| Control::Raise(err.at(pos)))
    }

    /// Call of a computed callee, e.g. `mod.helper(x)` after an aliased
    /// import.
    pub(crate) async fn call_expression(
        &self,
        callee: &Spanned,
        args: &[Arg],
        tag_nodes: &Tags,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        let target = self.exec(callee, scope).await?;
        let Value::Callable(callable) = target else {
            return raise(
                ErrorKind::TypeError,
                format!("a {} is not callable", target.type_name()),
                pos,
            );
        };
        let tags = self.resolve_tags(tag_nodes, scope).await?;
        let rargs = self.eval_args(args, scope).await?;
        let cache_key = tags.cached.then(|| self.cache_key(&callable.name, &rargs));
        self.trace(format!("call {}", callable.name));
        let value = self
            .run_guarded(&callable.name.clone(), &tags, cache_key, pos, || {
                let callable = Rc::clone(&callable);
                let rargs = rargs.clone();
                Box::pin(async move { self.call_callable(callable, rargs, pos, scope).await })
            })
            .await?;
        self.apply_ctx_policy(&tags, true, &value);
        Ok(value)
    }

    /// Invokes a macro or agent. Named arguments bind first, positionals
    /// fill remaining parameters left to right, defaults evaluate in the
    /// caller's environment, leftovers bind to null. `_count` is a transport
    /// detail for providers and is never bound.
    pub(crate) async fn call_callable(
        &self,
        callable: Rc<Callable>,
        args: ResolvedArgs,
        pos: Pos,
        caller_scope: ScopeId,
    ) -> Flow<Value> {
        if self.depth.get() >= MAX_CALL_DEPTH {
            return raise(ErrorKind::RuntimeError, "maximum call depth exceeded", pos);
        }
        self.depth.set(self.depth.get() + 1);
        let result = self.call_callable_inner(&callable, args, caller_scope).await;
        self.depth.set(self.depth.get() - 1);
        match result {
            Ok(value) => Ok(value),
            Err(Control::Return(value)) => Ok(value),
            Err(Control::Break) => raise(ErrorKind::RuntimeError, "'break' outside loop", pos),
            Err(other) => Err(other),
        }
    }

    async fn call_callable_inner(
        &self,
        callable: &Callable,
        args: ResolvedArgs,
        caller_scope: ScopeId,
    ) -> Flow<Value> {
        let call_scope = self.scopes.borrow_mut().child(callable.scope);
        let mut bound: AHashSet<String> = AHashSet::new();
        for (name, value) in &args.keywords {
            if name == "_count" {
                continue;
            }
            self.scopes.borrow_mut().set(call_scope, name, value.clone());
            bound.insert(name.clone());
        }
        let mut positional = args.positional.iter();
        for param in &callable.params {
            if bound.contains(&param.name) {
                continue;
            }
            let value = if let Some(value) = positional.next() {
                value.clone()
            } else if let Some(default) = &param.default {
                self.exec(default, caller_scope).await?
            } else {
                Value::Null
            };
            self.scopes.borrow_mut().set(call_scope, &param.name, value);
        }
        self.run_block(&callable.body, call_scope).await
    }

    /// The primary Provider input: first positional argument, else the
    /// implicit context. Asset inputs travel as attachments, with a short
    /// description as the input string.
    pub(crate) fn primary_input(&self, args: &ResolvedArgs) -> (String, Vec<Rc<Asset>>) {
        let primary = args
            .positional
            .first()
            .cloned()
            .unwrap_or_else(|| self.get_ctx());
        match primary {
            Value::Asset(asset) => {
                let input = format!("[{} attachment] {}", asset.media, asset.description);
                (input, vec![asset])
            }
            other => (other.display(), Vec::new()),
        }
    }

    /// Keyword arguments (including `_count`), stringified, as the Provider
    /// context. `<isolated>` empties it.
    pub(crate) fn provider_context(&self, args: &ResolvedArgs, tags: &TagSet) -> IndexMap<String, String> {
        if tags.isolated {
            return IndexMap::new();
        }
        args.keywords
            .iter()
            .map(|(name, value)| (name.clone(), value.display()))
            .collect()
    }
}

/// Shapes evaluated arguments into the dict a tool call receives: keywords
/// by name, positionals as `input`, `input2`, ….
fn tool_args(args: &ResolvedArgs) -> IndexMap<String, Value> {
    let mut map = args.keywords.clone();
    for (i, value) in args.positional.iter().enumerate() {
        let key = if i == 0 {
            "input".to_owned()
        } else {
            format!("input{}", i + 1)
        };
        map.entry(key).or_insert_with(|| value.clone());
    }
    map
}
