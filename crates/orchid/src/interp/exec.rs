//! Statement and expression dispatch.

use std::str::FromStr;

use async_recursion::async_recursion;
use indexmap::IndexMap;

use crate::{
    ast::{ArithOp, AssignTarget, CmpOp, Definition, ExceptArm, InterpPart, LogicalOp, Node, Spanned},
    config::{UNTIL_DEFAULT_ITERATIONS, WHILE_ITERATION_CAP},
    env::ScopeId,
    error::{Control, ErrorKind, Flow, raise},
    token::Pos,
    value::{Callable, Value},
};

use super::Interp;

/// Context policy of a statement node: does `run_block` write its value into
/// the implicit context?
///
/// Operations, calls, pipes, forks, and assignments apply their own policy
/// (tags, the fork-result rule); control flow delegates to its inner
/// statements; declarations and event statements yield no data value.
pub(crate) fn updates_context(node: &Node) -> bool {
    !matches!(
        node,
        Node::Operation { .. }
            | Node::Namespaced { .. }
            | Node::Call { .. }
            | Node::Pipe { .. }
            | Node::Fork { .. }
            | Node::Assignment { .. }
            | Node::PlusAssignment { .. }
            | Node::If { .. }
            | Node::For { .. }
            | Node::While { .. }
            | Node::Until { .. }
            | Node::Try { .. }
            | Node::Atomic { .. }
            | Node::Definition(_)
            | Node::Permissions { .. }
            | Node::Import { .. }
            | Node::UseMcp { .. }
            | Node::UsePlugin { .. }
            | Node::Emit { .. }
            | Node::On { .. }
            | Node::Return { .. }
            | Node::Break
            | Node::Assert { .. }
            | Node::Require { .. }
    )
}

impl Interp {
    #[async_recursion(?Send)]
    pub(crate) async fn exec(&self, stmt: &Spanned, scope: ScopeId) -> Flow<Value> {
        let pos = stmt.pos;
        match &stmt.node {
            Node::Assignment { target, value } => self.exec_assignment(target, value, pos, scope).await,
            Node::PlusAssignment { name, value } => self.exec_plus_assignment(name, value, pos, scope).await,
            Node::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => {
                if self.exec(cond, scope).await?.is_truthy() {
                    return self.run_block(then_body, scope).await;
                }
                for (econd, ebody) in elifs {
                    if self.exec(econd, scope).await?.is_truthy() {
                        return self.run_block(ebody, scope).await;
                    }
                }
                match else_body {
                    Some(body) => self.run_block(body, scope).await,
                    None => Ok(Value::Null),
                }
            }
            Node::For { var, iter, body } => self.exec_for(var, iter, body, pos, scope).await,
            Node::While { cond, body } => self.exec_while(cond, body, pos, scope).await,
            Node::Until { cond, body, tags } => self.exec_until(cond, body, tags, pos, scope).await,
            Node::Try {
                body,
                excepts,
                finally,
            } => self.exec_try(body, excepts, finally.as_deref(), scope).await,
            Node::Assert { cond, message } => {
                if self.exec(cond, scope).await?.is_truthy() {
                    return Ok(Value::Null);
                }
                let msg = match message {
                    Some(expr) => self.exec(expr, scope).await?.display(),
                    None => "assertion failed".to_owned(),
                };
                raise(ErrorKind::ValidationError, msg, pos)
            }
            Node::Require { cond, message } => self.exec_require(cond, message.as_deref(), pos, scope).await,
            Node::Definition(def) => {
                self.exec_definition(def, scope);
                Ok(Value::Null)
            }
            Node::Permissions { .. } => Ok(Value::Null),
            Node::Import { path, alias } => self.exec_import(path, alias.as_deref(), pos).await,
            Node::UseMcp { name } => self.exec_use_mcp(name).await,
            Node::UsePlugin { name, alias } => self.exec_use_plugin(name, alias.as_deref(), pos).await,
            Node::Emit { event, payload } => {
                let value = match payload {
                    Some(expr) => self.exec(expr, scope).await?,
                    None => Value::Null,
                };
                self.emit_event(event, value).await
            }
            Node::On { event, var, body } => {
                self.register_handler(event, var, body, scope).await?;
                Ok(Value::Null)
            }
            Node::Return { value } => {
                let result = match value {
                    Some(expr) => self.exec(expr, scope).await?,
                    None => Value::Null,
                };
                Err(Control::Return(result))
            }
            Node::Break => Err(Control::Break),
            Node::Atomic { body } => self.exec_atomic(body, scope).await,

            Node::Operation { name, args, tags } => self.call_operation(name, args, tags, pos, scope).await,
            Node::Namespaced {
                namespace,
                name,
                args,
                tags,
            } => self.call_namespaced(namespace, name, args, tags, pos, scope).await,
            Node::Call { callee, args, tags } => self.call_expression(callee, args, tags, pos, scope).await,
            Node::Fork { count, body } => self.eval_fork(*count, body, scope, pos).await,

            Node::Pipe { left, right } => {
                let input = self.exec(left, scope).await?;
                self.set_ctx(input);
                let result = self.exec_and_update(right, scope).await?;
                Ok(result)
            }
            Node::Alternative { left, right } => match self.exec(left, scope).await {
                Ok(v) if !v.is_null() && v.is_truthy() => Ok(v),
                Ok(_) => self.exec(right, scope).await,
                // A failed left side is swallowed; `return`/`break` are not
                // failures and keep propagating.
                Err(Control::Raise(_)) => self.exec(right, scope).await,
                Err(other) => Err(other),
            },
            Node::Logical { op, left, right } => {
                let lhs = self.exec(left, scope).await?;
                match op {
                    LogicalOp::And => {
                        if lhs.is_truthy() {
                            self.exec(right, scope).await
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if lhs.is_truthy() {
                            Ok(lhs)
                        } else {
                            self.exec(right, scope).await
                        }
                    }
                }
            }
            Node::Not { expr } => {
                let value = self.exec(expr, scope).await?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            Node::Comparison { op, left, right } => {
                let lhs = self.exec(left, scope).await?;
                let rhs = self.exec(right, scope).await?;
                compare(*op, &lhs, &rhs, pos)
            }
            Node::In { item, collection } => {
                let needle = self.exec(item, scope).await?;
                let haystack = self.exec(collection, scope).await?;
                Ok(Value::Bool(contains(&haystack, &needle)))
            }
            Node::Merge { left, right } => {
                let lhs = self.exec(left, scope).await?;
                let rhs = self.exec(right, scope).await?;
                Ok(lhs.merge(&rhs))
            }
            Node::Arith { op, left, right } => {
                let lhs = self.exec(left, scope).await?;
                let rhs = self.exec(right, scope).await?;
                self.arith(*op, lhs, rhs, pos).await
            }
            Node::Neg { expr } => {
                let value = self.exec(expr, scope).await?;
                match value {
                    Value::Number { value, unit } => Ok(Value::Number { value: -value, unit }),
                    other => raise(
                        ErrorKind::TypeError,
                        format!("cannot negate a {}", other.type_name()),
                        pos,
                    ),
                }
            }
            Node::Member { object, field } => {
                let value = self.exec(object, scope).await?;
                Ok(member(&value, field))
            }
            Node::Index { object, index } => {
                let value = self.exec(object, scope).await?;
                let idx = self.exec(index, scope).await?;
                index_value(&value, &idx, pos)
            }
            Node::StringLit(text) => Ok(Value::string(text)),
            Node::InterpolatedString { parts } => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        InterpPart::Lit(text) => out.push_str(text),
                        InterpPart::Expr(expr) => {
                            let value = self.exec(expr, scope).await?;
                            out.push_str(&value.display());
                        }
                    }
                }
                Ok(Value::string(out))
            }
            Node::NumberLit { value, unit } => Ok(Value::Number {
                value: *value,
                unit: *unit,
            }),
            Node::BoolLit(b) => Ok(Value::Bool(*b)),
            Node::NullLit => Ok(Value::Null),
            Node::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.exec(item, scope).await?);
                }
                Ok(Value::list(values))
            }
            Node::DictLit(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, expr) in entries {
                    let value = self.exec(expr, scope).await?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::dict(map))
            }
            Node::Identifier(name) => Ok(self.scopes.borrow().get(scope, name)),
            Node::ImplicitContext => Ok(self.get_ctx()),
            Node::Listen => self.listen(pos).await,
            Node::Stream { source } => {
                let value = self.exec(source, scope).await?;
                Ok(self.stream_value(value))
            }
        }
    }

    async fn exec_assignment(
        &self,
        target: &AssignTarget,
        value_expr: &Spanned,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        // Frozen bindings reject the write before the right side runs.
        {
            let frozen = self.frozen.borrow();
            let names: &[String] = match target {
                AssignTarget::Name(name) => std::slice::from_ref(name),
                AssignTarget::Destructure(names) => names,
            };
            for name in names {
                if frozen.contains(name) {
                    return raise(
                        ErrorKind::ValidationError,
                        format!("binding '{name}' is frozen"),
                        pos,
                    );
                }
            }
        }
        let value = self.exec(value_expr, scope).await?;
        match target {
            AssignTarget::Name(name) => {
                self.scopes.borrow_mut().assign(scope, name, value.clone());
                if value_expr.node.has_tag("frozen") {
                    self.frozen.borrow_mut().insert(name.clone());
                }
            }
            AssignTarget::Destructure(names) => {
                let Value::List(items) = &value else {
                    return raise(
                        ErrorKind::TypeError,
                        format!("cannot destructure a {}", value.type_name()),
                        pos,
                    );
                };
                let mut scopes = self.scopes.borrow_mut();
                for (i, name) in names.iter().enumerate() {
                    let item = items.get(i).cloned().unwrap_or(Value::Null);
                    scopes.assign(scope, name, item);
                }
                drop(scopes);
                if value_expr.node.has_tag("frozen") {
                    let mut frozen = self.frozen.borrow_mut();
                    for name in names {
                        frozen.insert(name.clone());
                    }
                }
            }
        }
        if !value_expr.node.has_tag("private") {
            self.set_ctx(value.clone());
        }
        Ok(value)
    }

    async fn exec_plus_assignment(&self, name: &str, value_expr: &Spanned, pos: Pos, scope: ScopeId) -> Flow<Value> {
        if self.frozen.borrow().contains(name) {
            return raise(
                ErrorKind::ValidationError,
                format!("binding '{name}' is frozen"),
                pos,
            );
        }
        let current = self.scopes.borrow().get(scope, name);
        let addition = self.exec(value_expr, scope).await?;
        let merged = current.merge(&addition);
        self.scopes.borrow_mut().assign(scope, name, merged.clone());
        if !value_expr.node.has_tag("private") {
            self.set_ctx(merged.clone());
        }
        Ok(merged)
    }

    async fn exec_for(&self, var: &str, iter: &Spanned, body: &[Spanned], pos: Pos, scope: ScopeId) -> Flow<Value> {
        let iterable = self.exec(iter, scope).await?;
        let Value::List(items) = iterable else {
            return raise(
                ErrorKind::TypeError,
                format!("'for' expects a list, got {}", iterable.type_name()),
                pos,
            );
        };
        let mut last = Value::Null;
        for item in items.iter() {
            let child = self.scopes.borrow_mut().child(scope);
            self.scopes.borrow_mut().set(child, var, item.clone());
            match self.run_block(body, child).await {
                Ok(value) => last = value,
                Err(Control::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(last)
    }

    async fn exec_while(&self, cond: &Spanned, body: &[Spanned], pos: Pos, scope: ScopeId) -> Flow<Value> {
        let mut last = Value::Null;
        let mut iterations = 0usize;
        loop {
            if !self.exec(cond, scope).await?.is_truthy() {
                return Ok(last);
            }
            if iterations >= WHILE_ITERATION_CAP {
                return raise(
                    ErrorKind::RuntimeError,
                    format!("'while' exceeded {WHILE_ITERATION_CAP} iterations"),
                    pos,
                );
            }
            iterations += 1;
            match self.run_block(body, scope).await {
                Ok(value) => last = value,
                Err(Control::Break) => return Ok(last),
                Err(other) => return Err(other),
            }
        }
    }

    /// Body first, condition after; `<retry=N>` overrides the iteration
    /// budget, `<fallback>`/`<best_effort>` decide what exhaustion yields.
    async fn exec_until(
        &self,
        cond: &Spanned,
        body: &[Spanned],
        tags: &crate::ast::Tags,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        let tag_set = self.resolve_tags(tags, scope).await?;
        let budget = tag_set.retry.map_or(UNTIL_DEFAULT_ITERATIONS, |n| n as usize);
        let mut last = Value::Null;
        for _ in 0..budget.max(1) {
            match self.run_block(body, scope).await {
                Ok(value) => last = value,
                Err(Control::Break) => return Ok(last),
                Err(other) => return Err(other),
            }
            if self.exec(cond, scope).await?.is_truthy() {
                return Ok(last);
            }
        }
        if let Some(fallback) = tag_set.fallback {
            self.trace("until exhausted: using fallback");
            return Ok(fallback);
        }
        if tag_set.best_effort {
            self.trace("until exhausted: best effort returns last value");
            return Ok(last);
        }
        raise(
            ErrorKind::ValidationError,
            format!("'until' condition not met after {} iterations", budget.max(1)),
            pos,
        )
    }

    async fn exec_try(
        &self,
        body: &[Spanned],
        excepts: &[ExceptArm],
        finally: Option<&[Spanned]>,
        scope: ScopeId,
    ) -> Flow<Value> {
        let outcome = match self.run_block(body, scope).await {
            Err(Control::Raise(err)) => {
                let arm = excepts.iter().find(|arm| match &arm.kind {
                    None => true,
                    Some(kind_name) => ErrorKind::from_str(kind_name)
                        .is_ok_and(|handler| err.kind.caught_by(handler)),
                });
                match arm {
                    // Arms run in the enclosing scope so their bindings
                    // survive the handler.
                    Some(arm) => {
                        if let Some(bind) = &arm.bind {
                            let mut entry = IndexMap::new();
                            entry.insert("kind".to_owned(), Value::string(err.kind.to_string()));
                            entry.insert("message".to_owned(), Value::string(&err.message));
                            self.scopes.borrow_mut().set(scope, bind, Value::dict(entry));
                        }
                        self.run_block(&arm.body, scope).await
                    }
                    None => Err(Control::Raise(err)),
                }
            }
            // `return` (and `break`) pass through except arms untouched.
            other => other,
        };
        if let Some(cleanup) = finally {
            if let Err(ctl) = self.run_block(cleanup, scope).await {
                match (&outcome, ctl) {
                    // Cleanup failure never masks the original error.
                    (Err(_), Control::Raise(err)) => {
                        log::warn!("error in 'finally' block: {err}");
                        self.trace(format!("finally error suppressed: {err}"));
                    }
                    (_, ctl) => return Err(ctl),
                }
            }
        }
        outcome
    }

    async fn exec_require(
        &self,
        cond: &Spanned,
        message: Option<&Spanned>,
        pos: Pos,
        scope: ScopeId,
    ) -> Flow<Value> {
        // `require MCP("x")` / `require Plugin("x")` check tool availability
        // and fail with ToolNotFound instead of PermissionDenied.
        if let Node::Operation { name, args, .. } = &cond.node {
            if name == "MCP" || name == "Plugin" {
                let target = match args.first() {
                    Some(arg) => self.exec(&arg.value, scope).await?.display(),
                    None => String::new(),
                };
                let available = if name == "MCP" {
                    self.mcp_available(&target)
                } else {
                    self.plugin_available(&target)
                };
                if available {
                    return Ok(Value::Null);
                }
                let what = if name == "MCP" { "MCP server" } else { "plugin" };
                return raise(
                    ErrorKind::ToolNotFound,
                    format!("required {what} '{target}' is not available"),
                    pos,
                );
            }
        }
        if self.exec(cond, scope).await?.is_truthy() {
            return Ok(Value::Null);
        }
        let msg = match message {
            Some(expr) => self.exec(expr, scope).await?.display(),
            None => "requirement not met".to_owned(),
        };
        raise(ErrorKind::PermissionDenied, msg, pos)
    }

    fn exec_definition(&self, def: &Definition, scope: ScopeId) {
        let callable = std::rc::Rc::new(Callable {
            name: def.name.clone(),
            params: def.params.clone(),
            body: std::rc::Rc::new(def.body.clone()),
            scope,
            is_agent: def.is_agent,
        });
        self.scopes
            .borrow_mut()
            .set(scope, &def.name, Value::Callable(callable.clone()));
        if def.is_agent {
            self.agents.borrow_mut().insert(def.name.clone(), callable);
        } else {
            self.macros.borrow_mut().insert(def.name.clone(), callable);
        }
    }
}

/// Comparison: structural for `==`/`!=`; ordering is numeric for numbers and
/// lexicographic for strings, a `TypeError` otherwise.
fn compare(op: CmpOp, lhs: &Value, rhs: &Value, pos: Pos) -> Flow<Value> {
    match op {
        CmpOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        CmpOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Value::Number { value: a, .. }, Value::Number { value: b, .. }) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            return raise(
                ErrorKind::TypeError,
                format!("cannot order {} and {}", lhs.type_name(), rhs.type_name()),
                pos,
            );
        }
    };
    let Some(ordering) = ordering else {
        // NaN compares false against everything.
        return Ok(Value::Bool(false));
    };
    let result = match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::LtEq => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::GtEq => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    };
    Ok(Value::Bool(result))
}

/// `in`: list membership, substring, dict key; false for anything else.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|item| item == needle),
        Value::Str(text) => match needle {
            Value::Str(sub) => text.contains(sub.as_ref()),
            _ => false,
        },
        Value::Dict(entries) => match needle {
            Value::Str(key) => entries.contains_key(key.as_ref()),
            _ => false,
        },
        _ => false,
    }
}

/// Member access. Missing keys and unsupported receivers yield `Null`, like
/// unbound identifiers.
fn member(value: &Value, field: &str) -> Value {
    match value {
        Value::Dict(entries) => entries.get(field).cloned().unwrap_or(Value::Null),
        Value::Event(event) => match field {
            "name" => Value::string(&event.name),
            "payload" => event.payload.clone(),
            _ => Value::Null,
        },
        Value::Asset(asset) => match field {
            "mediaType" => Value::string(asset.media.to_string()),
            "mime" => Value::string(&asset.mime),
            "path" => asset.path.as_deref().map_or(Value::Null, Value::string),
            "url" => asset.url.as_deref().map_or(Value::Null, Value::string),
            "description" => Value::string(&asset.description),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Indexing: lists and strings by number (negative counts from the end,
/// out of range is `Null`), dicts by string key.
fn index_value(value: &Value, index: &Value, pos: Pos) -> Flow<Value> {
    match (value, index) {
        (Value::List(items), Value::Number { value: n, .. }) => {
            Ok(offset(items.len(), *n).and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
        }
        (Value::Str(text), Value::Number { value: n, .. }) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(offset(chars.len(), *n)
                .and_then(|i| chars.get(i).map(|c| Value::string(c.to_string())))
                .unwrap_or(Value::Null))
        }
        (Value::Dict(entries), Value::Str(key)) => {
            Ok(entries.get(key.as_ref()).cloned().unwrap_or(Value::Null))
        }
        _ => raise(
            ErrorKind::TypeError,
            format!(
                "cannot index {} with {}",
                value.type_name(),
                index.type_name()
            ),
            pos,
        ),
    }
}

fn offset(len: usize, n: f64) -> Option<usize> {
    let i = n as i64;
    let idx = if i < 0 { len as i64 + i } else { i };
    usize::try_from(idx).ok().filter(|&i| i < len)
}

impl Interp {
    /// `-`, `*`, `/`. Numbers use standard float arithmetic (`/` may yield
    /// infinities or NaN). Strings: `*` is raw concatenation, `/` strips
    /// every occurrence of the right side, `-` delegates semantic removal to
    /// the Provider's `Subtract` operation. Mixed operand types are `Null`.
    async fn arith(&self, op: ArithOp, lhs: Value, rhs: Value, pos: Pos) -> Flow<Value> {
        match (op, &lhs, &rhs) {
            (op, Value::Number { value: a, unit: ua }, Value::Number { value: b, unit: ub }) => {
                let value = match op {
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                };
                Ok(Value::Number {
                    value,
                    unit: if ua == ub { *ua } else { None },
                })
            }
            (ArithOp::Mul, Value::Str(a), Value::Str(b)) => Ok(Value::string(format!("{a}{b}"))),
            (ArithOp::Div, Value::Str(a), Value::Str(b)) => {
                if b.is_empty() || !a.contains(b.as_ref()) {
                    Ok(lhs.clone())
                } else {
                    Ok(Value::string(a.replace(b.as_ref(), "")))
                }
            }
            (ArithOp::Sub, Value::Str(a), Value::Str(b)) => {
                let mut context = IndexMap::new();
                context.insert("remove".to_owned(), b.to_string());
                self.meter.borrow_mut().operations += 1;
                self.provider
                    .execute("Subtract", a, &context, &[], &[])
                    .await
                    .map_err(|err| Control::Raise(err.at(pos)))
            }
            _ => Ok(Value::Null),
        }
    }
}
