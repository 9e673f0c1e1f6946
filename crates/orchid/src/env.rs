//! Lexically chained scopes stored in an arena.
//!
//! Scopes are nodes in a central [`Scopes`] arena addressed by stable
//! [`ScopeId`] handles; a closure stores a handle, never an owning pointer,
//! so no cycle collection is needed. Scopes live for the session — module
//! environments and closure environments stay valid for as long as the
//! interpreter that owns the arena.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable handle for a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("scope arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Scope {
    vars: IndexMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Arena owning every scope created during a session.
#[derive(Debug, Default)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new root scope with no parent (a global scope — the main
    /// program's, a module's, or a script plugin's).
    pub fn new_root(&mut self) -> ScopeId {
        self.push(Scope {
            vars: IndexMap::new(),
            parent: None,
        })
    }

    /// Creates an empty child of `parent`.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.push(Scope {
            vars: IndexMap::new(),
            parent: Some(parent),
        })
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(scope);
        id
    }

    fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// Looks `name` up along the parent chain; unbound names are `Null`.
    #[must_use]
    pub fn get(&self, id: ScopeId, name: &str) -> Value {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.scope(current);
            if let Some(value) = scope.vars.get(name) {
                return value.clone();
            }
            cursor = scope.parent;
        }
        Value::Null
    }

    /// True when `name` is bound anywhere along the chain.
    #[must_use]
    pub fn is_bound(&self, id: ScopeId, name: &str) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.scope(current);
            if scope.vars.contains_key(name) {
                return true;
            }
            cursor = scope.parent;
        }
        false
    }

    /// Binds `name` in scope `id` itself.
    pub fn set(&mut self, id: ScopeId, name: impl Into<String>, value: Value) {
        self.scope_mut(id).vars.insert(name.into(), value);
    }

    /// Walks the chain for an existing binding of `name` and updates it in
    /// place; falls back to binding in `id` when unbound anywhere.
    pub fn assign(&mut self, id: ScopeId, name: &str, value: Value) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.scope(current).vars.contains_key(name) {
                self.scope_mut(current).vars.insert(name.to_owned(), value);
                return;
            }
            cursor = self.scope(current).parent;
        }
        self.set(id, name, value);
    }

    /// Copies this scope's own bindings into its parent. No-op for roots.
    pub fn commit_to_parent(&mut self, id: ScopeId) {
        let Some(parent) = self.scope(id).parent else {
            return;
        };
        let bindings: Vec<(String, Value)> = self
            .scope(id)
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in bindings {
            self.scope_mut(parent).vars.insert(name, value);
        }
    }

    /// Snapshot of the scope's own bindings (not the chain).
    #[must_use]
    pub fn own_bindings(&self, id: ScopeId) -> IndexMap<String, Value> {
        self.scope(id).vars.clone()
    }

    /// Replaces the scope's own bindings with a snapshot.
    pub fn restore_bindings(&mut self, id: ScopeId, bindings: IndexMap<String, Value>) {
        self.scope_mut(id).vars = bindings;
    }

    /// Snapshot of every scope's own bindings from `id` up to the root.
    ///
    /// An atomic block must be able to undo writes that `assign` routed into
    /// enclosing scopes, so the whole chain is captured. Values are
    /// `Rc`-backed, so this is a table clone, not a deep copy.
    #[must_use]
    pub fn chain_snapshot(&self, id: ScopeId) -> Vec<(ScopeId, IndexMap<String, Value>)> {
        let mut snapshot = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            snapshot.push((current, self.scope(current).vars.clone()));
            cursor = self.scope(current).parent;
        }
        snapshot
    }

    /// Restores a snapshot taken with [`Scopes::chain_snapshot`].
    pub fn restore_chain(&mut self, snapshot: Vec<(ScopeId, IndexMap<String, Value>)>) {
        for (id, bindings) in snapshot {
            self.scope_mut(id).vars = bindings;
        }
    }
}
