//! Parallel fork.
//!
//! Branches run concurrently as cooperative futures on the single task,
//! gathered with `try_join_all` — which also supplies the cancellation
//! contract: the first branch failure drops every sibling future, aborting
//! their pending suspensions.
//!
//! Each branch keeps a local implicit context. Around every branch
//! statement the local context is written into the shared slot and read
//! back afterwards, so branches never observe each other's intermediate
//! contexts across interleaved suspensions.

use futures::future::{LocalBoxFuture, try_join_all};
use indexmap::IndexMap;

use crate::{
    ast::{ForkBody, Spanned},
    env::ScopeId,
    error::{ErrorKind, Flow, raise},
    token::Pos,
    value::Value,
};

use super::Interp;

impl Interp {
    pub(crate) async fn eval_fork(
        &self,
        count: Option<usize>,
        body: &ForkBody,
        scope: ScopeId,
        pos: Pos,
    ) -> Flow<Value> {
        let start_ctx = self.get_ctx();
        let result = match body {
            ForkBody::Branches(branches) => {
                self.trace(format!("fork start ({} branches)", branches.len()));
                let mut futures: Vec<LocalBoxFuture<'_, Flow<Value>>> = Vec::with_capacity(branches.len());
                for branch in branches {
                    let child = self.scopes.borrow_mut().child(scope);
                    let ctx = start_ctx.clone();
                    futures.push(Box::pin(
                        self.run_branch(std::slice::from_ref(&branch.expr), child, ctx),
                    ));
                }
                let values = try_join_all(futures).await?;
                if branches[0].name.is_some() {
                    let mut entries = IndexMap::with_capacity(values.len());
                    for (branch, value) in branches.iter().zip(values) {
                        let name = branch.name.clone().unwrap_or_default();
                        entries.insert(name, value);
                    }
                    Value::dict(entries)
                } else {
                    Value::list(values)
                }
            }
            ForkBody::For { var, iter, body } => {
                let iterable = self.exec(iter, scope).await?;
                let Value::List(items) = iterable else {
                    return raise(
                        ErrorKind::TypeError,
                        format!("fork 'for' expects a list, got {}", iterable.type_name()),
                        pos,
                    );
                };
                self.trace(format!("fork start ({} elements)", items.len()));
                // `fork[N]` caps concurrency: elements run in chunks of N.
                let chunk_size = count.unwrap_or(items.len()).max(1);
                let mut results = Vec::with_capacity(items.len());
                for chunk in items.chunks(chunk_size) {
                    let mut futures: Vec<LocalBoxFuture<'_, Flow<Value>>> = Vec::with_capacity(chunk.len());
                    for item in chunk {
                        let child = self.scopes.borrow_mut().child(scope);
                        self.scopes.borrow_mut().set(child, var, item.clone());
                        futures.push(Box::pin(self.run_branch(body, child, start_ctx.clone())));
                    }
                    results.extend(try_join_all(futures).await?);
                }
                Value::list(results)
            }
        };
        // The fork result becomes the caller's implicit context.
        self.set_ctx(result.clone());
        self.trace("fork end");
        Ok(result)
    }

    /// Runs one branch with the per-statement context stash/restore
    /// discipline.
    async fn run_branch(&self, body: &[Spanned], scope: ScopeId, start_ctx: Value) -> Flow<Value> {
        let mut local = start_ctx;
        let mut last = Value::Null;
        for stmt in body {
            self.set_ctx(local.clone());
            last = self.exec_and_update(stmt, scope).await?;
            local = self.get_ctx();
        }
        Ok(last)
    }
}
