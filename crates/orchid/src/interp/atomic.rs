//! Atomic blocks: snapshot, execute in a child scope, commit or restore.
//!
//! The snapshot covers everything a block can touch that is visible outside
//! it: the implicit context, every scope on the chain (an `:=` inside the
//! block may update an enclosing binding in place), the event hub, and the
//! checkpoint table. Commit happens on normal completion and on `return`;
//! everything else restores.

use crate::{
    ast::Spanned,
    env::ScopeId,
    error::{Control, Flow},
    value::Value,
};

use super::Interp;

impl Interp {
    pub(crate) async fn exec_atomic(&self, body: &[Spanned], scope: ScopeId) -> Flow<Value> {
        let ctx_snapshot = self.get_ctx();
        let chain_snapshot = self.scopes.borrow().chain_snapshot(scope);
        let hub_snapshot = self.hub.borrow().snapshot();
        let checkpoint_snapshot = self.checkpoints.borrow().clone();

        let child = self.scopes.borrow_mut().child(scope);
        self.trace("atomic begin");
        let result = self.run_block(body, child).await;
        match result {
            Ok(value) => {
                self.scopes.borrow_mut().commit_to_parent(child);
                self.trace("atomic commit");
                Ok(value)
            }
            // `return` still commits; the signal keeps propagating.
            Err(Control::Return(value)) => {
                self.scopes.borrow_mut().commit_to_parent(child);
                self.trace("atomic commit (return)");
                Err(Control::Return(value))
            }
            Err(ctl) => {
                self.set_ctx(ctx_snapshot);
                self.scopes.borrow_mut().restore_chain(chain_snapshot);
                self.hub.borrow_mut().restore(hub_snapshot);
                *self.checkpoints.borrow_mut() = checkpoint_snapshot;
                self.trace("atomic rollback");
                Err(ctl)
            }
        }
    }
}
