//! Per-round branch state.

use crate::store::BranchStore;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Cancellation context for one engine request.
///
/// Cloning is cheap; clones observe the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    /// A context that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Whether the request has been cancelled (shutdown in progress).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Trigger cancellation. Used by the node's shutdown path and by tests.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Completes when the context is cancelled. Collaborators select against
    /// this so a shutdown interrupts blocked external calls.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// A branch of the committed multi-store plus an execution context.
///
/// Created fresh per proposal round and owned exclusively by the phase that
/// created it until it is discarded or written back into the root store.
///
/// The context is the one concurrently touched part: query handlers may read
/// it while the active phase re-points it, so it sits behind a read/write
/// lock and is reachable only through the accessors.
pub struct State {
    branch: Box<dyn BranchStore>,
    ctx: RwLock<RequestContext>,
}

impl State {
    pub fn new(branch: Box<dyn BranchStore>, ctx: RequestContext) -> Self {
        Self {
            branch,
            ctx: RwLock::new(ctx),
        }
    }

    /// Snapshot of the current request context.
    pub fn context(&self) -> RequestContext {
        self.ctx.read().clone()
    }

    /// Re-point the state at a new request's context.
    pub fn set_context(&self, ctx: RequestContext) {
        *self.ctx.write() = ctx;
    }

    /// Read access to the branch.
    pub fn branch(&self) -> &dyn BranchStore {
        self.branch.as_ref()
    }

    /// Write access to the branch.
    pub fn branch_mut(&mut self) -> &mut dyn BranchStore {
        self.branch.as_mut()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("cancelled", &self.ctx.read().is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RootStore};

    #[test]
    fn test_context_swap_is_observable() {
        let store = MemoryStore::new();
        let state = State::new(store.branch(), RequestContext::new());
        assert!(!state.context().is_cancelled());

        let replacement = RequestContext::new();
        replacement.cancel();
        state.set_context(replacement);
        assert!(state.context().is_cancelled());
    }

    #[test]
    fn test_context_clones_share_cancellation() {
        let ctx = RequestContext::new();
        let observer = ctx.clone();
        assert!(!observer.is_cancelled());
        ctx.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_branch_mutation_through_state() {
        let store = MemoryStore::new();
        let mut state = State::new(store.branch(), RequestContext::new());
        state.branch_mut().set(b"k", b"v");
        assert_eq!(state.branch().get(b"k"), Some(b"v".to_vec()));
    }
}
