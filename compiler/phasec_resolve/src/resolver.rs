use crate::{ResolveSession, ScopeSnapshot, SymbolProvider};
use phasec_error::{PhaseRequest, ResolveError, ResolveResult};
use phasec_keeper::KeeperGuard;
use phasec_lock::CancellationToken;
use phasec_tree::{NodeId, ResolvePhase, Tree};
use std::{
    any::Any,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
};

/// Moves a single declaration to one phase.
pub trait LazyResolver: Send + Sync {
    fn phase(&self) -> ResolvePhase;

    /// Captures and arranges everything `transform` may write for `target`.
    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t>;

    /// Performs the phase transformation. Runs under the target's lock, with
    /// every enclosing declaration and every earlier phase already done.
    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()>;

    /// Verifies, without side effects, that `target` satisfies the phase.
    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()>;
}

/// State of one resolution request on the current thread.
pub struct ResolveCx<'s> {
    session: &'s ResolveSession,
    cancel: &'s CancellationToken,
    stack: RefCell<Vec<PhaseRequest>>,
}

impl<'s> ResolveCx<'s> {
    pub(crate) fn new(session: &'s ResolveSession, cancel: &'s CancellationToken) -> Self {
        ResolveCx {
            session,
            cancel,
            stack: RefCell::new(Vec::new()),
        }
    }

    pub fn tree(&self) -> &'s Tree {
        self.session.tree()
    }

    pub fn symbols(&self) -> &'s SymbolProvider {
        self.session.symbols()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    /// Sends `snapshot` to the session's context collector, if any. `build`
    /// only runs when a collector is installed.
    pub fn collect(&self, phase: ResolvePhase, build: impl FnOnce() -> ScopeSnapshot) {
        if let Some(collector) = self.session.collector() {
            collector.collect(phase, &build());
        }
    }

    /// Brings `node` to `phase`, running every missing phase on the node and
    /// its enclosing declarations, outermost first.
    pub fn resolve(&self, node: NodeId, phase: ResolvePhase) -> ResolveResult<()> {
        let tree = self.tree();
        if tree.phase(node) >= phase {
            return Ok(());
        }
        let designation = tree.designation(node);
        for step in phase.iter_until() {
            for (index, &current) in designation.iter().enumerate() {
                let enclosing = index + 1 < designation.len();
                self.resolve_one(current, step, enclosing)?;
            }
        }
        Ok(())
    }

    fn resolve_one(&self, node: NodeId, phase: ResolvePhase, enclosing: bool) -> ResolveResult<()> {
        let tree = self.tree();
        if tree.phase(node) >= phase {
            return Ok(());
        }
        let request = PhaseRequest { node, phase };
        let active = self.stack.borrow().iter().position(|active| active.node == node);
        if let Some(position) = active {
            // an enclosing declaration already in progress on this request
            if enclosing {
                return Ok(());
            }
            let mut chain = self.stack.borrow()[position..].to_vec();
            chain.push(request);
            tracing::debug!(node = node.index(), %phase, "recursive resolution request");
            return Err(ResolveError::cycle(chain));
        }

        let resolver = self.session.registry().resolver(phase);
        self.session.locks().with_lock(node, phase, self.cancel, || {
            if tree.phase(node) >= phase {
                return Ok(());
            }
            self.cancel.check(node, phase)?;
            self.stack.borrow_mut().push(request);
            let result = self.run(resolver, node, phase);
            self.stack.borrow_mut().pop();
            result
        })
    }

    fn run(&self, resolver: &dyn LazyResolver, node: NodeId, phase: ResolvePhase) -> ResolveResult<()> {
        let tree = self.tree();
        tracing::debug!(
            node = node.index(),
            kind = %tree.node(node).tag(),
            %phase,
            "resolving"
        );
        let guard = resolver.preserve(tree, node);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            resolver.transform(self, node)?;
            self.cancel.check(node, phase)?;
            if self.session.config().verify {
                resolver.check_is_resolved(tree, node)?;
            }
            Ok(())
        }));
        match outcome {
            Ok(Ok(())) => {
                guard.commit();
                tree.node(node).advance_phase(phase);
                Ok(())
            }
            Ok(Err(error)) => {
                tracing::warn!(node = node.index(), %phase, %error, "resolution rolled back");
                guard.rollback();
                Err(error)
            }
            Err(payload) => {
                guard.rollback();
                let message = panic_message(payload.as_ref());
                tracing::warn!(node = node.index(), %phase, %message, "resolver panicked, rolled back");
                Err(ResolveError::Fault {
                    node,
                    phase,
                    message,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "panic with a non-string payload".to_string()
}
