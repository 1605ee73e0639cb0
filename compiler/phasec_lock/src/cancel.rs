use phasec_error::{ResolveError, ResolveResult};
use phasec_tree::{NodeId, ResolvePhase};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation flag shared between a request and whoever may
/// supersede it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self, node: NodeId, phase: ResolvePhase) -> ResolveResult<()> {
        if self.is_cancelled() {
            return Err(ResolveError::Cancelled { node, phase });
        }
        Ok(())
    }
}
