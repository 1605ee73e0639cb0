use crate::ScopeSnapshot;
use phasec_tree::ResolvePhase;
use std::sync::{Mutex, PoisonError};

/// Observer of the scopes seen while resolving, for tooling that needs to know
/// what was visible at a given element. Never influences resolution.
pub trait ContextCollector: Send + Sync {
    fn collect(&self, phase: ResolvePhase, snapshot: &ScopeSnapshot);
}

#[derive(Debug, Default)]
pub struct RecordingCollector {
    snapshots: Mutex<Vec<(ResolvePhase, ScopeSnapshot)>>,
}

impl RecordingCollector {
    pub fn new() -> RecordingCollector {
        RecordingCollector::default()
    }

    pub fn snapshots(&self) -> Vec<(ResolvePhase, ScopeSnapshot)> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContextCollector for RecordingCollector {
    fn collect(&self, phase: ResolvePhase, snapshot: &ScopeSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((phase, snapshot.clone()));
    }
}
