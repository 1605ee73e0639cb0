//! Engine error taxonomy.
//!
//! These are failures of the resolution machinery itself. Problems in the
//! program being resolved (an unknown name, a recursive alias) are recorded in
//! the tree as [`phasec_tree::fields::Diagnostic`]s and never surface here.

use phasec_span::Span;
use phasec_tree::{NodeId, ResolvePhase, node::NodeTag};
use std::fmt;
use thiserror::Error;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// One `(node, phase)` request on a dependency chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseRequest {
    pub node: NodeId,
    pub phase: ResolvePhase,
}

impl fmt::Display for PhaseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.node.index(), self.phase)
    }
}

/// Requests forming a dependency cycle, starting and ending with the same node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestChain(pub Vec<PhaseRequest>);

impl fmt::Display for RequestChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, request) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{request}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A resolver was handed a node kind it has no rule for.
    #[error("internal error: {phase} resolver cannot handle {kind} #{}", .node.index())]
    UnsupportedTarget {
        node: NodeId,
        kind: NodeTag,
        phase: ResolvePhase,
    },

    /// A resolver claimed a phase whose guarantees do not hold.
    #[error(
        "internal error: {kind} #{} at {span} is not resolved to {phase}: expected {expected}, found {found}",
        .node.index()
    )]
    ConsistencyViolation {
        node: NodeId,
        kind: NodeTag,
        span: Span,
        phase: ResolvePhase,
        expected: String,
        found: String,
    },

    #[error("cyclic dependency between resolution requests: {chain}")]
    CyclicDependency { chain: RequestChain },

    #[error("resolution of #{} to {phase} was cancelled", .node.index())]
    Cancelled { node: NodeId, phase: ResolvePhase },

    /// A transformation failed (or panicked) and its effects were rolled back.
    #[error("resolution of #{} to {phase} failed: {message}", .node.index())]
    Fault {
        node: NodeId,
        phase: ResolvePhase,
        message: String,
    },

    #[error("no resolver registered for phase {0}")]
    UnregisteredPhase(ResolvePhase),

    #[error("more than one resolver registered for phase {0}")]
    DuplicateResolver(ResolvePhase),
}

impl ResolveError {
    /// Defects in a resolver or the registry, as opposed to cycles and cancellation.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ResolveError::UnsupportedTarget { .. }
                | ResolveError::ConsistencyViolation { .. }
                | ResolveError::UnregisteredPhase(_)
                | ResolveError::DuplicateResolver(_)
        )
    }

    pub fn cycle(chain: Vec<PhaseRequest>) -> ResolveError {
        ResolveError::CyclicDependency {
            chain: RequestChain(chain),
        }
    }
}
