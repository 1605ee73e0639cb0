use phasec_error::{ResolveError, ResolveResult};
use phasec_tree::{NodeId, ResolvePhase, Tree, fields::NodeEntity, visit::Ownership};
use std::fmt::Debug;

pub(crate) fn unsupported(tree: &Tree, node: NodeId, phase: ResolvePhase) -> ResolveError {
    ResolveError::UnsupportedTarget {
        node,
        kind: tree.node(node).tag(),
        phase,
    }
}

pub(crate) fn violation(
    tree: &Tree,
    node: NodeId,
    phase: ResolvePhase,
    expected: &str,
    found: String,
) -> ResolveError {
    let element = tree.node(node);
    ResolveError::ConsistencyViolation {
        node,
        kind: element.tag(),
        span: element.span,
        phase,
        expected: expected.to_string(),
        found,
    }
}

/// Checks `resolved` on every `E` owned by `target`, reporting the first
/// element that fails.
pub(crate) fn check_owned<E: NodeEntity + Debug>(
    tree: &Tree,
    target: NodeId,
    ownership: Ownership,
    phase: ResolvePhase,
    expected: &str,
    resolved: fn(&E) -> bool,
) -> ResolveResult<()> {
    for element in tree.owned_elements(target, ownership) {
        let failure = tree
            .with_fields(element, |entity: &E| (!resolved(entity)).then(|| format!("{entity:?}")))
            .flatten();
        if let Some(found) = failure {
            return Err(violation(tree, element, phase, expected, found));
        }
    }
    Ok(())
}
