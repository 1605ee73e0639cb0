use crate::error::{DriverError, DriverResult};
use phasec_error::{ResolveError, ResolveResult};
use phasec_resolve::{ResolveSession, ResolveTarget};
use phasec_tree::{NodeId, ResolvePhase, Tree, node::NodeKind};
use std::{panic, thread};

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub node: NodeId,
}

/// Declarations named on the command line, or every declaration in the tree.
pub fn targets(tree: &Tree, names: &[String]) -> DriverResult<Vec<Target>> {
    if names.is_empty() {
        let all = tree
            .declarations()
            .map(|node| Target {
                name: display_name(tree, node),
                node,
            })
            .collect();
        return Ok(all);
    }
    names
        .iter()
        .map(|name| {
            tree.find(name)
                .map(|node| Target {
                    name: name.clone(),
                    node,
                })
                .ok_or_else(|| DriverError::UnknownTarget(name.clone()))
        })
        .collect()
}

fn display_name(tree: &Tree, node: NodeId) -> String {
    let element = tree.node(node);
    match (&element.kind, element.name()) {
        (NodeKind::File(file), _) => file.name.to_string(),
        (_, Some(_)) => tree.qualified_name(node),
        (_, None) => format!("{} #{}", element.tag(), node.index()),
    }
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub resolved: usize,
    pub retried: usize,
    pub failures: Vec<(String, ResolveError)>,
}

/// Resolves `targets` to `phase` on `threads` workers. A target that lost a
/// cross-thread cycle is retried on the calling thread once the workers are
/// done, where the cycle surfaces as a diagnostic instead.
pub fn resolve_targets(session: &ResolveSession, targets: &[Target], phase: ResolvePhase, threads: usize) -> Outcome {
    let threads = threads.clamp(1, targets.len().max(1));
    let mut results: Vec<(usize, ResolveResult<()>)> = thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                scope.spawn(move || {
                    targets
                        .iter()
                        .enumerate()
                        .skip(worker)
                        .step_by(threads)
                        .map(|(index, target)| (index, session.resolve(ResolveTarget::Declaration(target.node), phase)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect()
    });
    results.sort_by_key(|(index, _)| *index);

    let mut outcome = Outcome::default();
    for (index, result) in results {
        let target = &targets[index];
        let result = match result {
            Err(ResolveError::CyclicDependency { chain }) => {
                tracing::warn!(declaration = %target.name, %chain, "retrying after a cross-thread cycle");
                outcome.retried += 1;
                session.resolve(ResolveTarget::Declaration(target.node), phase)
            }
            other => other,
        };
        match result {
            Ok(()) => outcome.resolved += 1,
            Err(error) => outcome.failures.push((target.name.clone(), error)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasec_tree::{TreeBuilder, fields::Expression, node::StatementKind};
    use std::sync::Arc;

    fn session() -> ResolveSession {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        for index in 0..6 {
            let name = format!("f{index}");
            let callee = format!("f{}", (index + 1) % 6);
            let function = builder.function(file, &name, None);
            builder.statement(function, StatementKind::Return, Expression::call(&callee, vec![]));
        }
        ResolveSession::standard(Arc::new(builder.finish()))
    }

    #[test]
    fn test_every_declaration_is_a_default_target() {
        let session = session();
        let targets = targets(session.tree(), &[]).unwrap();
        assert_eq!(targets.len(), 7);
        assert_eq!(targets[0].name, "main.kt");
        assert_eq!(targets[1].name, "app.f0");
    }

    #[test]
    fn test_unknown_target() {
        let session = session();
        let error = targets(session.tree(), &["app.nope".to_string()]).unwrap_err();
        assert!(matches!(error, DriverError::UnknownTarget(name) if name == "app.nope"));
    }

    #[test]
    fn test_parallel_resolution_of_a_call_cycle() {
        let session = session();
        let targets = targets(session.tree(), &[]).unwrap();
        let outcome = resolve_targets(&session, &targets, ResolvePhase::BodyResolve, 4);
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(outcome.resolved, targets.len());
        for target in &targets {
            assert_eq!(session.tree().phase(target.node), ResolvePhase::BodyResolve);
        }
    }
}
