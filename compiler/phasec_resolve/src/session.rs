use crate::{ContextCollector, LazyResolverRegistry, ResolveCx, SymbolProvider};
use phasec_error::{ResolveError, ResolveResult};
use phasec_lock::{CancellationToken, LockProvider};
use phasec_tree::{NodeId, ResolvePhase, Tree};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Run the consistency check after every transformation.
    pub verify: bool,
    /// How often a thread waiting for a lock rechecks cancellation.
    pub lock_poll_interval_ms: u64,
    /// Record scope snapshots while resolving.
    pub collect_context: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            verify: cfg!(debug_assertions),
            lock_poll_interval_ms: 10,
            collect_context: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTarget {
    /// The declaration alone (plus whatever it depends on).
    Declaration(NodeId),
    /// The declaration and every declaration nested in it, in pre-order.
    Subtree(NodeId),
}

impl ResolveTarget {
    pub fn root(self) -> NodeId {
        match self {
            ResolveTarget::Declaration(root) | ResolveTarget::Subtree(root) => root,
        }
    }
}

impl From<NodeId> for ResolveTarget {
    fn from(node: NodeId) -> Self {
        ResolveTarget::Declaration(node)
    }
}

/// Lazy resolution over one frozen tree. Shareable across threads.
pub struct ResolveSession {
    tree: Arc<Tree>,
    registry: LazyResolverRegistry,
    locks: LockProvider,
    symbols: SymbolProvider,
    collector: Option<Arc<dyn ContextCollector>>,
    config: SessionConfig,
}

impl ResolveSession {
    pub fn new(tree: Arc<Tree>, registry: LazyResolverRegistry, config: SessionConfig) -> ResolveSession {
        let symbols = SymbolProvider::new(&tree);
        let locks = LockProvider::new(Duration::from_millis(config.lock_poll_interval_ms.max(1)));
        ResolveSession {
            tree,
            registry,
            locks,
            symbols,
            collector: None,
            config,
        }
    }

    /// A session with the standard resolvers and default configuration.
    pub fn standard(tree: Arc<Tree>) -> ResolveSession {
        ResolveSession::new(tree, LazyResolverRegistry::standard(), SessionConfig::default())
    }

    pub fn with_collector(mut self, collector: Arc<dyn ContextCollector>) -> ResolveSession {
        self.collector = Some(collector);
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolProvider {
        &self.symbols
    }

    pub fn locks(&self) -> &LockProvider {
        &self.locks
    }

    pub(crate) fn registry(&self) -> &LazyResolverRegistry {
        &self.registry
    }

    pub(crate) fn collector(&self) -> Option<&dyn ContextCollector> {
        self.collector.as_deref()
    }

    /// Brings `target` to `phase`. Returns once the phase is published, or
    /// with the tree unchanged by the failed step.
    pub fn resolve(&self, target: impl Into<ResolveTarget>, phase: ResolvePhase) -> ResolveResult<()> {
        self.resolve_cancellable(target, phase, &CancellationToken::new())
    }

    pub fn resolve_cancellable(
        &self,
        target: impl Into<ResolveTarget>,
        phase: ResolvePhase,
        cancel: &CancellationToken,
    ) -> ResolveResult<()> {
        let target = target.into();
        let root = target.root();
        let node = self.tree.node(root);
        if !node.is_declaration() {
            return Err(ResolveError::UnsupportedTarget {
                node: root,
                kind: node.tag(),
                phase,
            });
        }
        let cx = ResolveCx::new(self, cancel);
        match target {
            ResolveTarget::Declaration(root) => cx.resolve(root, phase),
            ResolveTarget::Subtree(root) => {
                for declaration in self.tree.nested_declarations(root) {
                    cx.resolve(declaration, phase)?;
                }
                Ok(())
            }
        }
    }

    /// Resolves every declaration of every file.
    pub fn resolve_all(&self, phase: ResolvePhase) -> ResolveResult<()> {
        for &file in self.tree.files() {
            self.resolve(ResolveTarget::Subtree(file), phase)?;
        }
        Ok(())
    }
}
