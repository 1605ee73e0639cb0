use crate::{
    NodeId,
    fields::{NodeEntity, NodeFields},
    node::{NodeKind, NodeTag},
    phase::{AtomicPhase, ResolvePhase},
};
use index_vec::IndexVec;
use phasec_span::{Span, Symbol};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub span: Span,
    pub kind: NodeKind,
    phase: AtomicPhase,
    fields: RwLock<NodeFields>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        parent: Option<NodeId>,
        span: Span,
        kind: NodeKind,
        phase: ResolvePhase,
        fields: NodeFields,
    ) -> Node {
        Node {
            id,
            parent,
            span,
            kind,
            phase: AtomicPhase::new(phase),
            fields: RwLock::new(fields),
        }
    }

    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn name(&self) -> Option<Symbol> {
        self.kind.name()
    }

    pub fn is_declaration(&self) -> bool {
        self.kind.is_declaration()
    }

    pub fn phase(&self) -> ResolvePhase {
        self.phase.get()
    }

    /// Publishes a new phase. Must only be called by the resolver holding the node's lock.
    pub fn advance_phase(&self, to: ResolvePhase) -> ResolvePhase {
        self.phase.advance(to)
    }

    // A panicking resolver is rolled back by the state keeper, so a poisoned
    // lock never guards half-written state.
    pub fn fields(&self) -> RwLockReadGuard<'_, NodeFields> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fields_mut(&self) -> RwLockWriteGuard<'_, NodeFields> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fields_snapshot(&self) -> NodeFields {
        self.fields().clone()
    }
}

/// Frozen declaration tree. Structure is immutable; phases and fields are not.
#[derive(Debug)]
pub struct Tree {
    nodes: IndexVec<NodeId, Node>,
    files: Vec<NodeId>,
}

impl Tree {
    pub(crate) fn new(nodes: IndexVec<NodeId, Node>, files: Vec<NodeId>) -> Tree {
        Tree { nodes, files }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn files(&self) -> &[NodeId] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id].kind.children()
    }

    pub fn phase(&self, id: NodeId) -> ResolvePhase {
        self.nodes[id].phase()
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&current| self.parent(current))
    }

    /// Nearest declaration strictly enclosing `id`.
    pub fn containing_declaration(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&ancestor| self.nodes[ancestor].is_declaration())
    }

    pub fn containing_file(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&current| matches!(self.nodes[current].kind, NodeKind::File(_)))
    }

    /// Declaration path from the file down to `id`, both included.
    pub fn designation(&self, id: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = self
            .ancestors(id)
            .filter(|&ancestor| self.nodes[ancestor].is_declaration())
            .collect();
        path.reverse();
        path.push(id);
        path
    }

    pub fn declarations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.is_declaration())
            .map(|node| node.id)
    }

    /// `root` followed by every declaration nested in it, in pre-order.
    pub fn nested_declarations(&self, root: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if self.nodes[current].is_declaration() {
                result.push(current);
            }
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        result
    }

    /// `package.Outer.inner`, built from the named declarations on the path.
    pub fn qualified_name(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut package = None;
        for current in self.designation(id) {
            match &self.nodes[current].kind {
                NodeKind::File(file) => package = Some(file.package),
                kind => {
                    if let Some(name) = kind.name() {
                        segments.push(name.as_str().to_string());
                    }
                }
            }
        }
        match package {
            Some(package) if !package.as_str().is_empty() => {
                format!("{}.{}", package, segments.join("."))
            }
            _ => segments.join("."),
        }
    }

    /// Finds a declaration by its qualified name.
    pub fn find(&self, qualified: &str) -> Option<NodeId> {
        self.declarations().find(|&id| {
            !matches!(self.nodes[id].kind, NodeKind::File(_)) && self.qualified_name(id) == qualified
        })
    }

    pub fn with_fields<E: NodeEntity, R>(&self, id: NodeId, f: impl FnOnce(&E) -> R) -> Option<R> {
        let fields = self.nodes[id].fields();
        E::project(&fields).map(f)
    }

    pub fn with_fields_mut<E: NodeEntity, R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut E) -> R,
    ) -> Option<R> {
        let mut fields = self.nodes[id].fields_mut();
        E::project_mut(&mut fields).map(f)
    }

    pub fn entity<E: NodeEntity + Clone>(&self, id: NodeId) -> Option<E> {
        self.with_fields(id, |entity: &E| entity.clone())
    }
}
