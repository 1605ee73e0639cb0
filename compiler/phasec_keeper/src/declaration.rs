use crate::keeper::{PreservedState, StateKeeper};
use phasec_tree::{Node, NodeId, Tree, fields::NodeEntity};

/// Walks a resolution target and decides which nodes to capture.
pub struct DeclarationKeeper {
    provider: fn(&Tree, NodeId, &mut DeclarationScope<'_>),
}

impl DeclarationKeeper {
    pub const fn new(provider: fn(&Tree, NodeId, &mut DeclarationScope<'_>)) -> DeclarationKeeper {
        DeclarationKeeper { provider }
    }

    /// A keeper that captures nothing.
    pub const EMPTY: DeclarationKeeper = DeclarationKeeper::new(|_, _, _| {});

    /// Captures the target's state and applies the arranged values. The
    /// returned guard rolls everything back unless committed.
    pub fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        let mut scope = DeclarationScope {
            tree,
            states: Vec::new(),
        };
        (self.provider)(tree, target, &mut scope);
        let mut states = scope.states;
        for state in &mut states {
            state.arrange(tree);
        }
        tracing::trace!(
            node = target.index(),
            captured = states.len(),
            "preserved declaration state"
        );
        KeeperGuard {
            tree,
            target,
            states,
            committed: false,
        }
    }
}

pub struct DeclarationScope<'t> {
    tree: &'t Tree,
    states: Vec<Box<dyn NodeState>>,
}

impl DeclarationScope<'_> {
    pub fn tree(&self) -> &Tree {
        self.tree
    }

    /// Captures the `E` fields of `node` through `keeper`, with the node as context.
    pub fn entity<E: NodeEntity>(&mut self, node: NodeId, keeper: &StateKeeper<E, Node>) {
        let owner = self.tree.node(node);
        let state = {
            let fields = owner.fields();
            let Some(entity) = E::project(&fields) else {
                return;
            };
            keeper.prepare(entity, owner)
        };
        if state.is_empty() {
            return;
        }
        self.states.push(Box::new(EntityState {
            node,
            state: Some(state),
        }));
    }
}

trait NodeState: Send {
    fn arrange(&mut self, tree: &Tree);
    fn restore(&mut self, tree: &Tree);
}

struct EntityState<E> {
    node: NodeId,
    state: Option<PreservedState<E>>,
}

impl<E: NodeEntity> NodeState for EntityState<E> {
    fn arrange(&mut self, tree: &Tree) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        tree.with_fields_mut(self.node, |entity: &mut E| state.arrange(entity));
    }

    fn restore(&mut self, tree: &Tree) {
        let Some(state) = self.state.take() else {
            return;
        };
        tree.with_fields_mut(self.node, |entity: &mut E| state.restore(entity));
    }
}

/// Pending rollback for one resolution. Dropping without [`commit`](Self::commit)
/// restores the captured state, including while unwinding from a panic.
#[must_use]
pub struct KeeperGuard<'t> {
    tree: &'t Tree,
    target: NodeId,
    states: Vec<Box<dyn NodeState>>,
    committed: bool,
}

impl KeeperGuard<'_> {
    pub fn commit(mut self) {
        self.committed = true;
        self.states.clear();
    }

    pub fn rollback(self) {
        // drop performs the rollback
    }

    pub fn captured(&self) -> usize {
        self.states.len()
    }
}

impl Drop for KeeperGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if !self.states.is_empty() {
            tracing::warn!(node = self.target.index(), "rolling back declaration state");
        }
        for mut state in self.states.drain(..).rev() {
            state.restore(self.tree);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;
    use phasec_tree::{
        TreeBuilder,
        fields::{BuiltinType, ConeType, TypeRefFields, TypeRefState},
        node::ClassKind,
        visit::Ownership,
    };

    const TY: Field<TypeRefFields, TypeRefState> = Field {
        name: "ty",
        get: |fields| &fields.ty,
        set: |fields, ty| fields.ty = ty,
    };

    static TYPE_REF: StateKeeper<TypeRefFields, Node> = StateKeeper::new(|fields, _, scope| {
        scope.add(fields, TY);
    });

    static HEADER_TYPES: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
        tree.walk_owned(target, Ownership::HEADER, |node| {
            scope.entity(node, &TYPE_REF);
        });
    });

    fn resolve_all(tree: &Tree, target: NodeId) {
        for node in tree.owned_elements(target, Ownership::HEADER) {
            tree.with_fields_mut(node, |fields: &mut TypeRefFields| {
                fields.ty = TypeRefState::Resolved(ConeType::Builtin(BuiltinType::Int));
            });
        }
    }

    fn sample() -> (Tree, NodeId, NodeId) {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let class = builder.class(file, "C", ClassKind::Class);
        builder.super_type(class, "Int");
        let nested = builder.function(class, "f", Some("Int"));
        (builder.finish(), class, nested)
    }

    #[test]
    fn test_guard_rolls_back_on_drop() {
        let (tree, class, _) = sample();
        let before: Vec<_> = tree.iter().map(Node::fields_snapshot).collect();

        let guard = HEADER_TYPES.preserve(&tree, class);
        assert_eq!(guard.captured(), 1);
        resolve_all(&tree, class);
        guard.rollback();

        let after: Vec<_> = tree.iter().map(Node::fields_snapshot).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_commit_keeps_changes() {
        let (tree, class, _) = sample();
        let guard = HEADER_TYPES.preserve(&tree, class);
        resolve_all(&tree, class);
        guard.commit();

        let super_type = tree.children(class)[0];
        let state = tree.entity::<TypeRefFields>(super_type).unwrap();
        assert!(state.ty.resolved().is_some());
    }

    #[test]
    fn test_rollback_on_panic() {
        let (tree, class, nested) = sample();
        let before = tree.node(tree.children(class)[0]).fields_snapshot();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = HEADER_TYPES.preserve(&tree, class);
            resolve_all(&tree, class);
            panic!("transformation failed");
        }));
        assert!(result.is_err());

        assert_eq!(tree.node(tree.children(class)[0]).fields_snapshot(), before);
        // the nested function was never captured nor touched
        let return_type = tree.node(nested).kind.return_type().unwrap();
        assert_eq!(
            tree.entity::<TypeRefFields>(return_type).unwrap().ty,
            TypeRefState::Unresolved
        );
    }
}
