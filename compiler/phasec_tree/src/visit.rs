use crate::{NodeId, node::NodeKind, tree::Tree};

pub trait Visitor {
    fn visit_node(&mut self, tree: &Tree, node: NodeId) {
        tree.accept_children(node, self);
    }
}

impl Tree {
    pub fn accept<V: Visitor + ?Sized>(&self, node: NodeId, visitor: &mut V) {
        visitor.visit_node(self, node);
    }

    pub fn accept_children<V: Visitor + ?Sized>(&self, node: NodeId, visitor: &mut V) {
        for child in self.children(node) {
            visitor.visit_node(self, child);
        }
    }
}

/// How a resolver treats a node handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    RegularClass,
    Script,
    /// Callables, type aliases, anonymous initializers, dangling modifier lists
    /// and file annotation containers.
    RegularDeclaration,
    CodeFragment,
    File,
    NotApplicable,
}

impl Tree {
    pub fn classify(&self, node: NodeId) -> TargetKind {
        let kind = &self.node(node).kind;
        match kind {
            NodeKind::Class(_) => TargetKind::RegularClass,
            NodeKind::Script(_) => TargetKind::Script,
            NodeKind::CodeFragment(_) => TargetKind::CodeFragment,
            NodeKind::File(_) => TargetKind::File,
            _ if kind.is_regular_declaration_with_annotation() => TargetKind::RegularDeclaration,
            _ => TargetKind::NotApplicable,
        }
    }

    /// Whether the node owns annotations that ANNOTATION_ARGUMENTS has to resolve.
    pub fn needs_annotation_arguments(&self, node: NodeId) -> bool {
        matches!(
            self.classify(node),
            TargetKind::RegularClass | TargetKind::Script | TargetKind::RegularDeclaration
        )
    }
}

/// Which elements count as owned by a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    /// Descend into blocks and statements.
    pub enter_bodies: bool,
}

impl Ownership {
    pub const HEADER: Ownership = Ownership {
        enter_bodies: false,
    };
    pub const WITH_BODIES: Ownership = Ownership { enter_bodies: true };
}

struct OwnedElements<'f, F> {
    target: NodeId,
    ownership: Ownership,
    f: &'f mut F,
}

impl<F: FnMut(NodeId)> Visitor for OwnedElements<'_, F> {
    fn visit_node(&mut self, tree: &Tree, node: NodeId) {
        let kind = &tree.node(node).kind;
        if kind.is_declaration() && node != self.target {
            return;
        }
        if kind.is_statement() && !self.ownership.enter_bodies {
            return;
        }
        (self.f)(node);
        tree.accept_children(node, self);
    }
}

impl Tree {
    /// Calls `f` for `target` and every element it owns, never crossing into a
    /// nested declaration.
    pub fn walk_owned(&self, target: NodeId, ownership: Ownership, mut f: impl FnMut(NodeId)) {
        let mut visitor = OwnedElements {
            target,
            ownership,
            f: &mut f,
        };
        self.accept(target, &mut visitor);
    }

    pub fn owned_elements(&self, target: NodeId, ownership: Ownership) -> Vec<NodeId> {
        let mut elements = Vec::new();
        self.walk_owned(target, ownership, |node| elements.push(node));
        elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        TreeBuilder,
        fields::Expression,
        node::{ClassKind, StatementKind},
    };

    #[test]
    fn test_classify() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let class = builder.class(file, "C", ClassKind::Class);
        let function = builder.function(class, "f", None);
        let parameter = builder.value_parameter(function, "x", "Int");
        let script = builder.script(file, "build");
        let fragment = builder.code_fragment(file);
        let container = builder.file_annotations(file);
        let tree = builder.finish();

        assert_eq!(tree.classify(class), TargetKind::RegularClass);
        assert_eq!(tree.classify(function), TargetKind::RegularDeclaration);
        assert_eq!(tree.classify(container), TargetKind::RegularDeclaration);
        assert_eq!(tree.classify(script), TargetKind::Script);
        assert_eq!(tree.classify(fragment), TargetKind::CodeFragment);
        assert_eq!(tree.classify(file), TargetKind::File);
        assert_eq!(tree.classify(parameter), TargetKind::NotApplicable);
        assert!(tree.needs_annotation_arguments(script));
        assert!(!tree.needs_annotation_arguments(file));
        assert!(!tree.needs_annotation_arguments(fragment));
    }

    #[test]
    fn test_walk_owned_stops_at_nested_declarations() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let outer = builder.class(file, "Outer", ClassKind::Class);
        let outer_annotation = builder.annotation(outer, "A", vec![]);
        let inner = builder.class(outer, "Inner", ClassKind::Class);
        let inner_annotation = builder.annotation(inner, "A", vec![]);
        let tree = builder.finish();

        let owned = tree.owned_elements(outer, Ownership::HEADER);
        assert!(owned.contains(&outer));
        assert!(owned.contains(&outer_annotation));
        assert!(!owned.contains(&inner));
        assert!(!owned.contains(&inner_annotation));
    }

    #[test]
    fn test_walk_owned_enters_bodies_on_request() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let function = builder.function(file, "f", None);
        let statement =
            builder.statement(function, StatementKind::Return, Expression::int(1));
        let tree = builder.finish();

        assert!(!tree.owned_elements(function, Ownership::HEADER).contains(&statement));
        assert!(tree
            .owned_elements(function, Ownership::WITH_BODIES)
            .contains(&statement));
    }

    #[test]
    fn test_designation_and_qualified_name() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let outer = builder.class(file, "Outer", ClassKind::Class);
        let inner = builder.function(outer, "run", Some("Unit"));
        let tree = builder.finish();

        assert_eq!(tree.designation(inner), vec![file, outer, inner]);
        assert_eq!(tree.qualified_name(inner), "app.Outer.run");
        assert_eq!(tree.find("app.Outer.run"), Some(inner));
        assert_eq!(tree.containing_declaration(inner), Some(outer));
        assert_eq!(tree.containing_file(inner), Some(file));
        assert_eq!(tree.nested_declarations(file), vec![file, outer, inner]);
    }
}
