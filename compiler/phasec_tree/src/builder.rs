use crate::{
    NodeId,
    fields::{
        AnnotationCallFields, AnnotationFields, Argument, ArgumentList, ArgumentMapping,
        DeclarationFields, Expression, FileFields, ImportResolution, NodeFields, StatementFields,
        TypeRefFields, TypeRefState,
    },
    node::*,
    phase::ResolvePhase,
    tree::{Node, Tree},
};
use index_vec::IndexVec;
use indexmap::IndexMap;
use phasec_span::{FileID, Span, Symbol};

#[derive(Debug)]
struct PendingNode {
    parent: Option<NodeId>,
    span: Span,
    kind: NodeKind,
    phase: ResolvePhase,
    fields: Option<NodeFields>,
}

/// Builds a [`Tree`]. Misplaced children (for example a statement inside a
/// class body) are programming errors and panic.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: IndexVec<NodeId, PendingNode>,
    files: Vec<NodeId>,
    lines: Vec<usize>,
}

impl TreeBuilder {
    pub fn new() -> TreeBuilder {
        TreeBuilder::default()
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let file = match parent {
            Some(parent) => self.nodes[parent].span.file,
            None => FileID::new(self.files.len()),
        };
        if file.index() >= self.lines.len() {
            self.lines.resize(file.index() + 1, 0);
        }
        self.lines[file.index()] += 1;
        let span = Span::line(file, self.lines[file.index()]);
        self.nodes.push(PendingNode {
            parent,
            span,
            kind,
            phase: ResolvePhase::Raw,
            fields: None,
        })
    }

    fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    fn type_ref(&mut self, owner: NodeId, name: Option<&str>) -> NodeId {
        self.push(
            Some(owner),
            NodeKind::TypeRef(TypeRef {
                name: name.map(Symbol::new),
                nullable: false,
                annotations: Vec::new(),
                arguments: Vec::new(),
            }),
        )
    }

    pub fn file(&mut self, name: &str, package: &str) -> NodeId {
        let id = self.push(
            None,
            NodeKind::File(File {
                name: Symbol::new(name),
                package: Symbol::new(package),
                imports: Vec::new(),
                annotations_container: None,
                declarations: Vec::new(),
            }),
        );
        self.files.push(id);
        id
    }

    fn add_import(&mut self, file: NodeId, directive: ImportDirective) {
        match self.kind_mut(file) {
            NodeKind::File(file) => file.imports.push(directive),
            kind => panic!("bug! imports belong to files, not {}", kind.tag()),
        }
    }

    pub fn import(&mut self, file: NodeId, path: &str) {
        self.add_import(
            file,
            ImportDirective {
                path: Symbol::new(path),
                alias: None,
                all_under: false,
            },
        );
    }

    pub fn import_alias(&mut self, file: NodeId, path: &str, alias: &str) {
        self.add_import(
            file,
            ImportDirective {
                path: Symbol::new(path),
                alias: Some(Symbol::new(alias)),
                all_under: false,
            },
        );
    }

    pub fn import_all(&mut self, file: NodeId, package: &str) {
        self.add_import(
            file,
            ImportDirective {
                path: Symbol::new(package),
                alias: None,
                all_under: true,
            },
        );
    }

    /// The file's annotation container, created on first use.
    pub fn file_annotations(&mut self, file: NodeId) -> NodeId {
        if let NodeKind::File(File {
            annotations_container: Some(container),
            ..
        }) = &self.nodes[file].kind
        {
            return *container;
        }
        let container = self.push(
            Some(file),
            NodeKind::FileAnnotationsContainer(FileAnnotationsContainer {
                annotations: Vec::new(),
            }),
        );
        match self.kind_mut(file) {
            NodeKind::File(file) => file.annotations_container = Some(container),
            kind => panic!("bug! file annotations belong to files, not {}", kind.tag()),
        }
        container
    }

    fn add_declaration(&mut self, owner: NodeId, declaration: NodeId) {
        match self.kind_mut(owner) {
            NodeKind::File(file) => file.declarations.push(declaration),
            NodeKind::Script(script) => script.declarations.push(declaration),
            NodeKind::Class(class) => class.declarations.push(declaration),
            kind => panic!("bug! {} cannot contain declarations", kind.tag()),
        }
    }

    pub fn script(&mut self, file: NodeId, name: &str) -> NodeId {
        let script = self.push(
            Some(file),
            NodeKind::Script(Script {
                name: Symbol::new(name),
                annotations: Vec::new(),
                body: None,
                declarations: Vec::new(),
            }),
        );
        self.add_declaration(file, script);
        script
    }

    pub fn code_fragment(&mut self, file: NodeId) -> NodeId {
        let fragment = self.push(
            Some(file),
            NodeKind::CodeFragment(CodeFragment { block: None }),
        );
        self.add_declaration(file, fragment);
        fragment
    }

    pub fn class(&mut self, owner: NodeId, name: &str, class_kind: ClassKind) -> NodeId {
        let class = self.push(
            Some(owner),
            NodeKind::Class(Class {
                name: Symbol::new(name),
                class_kind,
                modifiers: Modifiers::default(),
                annotations: Vec::new(),
                type_parameters: Vec::new(),
                value_parameters: Vec::new(),
                super_types: Vec::new(),
                declarations: Vec::new(),
            }),
        );
        self.add_declaration(owner, class);
        class
    }

    /// `return_type` of `None` leaves the type implicit.
    pub fn function(&mut self, owner: NodeId, name: &str, return_type: Option<&str>) -> NodeId {
        let function = self.push(
            Some(owner),
            NodeKind::Function(Function {
                name: Symbol::new(name),
                modifiers: Modifiers::default(),
                annotations: Vec::new(),
                type_parameters: Vec::new(),
                value_parameters: Vec::new(),
                return_type: None,
                body: None,
            }),
        );
        let return_type = self.type_ref(function, return_type);
        if let NodeKind::Function(function) = self.kind_mut(function) {
            function.return_type = Some(return_type);
        }
        self.add_declaration(owner, function);
        function
    }

    pub fn property(
        &mut self,
        owner: NodeId,
        name: &str,
        ty: Option<&str>,
        initializer: Option<Expression>,
    ) -> NodeId {
        let property = self.push(
            Some(owner),
            NodeKind::Property(Property {
                name: Symbol::new(name),
                is_var: false,
                modifiers: Modifiers::default(),
                annotations: Vec::new(),
                return_type: None,
                initializer: None,
            }),
        );
        let return_type = self.type_ref(property, ty);
        let initializer = initializer.map(|expression| {
            self.push(
                Some(property),
                NodeKind::Statement(Statement {
                    kind: StatementKind::Expression,
                    expression,
                }),
            )
        });
        if let NodeKind::Property(property) = self.kind_mut(property) {
            property.return_type = Some(return_type);
            property.initializer = initializer;
        }
        self.add_declaration(owner, property);
        property
    }

    pub fn value_parameter(&mut self, owner: NodeId, name: &str, ty: &str) -> NodeId {
        let parameter = self.push(
            Some(owner),
            NodeKind::ValueParameter(ValueParameter {
                name: Symbol::new(name),
                annotations: Vec::new(),
                return_type: None,
            }),
        );
        let return_type = self.type_ref(parameter, Some(ty));
        if let NodeKind::ValueParameter(value) = self.kind_mut(parameter) {
            value.return_type = Some(return_type);
        }
        match self.kind_mut(owner) {
            NodeKind::Class(class) => class.value_parameters.push(parameter),
            NodeKind::Function(function) => function.value_parameters.push(parameter),
            kind => panic!("bug! {} has no value parameters", kind.tag()),
        }
        parameter
    }

    pub fn type_parameter(&mut self, owner: NodeId, name: &str) -> NodeId {
        let parameter = self.push(
            Some(owner),
            NodeKind::TypeParameter(TypeParameter {
                name: Symbol::new(name),
                annotations: Vec::new(),
                bounds: Vec::new(),
            }),
        );
        match self.kind_mut(owner) {
            NodeKind::Class(class) => class.type_parameters.push(parameter),
            NodeKind::Function(function) => function.type_parameters.push(parameter),
            NodeKind::TypeAlias(alias) => alias.type_parameters.push(parameter),
            kind => panic!("bug! {} has no type parameters", kind.tag()),
        }
        parameter
    }

    pub fn bound(&mut self, type_parameter: NodeId, ty: &str) -> NodeId {
        let bound = self.type_ref(type_parameter, Some(ty));
        match self.kind_mut(type_parameter) {
            NodeKind::TypeParameter(parameter) => parameter.bounds.push(bound),
            kind => panic!("bug! {} has no bounds", kind.tag()),
        }
        bound
    }

    pub fn super_type(&mut self, class: NodeId, name: &str) -> NodeId {
        let super_type = self.type_ref(class, Some(name));
        match self.kind_mut(class) {
            NodeKind::Class(class) => class.super_types.push(super_type),
            kind => panic!("bug! {} has no supertypes", kind.tag()),
        }
        super_type
    }

    pub fn type_argument(&mut self, type_ref: NodeId, name: &str) -> NodeId {
        let argument = self.type_ref(type_ref, Some(name));
        match self.kind_mut(type_ref) {
            NodeKind::TypeRef(type_ref) => type_ref.arguments.push(argument),
            kind => panic!("bug! {} has no type arguments", kind.tag()),
        }
        argument
    }

    /// Declared type reference of a function, property, parameter or alias.
    pub fn type_ref_of(&self, declaration: NodeId) -> Option<NodeId> {
        self.nodes[declaration].kind.return_type()
    }

    pub fn set_nullable(&mut self, type_ref: NodeId, nullable: bool) {
        match self.kind_mut(type_ref) {
            NodeKind::TypeRef(type_ref) => type_ref.nullable = nullable,
            kind => panic!("bug! {} is not a type reference", kind.tag()),
        }
    }

    pub fn type_alias(&mut self, owner: NodeId, name: &str, expanded: &str) -> NodeId {
        let alias = self.push(
            Some(owner),
            NodeKind::TypeAlias(TypeAlias {
                name: Symbol::new(name),
                modifiers: Modifiers::default(),
                annotations: Vec::new(),
                type_parameters: Vec::new(),
                expanded_type: None,
            }),
        );
        let expanded = self.type_ref(alias, Some(expanded));
        if let NodeKind::TypeAlias(alias) = self.kind_mut(alias) {
            alias.expanded_type = Some(expanded);
        }
        self.add_declaration(owner, alias);
        alias
    }

    pub fn anonymous_initializer(&mut self, class: NodeId) -> NodeId {
        let init = self.push(
            Some(class),
            NodeKind::AnonymousInitializer(AnonymousInitializer {
                annotations: Vec::new(),
                body: None,
            }),
        );
        self.add_declaration(class, init);
        init
    }

    pub fn dangling_modifier_list(&mut self, owner: NodeId) -> NodeId {
        let list = self.push(
            Some(owner),
            NodeKind::DanglingModifierList(DanglingModifierList {
                annotations: Vec::new(),
            }),
        );
        self.add_declaration(owner, list);
        list
    }

    fn attach_annotation(&mut self, owner: NodeId, annotation: NodeId) {
        match self.kind_mut(owner) {
            NodeKind::Script(script) => script.annotations.push(annotation),
            NodeKind::Class(class) => class.annotations.push(annotation),
            NodeKind::Function(function) => function.annotations.push(annotation),
            NodeKind::Property(property) => property.annotations.push(annotation),
            NodeKind::ValueParameter(parameter) => parameter.annotations.push(annotation),
            NodeKind::TypeAlias(alias) => alias.annotations.push(annotation),
            NodeKind::AnonymousInitializer(init) => init.annotations.push(annotation),
            NodeKind::DanglingModifierList(list) => list.annotations.push(annotation),
            NodeKind::FileAnnotationsContainer(container) => container.annotations.push(annotation),
            NodeKind::TypeParameter(parameter) => parameter.annotations.push(annotation),
            NodeKind::TypeRef(type_ref) => type_ref.annotations.push(annotation),
            kind => panic!("bug! {} cannot be annotated", kind.tag()),
        }
    }

    pub fn annotation(&mut self, owner: NodeId, name: &str, arguments: Vec<Argument>) -> NodeId {
        self.annotation_with_type_arguments(owner, name, &[], arguments)
    }

    pub fn annotation_with_type_arguments(
        &mut self,
        owner: NodeId,
        name: &str,
        type_arguments: &[&str],
        arguments: Vec<Argument>,
    ) -> NodeId {
        let owner = match self.nodes[owner].kind {
            NodeKind::File(_) => self.file_annotations(owner),
            _ => owner,
        };
        let annotation = self.push(
            Some(owner),
            NodeKind::Annotation(Annotation {
                name: Symbol::new(name),
                type_arguments: type_arguments.iter().map(|name| Symbol::new(name)).collect(),
                arguments,
            }),
        );
        self.attach_annotation(owner, annotation);
        annotation
    }

    /// An annotation whose mapping is already known, as read from a compiled library.
    pub fn resolved_annotation(
        &mut self,
        owner: NodeId,
        name: &str,
        mapping: Vec<(&str, Expression)>,
    ) -> NodeId {
        let annotation = self.annotation(owner, name, Vec::new());
        let mapping: IndexMap<Symbol, Expression> = mapping
            .into_iter()
            .map(|(name, value)| (Symbol::new(name), value))
            .collect();
        self.nodes[annotation].fields = Some(NodeFields::Annotation(AnnotationFields {
            argument_mapping: ArgumentMapping::Resolved {
                mapping,
                unmatched: Vec::new(),
            },
            type_arguments: Vec::new(),
            call: None,
        }));
        annotation
    }

    fn block_of(&mut self, owner: NodeId) -> NodeId {
        let existing = match &self.nodes[owner].kind {
            NodeKind::Function(function) => function.body,
            NodeKind::AnonymousInitializer(init) => init.body,
            NodeKind::Script(script) => script.body,
            NodeKind::CodeFragment(fragment) => fragment.block,
            NodeKind::Block(_) => return owner,
            kind => panic!("bug! {} has no body", kind.tag()),
        };
        if let Some(block) = existing {
            return block;
        }
        let block = self.push(
            Some(owner),
            NodeKind::Block(Block {
                statements: Vec::new(),
            }),
        );
        match self.kind_mut(owner) {
            NodeKind::Function(function) => function.body = Some(block),
            NodeKind::AnonymousInitializer(init) => init.body = Some(block),
            NodeKind::Script(script) => script.body = Some(block),
            NodeKind::CodeFragment(fragment) => fragment.block = Some(block),
            _ => unreachable!(),
        }
        block
    }

    /// Appends a statement to the body of `owner`, creating the body on first use.
    pub fn statement(
        &mut self,
        owner: NodeId,
        kind: StatementKind,
        expression: Expression,
    ) -> NodeId {
        let block = self.block_of(owner);
        let statement = self.push(
            Some(block),
            NodeKind::Statement(Statement { kind, expression }),
        );
        if let NodeKind::Block(block) = self.kind_mut(block) {
            block.statements.push(statement);
        }
        statement
    }

    pub fn set_modifiers(&mut self, declaration: NodeId, modifiers: Modifiers) {
        match self.kind_mut(declaration) {
            NodeKind::Class(class) => class.modifiers = modifiers,
            NodeKind::Function(function) => function.modifiers = modifiers,
            NodeKind::Property(property) => property.modifiers = modifiers,
            NodeKind::TypeAlias(alias) => alias.modifiers = modifiers,
            kind => panic!("bug! {} has no modifiers", kind.tag()),
        }
    }

    pub fn set_var(&mut self, property: NodeId) {
        match self.kind_mut(property) {
            NodeKind::Property(property) => property.is_var = true,
            kind => panic!("bug! {} is not a property", kind.tag()),
        }
    }

    /// Starts a declaration at `phase`, as for declarations loaded already resolved.
    pub fn mark_resolved(&mut self, declaration: NodeId, phase: ResolvePhase) {
        assert!(
            self.nodes[declaration].kind.is_declaration(),
            "bug! only declarations carry a phase"
        );
        self.nodes[declaration].phase = phase;
    }

    pub fn finish(self) -> Tree {
        let TreeBuilder { nodes, files, .. } = self;
        let nodes = nodes
            .into_iter_enumerated()
            .map(|(id, pending)| {
                let fields = pending
                    .fields
                    .unwrap_or_else(|| initial_fields(&pending.kind));
                Node::new(
                    id,
                    pending.parent,
                    pending.span,
                    pending.kind,
                    pending.phase,
                    fields,
                )
            })
            .collect::<IndexVec<NodeId, Node>>();
        Tree::new(nodes, files)
    }
}

fn initial_fields(kind: &NodeKind) -> NodeFields {
    match kind {
        NodeKind::File(file) => NodeFields::File(FileFields {
            imports: vec![ImportResolution::Unresolved; file.imports.len()],
        }),
        NodeKind::Class(_)
        | NodeKind::Function(_)
        | NodeKind::Property(_)
        | NodeKind::TypeAlias(_) => NodeFields::Declaration(DeclarationFields::default()),
        NodeKind::TypeRef(type_ref) => NodeFields::TypeRef(TypeRefFields {
            ty: match type_ref.name {
                Some(_) => TypeRefState::Unresolved,
                None => TypeRefState::Implicit,
            },
        }),
        NodeKind::Annotation(annotation) => NodeFields::Annotation(AnnotationFields {
            argument_mapping: ArgumentMapping::Unresolved,
            type_arguments: vec![TypeRefState::Unresolved; annotation.type_arguments.len()],
            call: Some(AnnotationCallFields {
                callee: crate::fields::Reference::Unresolved,
                argument_list: ArgumentList::from_source(&annotation.arguments),
            }),
        }),
        NodeKind::Statement(statement) => NodeFields::Statement(StatementFields {
            expression: statement.expression.clone(),
            ty: None,
        }),
        NodeKind::Script(_)
        | NodeKind::CodeFragment(_)
        | NodeKind::ValueParameter(_)
        | NodeKind::AnonymousInitializer(_)
        | NodeKind::DanglingModifierList(_)
        | NodeKind::FileAnnotationsContainer(_)
        | NodeKind::TypeParameter(_)
        | NodeKind::Block(_) => NodeFields::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_follow_source_order() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let class = builder.class(file, "C", ClassKind::Class);
        let annotation = builder.annotation(class, "A", vec![]);
        let type_parameter = builder.type_parameter(class, "T");
        let super_type = builder.super_type(class, "Base");
        let member = builder.function(class, "run", Some("Unit"));
        let tree = builder.finish();

        let children = tree.children(class);
        assert_eq!(children, vec![annotation, type_parameter, super_type, member]);
        assert_eq!(tree.parent(member), Some(class));
        assert_eq!(tree.files(), &[file]);
    }

    #[test]
    fn test_initial_fields() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let property = builder.property(file, "p", None, Some(Expression::int(1)));
        let annotation = builder.annotation(
            property,
            "A",
            vec![Argument::named("x", Expression::int(1))],
        );
        let tree = builder.finish();

        let ty = tree.node(property).kind.return_type().unwrap();
        let state = tree.entity::<TypeRefFields>(ty).unwrap();
        assert_eq!(state.ty, TypeRefState::Implicit);

        let fields = tree.entity::<AnnotationFields>(annotation).unwrap();
        assert!(!fields.is_resolved());
        assert!(matches!(
            fields.call.unwrap().argument_list,
            ArgumentList::Raw(_)
        ));
    }

    #[test]
    fn test_file_annotations_go_to_container() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let annotation = builder.annotation(file, "Suppress", vec![]);
        let container = builder.file_annotations(file);
        let tree = builder.finish();

        assert_eq!(tree.parent(annotation), Some(container));
        assert_eq!(tree.children(file), vec![container]);
    }

    #[test]
    fn test_resolved_annotation_and_marked_phase() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("lib.kt", "lib");
        let class = builder.class(file, "Lib", ClassKind::Class);
        let annotation = builder.resolved_annotation(class, "A", vec![("x", Expression::int(2))]);
        builder.mark_resolved(class, ResolvePhase::BodyResolve);
        let tree = builder.finish();

        assert_eq!(tree.phase(class), ResolvePhase::BodyResolve);
        let fields = tree.entity::<AnnotationFields>(annotation).unwrap();
        assert!(fields.is_resolved());
        assert_eq!(fields.argument_mapping.get("x"), Some(&Expression::int(2)));
    }

    #[test]
    fn test_spans_count_lines_per_file() {
        let mut builder = TreeBuilder::new();
        let first = builder.file("a.kt", "a");
        let class = builder.class(first, "A", ClassKind::Class);
        let second = builder.file("b.kt", "b");
        let tree = builder.finish();

        assert_eq!(tree.node(first).span.file, tree.node(class).span.file);
        assert_ne!(tree.node(first).span.file, tree.node(second).span.file);
        assert_eq!(tree.node(class).span.start.line, 2);
        assert_eq!(tree.node(second).span.start.line, 1);
    }
}
