//! Field descriptors and entity keepers shared by the phase resolvers.

use phasec_keeper::{Field, Projection, StateKeeper};
use phasec_tree::{
    Node,
    fields::{
        AnnotationCallFields, AnnotationFields, Argument, ArgumentList, ArgumentMapping, ConeType,
        DeclarationFields, Expression, FileFields, ImportResolution, Reference, ResolvedStatus,
        StatementFields, TypeRefFields, TypeRefState,
    },
    node::NodeKind,
};

pub(crate) const IMPORTS: Field<FileFields, Vec<ImportResolution>> = Field {
    name: "imports",
    get: |file| &file.imports,
    set: |file, imports| file.imports = imports,
};

pub(crate) const STATUS: Field<DeclarationFields, Option<ResolvedStatus>> = Field {
    name: "status",
    get: |declaration| &declaration.status,
    set: |declaration, status| declaration.status = status,
};

pub(crate) const TYPE: Field<TypeRefFields, TypeRefState> = Field {
    name: "type",
    get: |type_ref| &type_ref.ty,
    set: |type_ref, ty| type_ref.ty = ty,
};

const ARGUMENT_MAPPING: Field<AnnotationFields, ArgumentMapping> = Field {
    name: "argument_mapping",
    get: |annotation| &annotation.argument_mapping,
    set: |annotation, mapping| annotation.argument_mapping = mapping,
};

const TYPE_ARGUMENTS: Field<AnnotationFields, Vec<TypeRefState>> = Field {
    name: "type_arguments",
    get: |annotation| &annotation.type_arguments,
    set: |annotation, arguments| annotation.type_arguments = arguments,
};

const CALL: Projection<AnnotationFields, AnnotationCallFields> = Projection {
    name: "call",
    get: |annotation| annotation.call.as_ref(),
    get_mut: |annotation| annotation.call.as_mut(),
};

const CALLEE: Field<AnnotationCallFields, Reference> = Field {
    name: "callee",
    get: |call| &call.callee,
    set: |call, callee| call.callee = callee,
};

const ARGUMENT_LIST: Field<AnnotationCallFields, ArgumentList> = Field {
    name: "argument_list",
    get: |call| &call.argument_list,
    set: |call, list| call.argument_list = list,
};

const EXPRESSION: Field<StatementFields, Expression> = Field {
    name: "expression",
    get: |statement| &statement.expression,
    set: |statement, expression| statement.expression = expression,
};

const STATEMENT_TYPE: Field<StatementFields, Option<ConeType>> = Field {
    name: "statement_type",
    get: |statement| &statement.ty,
    set: |statement, ty| statement.ty = ty,
};

pub(crate) static FILE: StateKeeper<FileFields, Node> = StateKeeper::new(|file, _, scope| {
    scope.add(file, IMPORTS);
});

pub(crate) static DECLARATION: StateKeeper<DeclarationFields, Node> =
    StateKeeper::new(|declaration, _, scope| {
        if declaration.status.is_none() {
            scope.add(declaration, STATUS);
        }
    });

pub(crate) static TYPE_REF: StateKeeper<TypeRefFields, Node> = StateKeeper::new(|type_ref, _, scope| {
    if matches!(type_ref.ty, TypeRefState::Unresolved) {
        scope.add(type_ref, TYPE);
    }
});

pub(crate) static IMPLICIT_TYPE_REF: StateKeeper<TypeRefFields, Node> =
    StateKeeper::new(|type_ref, _, scope| {
        if matches!(type_ref.ty, TypeRefState::Implicit) {
            scope.add(type_ref, TYPE);
        }
    });

pub(crate) static ANNOTATION: StateKeeper<AnnotationFields, Node> =
    StateKeeper::new(|annotation, _, scope| {
        if annotation.is_resolved() {
            return;
        }
        scope.add(annotation, ARGUMENT_MAPPING);
        scope.add(annotation, TYPE_ARGUMENTS);
        scope.entity(annotation, CALL, &ANNOTATION_CALL);
    });

static ANNOTATION_CALL: StateKeeper<AnnotationCallFields, Node> = StateKeeper::new(|call, _, scope| {
    scope.add(call, CALLEE);
    if !call.argument_list.is_resolved() {
        scope.add_arranged(call, ARGUMENT_LIST, refresh_argument_list);
    }
});

pub(crate) static STATEMENT: StateKeeper<StatementFields, Node> = StateKeeper::new(|statement, _, scope| {
    if statement.ty.is_some() {
        return;
    }
    scope.add(statement, EXPRESSION);
    scope.add(statement, STATEMENT_TYPE);
});

/// Rebuilds the argument list from source, keeping argument values whose
/// reference has already been bound (or has already failed).
fn refresh_argument_list(current: &ArgumentList, _: &AnnotationCallFields, node: &Node) -> ArgumentList {
    let NodeKind::Annotation(annotation) = &node.kind else {
        return current.clone();
    };
    if annotation.arguments.is_empty() {
        return ArgumentList::Empty;
    }
    let existing = current.arguments();
    let arguments = annotation
        .arguments
        .iter()
        .enumerate()
        .map(|(index, source)| match existing.get(index) {
            Some(argument) if is_bound_access(&argument.value) => argument.clone(),
            _ => source.clone(),
        })
        .collect::<Vec<Argument>>();
    ArgumentList::Raw(arguments)
}

fn is_bound_access(expression: &Expression) -> bool {
    matches!(expression, Expression::Access(access) if access.reference.is_resolved())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasec_keeper::DeclarationKeeper;
    use phasec_tree::{NodeId, Tree, TreeBuilder, node::ClassKind, visit::Ownership};

    static ANNOTATIONS: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
        tree.walk_owned(target, Ownership::HEADER, |node| scope.entity(node, &ANNOTATION));
    });

    fn annotated(arguments: Vec<Argument>) -> (Tree, NodeId, NodeId) {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let class = builder.class(file, "C", ClassKind::Class);
        let annotation = builder.annotation(class, "A", arguments);
        (builder.finish(), class, annotation)
    }

    #[test]
    fn test_refresh_keeps_bound_accesses() {
        let (tree, class, annotation) = annotated(vec![
            Argument::positional(Expression::access("bound")),
            Argument::positional(Expression::access("loose")),
        ]);
        tree.with_fields_mut(annotation, |fields: &mut AnnotationFields| {
            let call = fields.call.as_mut().unwrap();
            let mut arguments = call.argument_list.arguments().to_vec();
            if let Expression::Access(access) = &mut arguments[0].value {
                access.reference = Reference::Resolved(class);
            }
            call.argument_list = ArgumentList::Raw(arguments);
        });

        let guard = ANNOTATIONS.preserve(&tree, class);
        let fields = tree.entity::<AnnotationFields>(annotation).unwrap();
        let arguments = fields.call.unwrap().argument_list.arguments().to_vec();
        assert!(is_bound_access(&arguments[0].value));
        assert!(!is_bound_access(&arguments[1].value));
        drop(guard);
    }

    #[test]
    fn test_resolved_annotation_is_not_captured() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let class = builder.class(file, "C", ClassKind::Class);
        builder.resolved_annotation(class, "A", vec![("x", Expression::int(1))]);
        let tree = builder.finish();

        let guard = ANNOTATIONS.preserve(&tree, class);
        assert_eq!(guard.captured(), 0);
        guard.commit();
    }

    #[test]
    fn test_rollback_restores_argument_list() {
        let (tree, class, annotation) =
            annotated(vec![Argument::named("x", Expression::access("value"))]);
        let before = tree.node(annotation).fields_snapshot();
        let guard = ANNOTATIONS.preserve(&tree, class);
        tree.with_fields_mut(annotation, |fields: &mut AnnotationFields| {
            fields.argument_mapping = ArgumentMapping::Resolved {
                mapping: Default::default(),
                unmatched: Vec::new(),
            };
            fields.call.as_mut().unwrap().argument_list = ArgumentList::Resolved(Vec::new());
        });
        guard.rollback();
        assert_eq!(tree.node(annotation).fields_snapshot(), before);
    }
}
