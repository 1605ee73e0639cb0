use super::bind::{bind_expression, resolve_type_name};
use crate::{
    LazyResolver, Lookup, Namespace, ResolveCx, ScopeTower,
    checker::{check_owned, unsupported},
    keepers,
};
use indexmap::IndexMap;
use phasec_error::ResolveResult;
use phasec_keeper::{DeclarationKeeper, KeeperGuard};
use phasec_span::Symbol;
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{
        AnnotationFields, Argument, ArgumentList, ArgumentMapping, Diagnostic, Reference,
        TypeRefState,
    },
    node::{ClassKind, NodeKind},
    visit::{Ownership, TargetKind},
};

static KEEPER: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
    if !tree.needs_annotation_arguments(target) {
        return;
    }
    tree.walk_owned(target, Ownership::HEADER, |element| {
        if matches!(tree.node(element).kind, NodeKind::Annotation(_)) {
            scope.entity(element, &keepers::ANNOTATION);
        }
    });
});

/// Binds annotation calls and maps their arguments onto the parameters of
/// the annotation class.
pub struct AnnotationArgumentsResolver;

impl LazyResolver for AnnotationArgumentsResolver {
    fn phase(&self) -> ResolvePhase {
        ResolvePhase::AnnotationArguments
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        KEEPER.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        let tree = cx.tree();
        match tree.classify(target) {
            TargetKind::RegularClass => {
                let NodeKind::Class(class) = &tree.node(target).kind else {
                    unreachable!("bug! classified as class")
                };
                resolve_owner(cx, target)?;
                for &parameter in &class.type_parameters {
                    resolve_subtree(cx, parameter)?;
                }
                for &parameter in &class.value_parameters {
                    resolve_subtree(cx, parameter)?;
                }
                for &super_type in &class.super_types {
                    resolve_subtree(cx, super_type)?;
                }
                Ok(())
            }
            TargetKind::Script => resolve_owner(cx, target),
            TargetKind::RegularDeclaration => resolve_subtree(cx, target),
            TargetKind::File | TargetKind::CodeFragment => Ok(()),
            TargetKind::NotApplicable => Err(unsupported(tree, target, self.phase())),
        }
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        check_owned(
            tree,
            target,
            Ownership::HEADER,
            self.phase(),
            "resolved annotation callee, arguments and mapping",
            AnnotationFields::is_resolved,
        )
    }
}

fn resolve_subtree(cx: &ResolveCx<'_>, root: NodeId) -> ResolveResult<()> {
    for element in cx.tree().owned_elements(root, Ownership::HEADER) {
        resolve_owner(cx, element)?;
    }
    Ok(())
}

/// Resolves the annotations written directly on `owner`.
fn resolve_owner(cx: &ResolveCx<'_>, owner: NodeId) -> ResolveResult<()> {
    let tree = cx.tree();
    let annotations = tree.node(owner).kind.annotations();
    if annotations.is_empty() {
        return Ok(());
    }
    let scope = ScopeTower::for_element(tree, cx.symbols(), owner);
    cx.collect(ResolvePhase::AnnotationArguments, || scope.snapshot(owner));
    for &annotation in annotations {
        resolve_annotation(cx, &scope, annotation)?;
    }
    Ok(())
}

fn resolve_annotation(cx: &ResolveCx<'_>, scope: &ScopeTower<'_>, annotation: NodeId) -> ResolveResult<()> {
    let tree = cx.tree();
    let NodeKind::Annotation(syntax) = &tree.node(annotation).kind else {
        unreachable!("bug! annotation list holds a non-annotation")
    };
    let Some(mut fields) = tree.entity::<AnnotationFields>(annotation) else {
        unreachable!("bug! annotation without annotation fields")
    };
    if fields.is_resolved() {
        return Ok(());
    }

    let mut type_arguments = Vec::with_capacity(syntax.type_arguments.len());
    for (index, &name) in syntax.type_arguments.iter().enumerate() {
        let state = match fields.type_arguments.get(index) {
            Some(resolved @ TypeRefState::Resolved(_)) => resolved.clone(),
            _ => TypeRefState::Resolved(resolve_type_name(cx, scope, name, Vec::new(), false)?),
        };
        type_arguments.push(state);
    }
    fields.type_arguments = type_arguments;

    if let Some(call) = fields.call.as_mut() {
        if !call.callee.is_resolved() {
            call.callee = resolve_callee(tree, scope, syntax.name);
        }
        let mut arguments = call.argument_list.arguments().to_vec();
        for argument in &mut arguments {
            bind_expression(scope, &mut argument.value);
        }
        if !fields.argument_mapping.is_resolved() {
            fields.argument_mapping = map_arguments(tree, syntax.name, &call.callee, &arguments);
        }
        call.argument_list = if arguments.is_empty() {
            ArgumentList::Empty
        } else {
            ArgumentList::Resolved(arguments)
        };
    }

    tree.with_fields_mut(annotation, |current: &mut AnnotationFields| *current = fields);
    Ok(())
}

fn resolve_callee(tree: &Tree, scope: &ScopeTower<'_>, name: Symbol) -> Reference {
    match scope.lookup(Namespace::Type, name) {
        Lookup::Found(id) => match &tree.node(id).kind {
            NodeKind::Class(class) if class.class_kind == ClassKind::Annotation => Reference::Resolved(id),
            _ => Reference::Error(Diagnostic::NotAnAnnotationClass(name)),
        },
        Lookup::Builtin(_) => Reference::Error(Diagnostic::NotAnAnnotationClass(name)),
        Lookup::Ambiguous => Reference::Error(Diagnostic::AmbiguousReference(name)),
        Lookup::NotFound => Reference::Error(Diagnostic::UnresolvedReference(name)),
    }
}

/// Matches named arguments by name and positional ones by index against the
/// primary constructor of the annotation class.
fn map_arguments(tree: &Tree, annotation: Symbol, callee: &Reference, arguments: &[Argument]) -> ArgumentMapping {
    let mut mapping = IndexMap::new();
    let mut unmatched = Vec::new();
    let Some(class) = callee.target() else {
        // the callee diagnostic already describes the failure
        for argument in arguments {
            if let Some(name) = argument.name {
                mapping.insert(name, argument.value.clone());
            }
        }
        return ArgumentMapping::Resolved { mapping, unmatched };
    };
    let parameters: Vec<Symbol> = tree
        .node(class)
        .kind
        .value_parameters()
        .iter()
        .filter_map(|&parameter| tree.node(parameter).name())
        .collect();
    for (index, argument) in arguments.iter().enumerate() {
        let parameter = match argument.name {
            Some(name) if parameters.contains(&name) => name,
            Some(name) => {
                unmatched.push(Diagnostic::NoSuchParameter(name));
                continue;
            }
            None => match parameters.get(index) {
                Some(&parameter) => parameter,
                None => {
                    unmatched.push(Diagnostic::TooManyArguments { annotation, index });
                    continue;
                }
            },
        };
        // the first argument for a parameter wins
        if mapping.contains_key(&parameter) {
            unmatched.push(Diagnostic::ArgumentPassedTwice(parameter));
        } else {
            mapping.insert(parameter, argument.value.clone());
        }
    }
    ArgumentMapping::Resolved { mapping, unmatched }
}
