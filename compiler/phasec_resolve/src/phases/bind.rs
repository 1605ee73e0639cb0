//! Name binding shared by the phases that read expressions and type names.

use crate::{Lookup, Namespace, ResolveCx, ScopeTower};
use phasec_error::{ResolveError, ResolveResult};
use phasec_span::Symbol;
use phasec_tree::{
    NodeId, ResolvePhase,
    fields::{ConeType, Diagnostic, Expression, Reference, TypeRefFields},
    node::NodeKind,
};

fn reference(lookup: Lookup, name: Symbol) -> Reference {
    match lookup {
        Lookup::Found(id) => Reference::Resolved(id),
        Lookup::Ambiguous => Reference::Error(Diagnostic::AmbiguousReference(name)),
        Lookup::Builtin(_) | Lookup::NotFound => {
            Reference::Error(Diagnostic::UnresolvedReference(name))
        }
    }
}

/// Binds every unbound name in `expression`. Bound or failed references stay.
pub(crate) fn bind_expression(scope: &ScopeTower<'_>, expression: &mut Expression) {
    match expression {
        Expression::Literal(_) => {}
        Expression::Access(access) => {
            if !access.reference.is_resolved() {
                access.reference = reference(scope.lookup(Namespace::Value, access.name), access.name);
            }
        }
        Expression::Call(call) => {
            if !call.reference.is_resolved() {
                call.reference = reference(scope.lookup(Namespace::Callable, call.callee), call.callee);
            }
            for argument in &mut call.arguments {
                bind_expression(scope, argument);
            }
        }
    }
}

pub(crate) fn with_nullability(ty: ConeType, nullable: bool) -> ConeType {
    if !nullable {
        return ty;
    }
    match ty {
        ConeType::Class {
            class, arguments, ..
        } => ConeType::Class {
            class,
            arguments,
            nullable: true,
        },
        ConeType::TypeParameter { parameter, .. } => ConeType::TypeParameter {
            parameter,
            nullable: true,
        },
        other => other,
    }
}

/// Resolves a type name seen from `scope`, expanding type aliases.
pub(crate) fn resolve_type_name(
    cx: &ResolveCx<'_>,
    scope: &ScopeTower<'_>,
    name: Symbol,
    arguments: Vec<ConeType>,
    nullable: bool,
) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    let ty = match scope.lookup(Namespace::Type, name) {
        Lookup::Builtin(builtin) => ConeType::Builtin(builtin),
        Lookup::Found(id) => match &tree.node(id).kind {
            NodeKind::TypeParameter(_) => ConeType::TypeParameter {
                parameter: id,
                nullable,
            },
            NodeKind::Class(_) => ConeType::Class {
                class: id,
                arguments,
                nullable,
            },
            NodeKind::TypeAlias(_) => return expand_alias(cx, id, nullable),
            _ => ConeType::Error(Diagnostic::UnresolvedReference(name)),
        },
        Lookup::Ambiguous => ConeType::Error(Diagnostic::AmbiguousReference(name)),
        Lookup::NotFound => ConeType::Error(Diagnostic::UnresolvedReference(name)),
    };
    Ok(ty)
}

fn expand_alias(cx: &ResolveCx<'_>, alias: NodeId, nullable: bool) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    let node = tree.node(alias);
    let name = node.name().expect("bug! type aliases are named");
    match cx.resolve(alias, ResolvePhase::Types) {
        Ok(()) => {}
        Err(ResolveError::CyclicDependency { .. }) => {
            tracing::debug!(alias = alias.index(), "recursive type alias");
            return Ok(ConeType::Error(Diagnostic::RecursiveTypeAlias(name)));
        }
        Err(error) => return Err(error),
    }
    let expanded = node
        .kind
        .return_type()
        .and_then(|expanded| {
            tree.with_fields(expanded, |type_ref: &TypeRefFields| type_ref.ty.resolved().cloned())
        })
        .flatten();
    Ok(match expanded {
        Some(ty) => with_nullability(ty, nullable),
        None => ConeType::Error(Diagnostic::RecursiveTypeAlias(name)),
    })
}
