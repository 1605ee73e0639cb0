use super::bind::bind_expression;
use crate::{
    LazyResolver, ResolveCx, ScopeTower,
    checker::{check_owned, unsupported},
    keepers,
};
use phasec_error::{ResolveError, ResolveResult};
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{
        BuiltinType, ConeType, Diagnostic, Expression, Literal, Reference, StatementFields,
        TypeRefFields, TypeRefState,
    },
    node::{ClassKind, NodeKind, Statement, StatementKind},
    visit::{Ownership, TargetKind},
};
use phasec_keeper::{DeclarationKeeper, KeeperGuard};

static KEEPER: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
    tree.walk_owned(target, Ownership::WITH_BODIES, |element| match tree.node(element).kind {
        NodeKind::Statement(_) => scope.entity(element, &keepers::STATEMENT),
        NodeKind::TypeRef(_) => scope.entity(element, &keepers::IMPLICIT_TYPE_REF),
        _ => {}
    });
});

/// Binds names in bodies and initializers, types every statement and fills
/// in implicit declaration types.
pub struct BodyResolver;

impl LazyResolver for BodyResolver {
    fn phase(&self) -> ResolvePhase {
        ResolvePhase::BodyResolve
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        KEEPER.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        let tree = cx.tree();
        if tree.classify(target) == TargetKind::NotApplicable {
            return Err(unsupported(tree, target, self.phase()));
        }
        let mut scope = ScopeTower::for_element(tree, cx.symbols(), target);
        match &tree.node(target).kind {
            NodeKind::Function(function) => {
                let returned = match function.body {
                    Some(body) => resolve_block(cx, &mut scope, body)?,
                    None => None,
                };
                if let Some(return_type) = function.return_type {
                    fill_implicit(tree, return_type, || {
                        returned.unwrap_or(ConeType::Builtin(BuiltinType::Unit))
                    });
                }
            }
            NodeKind::Property(property) => {
                let initialized = match property.initializer {
                    Some(initializer) => Some(resolve_statement(cx, &scope, initializer)?),
                    None => None,
                };
                if let Some(return_type) = property.return_type {
                    fill_implicit(tree, return_type, || {
                        initialized
                            .unwrap_or(ConeType::Error(Diagnostic::CannotInferType(property.name)))
                    });
                }
            }
            NodeKind::AnonymousInitializer(init) => {
                if let Some(body) = init.body {
                    resolve_block(cx, &mut scope, body)?;
                }
            }
            NodeKind::Script(script) => {
                if let Some(body) = script.body {
                    resolve_block(cx, &mut scope, body)?;
                }
            }
            NodeKind::CodeFragment(fragment) => {
                if let Some(block) = fragment.block {
                    resolve_block(cx, &mut scope, block)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        check_owned(
            tree,
            target,
            Ownership::WITH_BODIES,
            self.phase(),
            "typed statement with bound names",
            |statement: &StatementFields| statement.ty.is_some() && statement.expression.is_resolved(),
        )?;
        check_owned(
            tree,
            target,
            Ownership::WITH_BODIES,
            self.phase(),
            "no implicit type left",
            |type_ref: &TypeRefFields| !matches!(type_ref.ty, TypeRefState::Implicit),
        )
    }
}

fn fill_implicit(tree: &Tree, type_ref: NodeId, ty: impl FnOnce() -> ConeType) {
    tree.with_fields_mut(type_ref, |type_ref: &mut TypeRefFields| {
        if matches!(type_ref.ty, TypeRefState::Implicit) {
            type_ref.ty = TypeRefState::Resolved(ty());
        }
    });
}

/// Resolves the statements of `block` in order. Returns the type of the first
/// `return`, if any.
fn resolve_block(cx: &ResolveCx<'_>, scope: &mut ScopeTower<'_>, block: NodeId) -> ResolveResult<Option<ConeType>> {
    let tree = cx.tree();
    let NodeKind::Block(syntax) = &tree.node(block).kind else {
        unreachable!("bug! body is not a block")
    };
    scope.push_locals([]);
    let mut returned = None;
    for &statement in &syntax.statements {
        let ty = resolve_statement(cx, scope, statement)?;
        let NodeKind::Statement(Statement { kind, .. }) = &tree.node(statement).kind else {
            unreachable!("bug! block holds a non-statement")
        };
        match kind {
            StatementKind::LocalVariable { name } => scope.add_local(*name, statement),
            StatementKind::Return if returned.is_none() => returned = Some(ty),
            StatementKind::Return | StatementKind::Expression => {}
        }
    }
    Ok(returned)
}

fn resolve_statement(cx: &ResolveCx<'_>, scope: &ScopeTower<'_>, statement: NodeId) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    let Some(fields) = tree.entity::<StatementFields>(statement) else {
        unreachable!("bug! statement without statement fields")
    };
    if let Some(ty) = fields.ty {
        return Ok(ty);
    }
    cx.collect(ResolvePhase::BodyResolve, || scope.snapshot(statement));
    let mut expression = fields.expression;
    bind_expression(scope, &mut expression);
    let ty = type_of(cx, &expression)?;
    tree.with_fields_mut(statement, |fields: &mut StatementFields| {
        fields.expression = expression;
        fields.ty = Some(ty.clone());
    });
    Ok(ty)
}

fn type_of(cx: &ResolveCx<'_>, expression: &Expression) -> ResolveResult<ConeType> {
    match expression {
        Expression::Literal(literal) => Ok(ConeType::Builtin(match literal {
            Literal::Int(_) => BuiltinType::Int,
            Literal::String(_) => BuiltinType::String,
            Literal::Boolean(_) => BuiltinType::Boolean,
            Literal::Null => BuiltinType::Nothing,
        })),
        Expression::Access(access) => match &access.reference {
            Reference::Resolved(id) => type_of_value(cx, *id),
            Reference::Error(diagnostic) => Ok(ConeType::Error(diagnostic.clone())),
            Reference::Unresolved => Ok(ConeType::Error(Diagnostic::UnresolvedReference(access.name))),
        },
        Expression::Call(call) => match &call.reference {
            Reference::Resolved(id) => match &cx.tree().node(*id).kind {
                NodeKind::Class(_) => Ok(ConeType::Class {
                    class: *id,
                    arguments: Vec::new(),
                    nullable: false,
                }),
                _ => declared_type(cx, *id),
            },
            Reference::Error(diagnostic) => Ok(ConeType::Error(diagnostic.clone())),
            Reference::Unresolved => Ok(ConeType::Error(Diagnostic::UnresolvedReference(call.callee))),
        },
    }
}

fn type_of_value(cx: &ResolveCx<'_>, value: NodeId) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    match &tree.node(value).kind {
        NodeKind::Statement(_) => Ok(tree
            .with_fields(value, |statement: &StatementFields| statement.ty.clone())
            .flatten()
            .unwrap_or_else(|| {
                let name = tree.node(value).name().unwrap_or_else(|| "<local>".into());
                ConeType::Error(Diagnostic::CannotInferType(name))
            })),
        NodeKind::Class(class) if class.class_kind == ClassKind::Object => Ok(ConeType::Class {
            class: value,
            arguments: Vec::new(),
            nullable: false,
        }),
        _ => declared_type(cx, value),
    }
}

/// Declared or inferred type of a function, property or parameter, resolving
/// its owner as far as needed.
fn declared_type(cx: &ResolveCx<'_>, declaration: NodeId) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    let node = tree.node(declaration);
    let name = node.name().unwrap_or_else(|| "<anonymous>".into());
    let Some(type_ref) = node.kind.return_type() else {
        return Ok(ConeType::Error(Diagnostic::CannotInferType(name)));
    };
    let owner = match node.kind {
        NodeKind::ValueParameter(_) => tree
            .containing_declaration(declaration)
            .expect("bug! parameters live inside a declaration"),
        _ => declaration,
    };
    let read = || {
        tree.with_fields(type_ref, |type_ref: &TypeRefFields| type_ref.ty.clone())
            .expect("bug! type reference without type fields")
    };
    let (phase, fallback) = match read() {
        TypeRefState::Resolved(ty) => return Ok(ty),
        TypeRefState::Unresolved => (ResolvePhase::Types, Diagnostic::CannotInferType(name)),
        TypeRefState::Implicit => (ResolvePhase::BodyResolve, Diagnostic::RecursiveImplicitType(name)),
    };
    match cx.resolve(owner, phase) {
        Ok(()) => {}
        Err(ResolveError::CyclicDependency { .. }) => {
            tracing::debug!(declaration = declaration.index(), "type depends on itself");
            return Ok(ConeType::Error(fallback));
        }
        Err(error) => return Err(error),
    }
    Ok(read().resolved().cloned().unwrap_or(ConeType::Error(fallback)))
}
