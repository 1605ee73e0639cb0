use super::bind::resolve_type_name;
use crate::{
    LazyResolver, ResolveCx, ScopeTower,
    checker::{check_owned, unsupported},
    keepers,
};
use phasec_error::ResolveResult;
use phasec_keeper::{DeclarationKeeper, KeeperGuard};
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{ConeType, TypeRefFields, TypeRefState},
    node::NodeKind,
    visit::{Ownership, TargetKind},
};

static KEEPER: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
    tree.walk_owned(target, Ownership::HEADER, |element| {
        if matches!(tree.node(element).kind, NodeKind::TypeRef(_)) {
            scope.entity(element, &keepers::TYPE_REF);
        }
    });
});

/// Resolves the explicit type references of a declaration header.
pub struct TypesResolver;

impl LazyResolver for TypesResolver {
    fn phase(&self) -> ResolvePhase {
        ResolvePhase::Types
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        KEEPER.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        let tree = cx.tree();
        match tree.classify(target) {
            TargetKind::NotApplicable => return Err(unsupported(tree, target, self.phase())),
            TargetKind::File | TargetKind::CodeFragment => return Ok(()),
            TargetKind::RegularClass | TargetKind::Script | TargetKind::RegularDeclaration => {}
        }
        for element in tree.owned_elements(target, Ownership::HEADER) {
            let unresolved = tree
                .with_fields(element, |type_ref: &TypeRefFields| {
                    matches!(type_ref.ty, TypeRefState::Unresolved)
                })
                .unwrap_or(false);
            if unresolved {
                let ty = resolve_type_ref(cx, element)?;
                tree.with_fields_mut(element, |type_ref: &mut TypeRefFields| {
                    type_ref.ty = TypeRefState::Resolved(ty)
                });
            }
        }
        Ok(())
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        check_owned(
            tree,
            target,
            Ownership::HEADER,
            self.phase(),
            "explicit type references resolved",
            |type_ref: &TypeRefFields| !matches!(type_ref.ty, TypeRefState::Unresolved),
        )
    }
}

/// Computes the type written at `type_ref`, arguments included.
fn resolve_type_ref(cx: &ResolveCx<'_>, type_ref: NodeId) -> ResolveResult<ConeType> {
    let tree = cx.tree();
    let NodeKind::TypeRef(syntax) = &tree.node(type_ref).kind else {
        unreachable!("bug! type fields on a non-type node")
    };
    let Some(name) = syntax.name else {
        unreachable!("bug! implicit types are never unresolved")
    };
    let mut arguments = Vec::with_capacity(syntax.arguments.len());
    for &argument in &syntax.arguments {
        arguments.push(resolve_type_ref(cx, argument)?);
    }
    let scope = ScopeTower::for_element(tree, cx.symbols(), type_ref);
    resolve_type_name(cx, &scope, name, arguments, syntax.nullable)
}
