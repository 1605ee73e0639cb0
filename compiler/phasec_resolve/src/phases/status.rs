use crate::{
    LazyResolver, ResolveCx,
    checker::{unsupported, violation},
    keepers,
};
use phasec_error::ResolveResult;
use phasec_keeper::{DeclarationKeeper, KeeperGuard};
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{DeclarationFields, ResolvedStatus},
    node::{ClassKind, Modality, NodeKind, Visibility},
    visit::TargetKind,
};

static KEEPER: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
    if tree.node(target).kind.has_status() {
        scope.entity(target, &keepers::DECLARATION);
    }
});

/// Computes visibility and modality of classes, callables and type aliases.
pub struct StatusResolver;

impl LazyResolver for StatusResolver {
    fn phase(&self) -> ResolvePhase {
        ResolvePhase::Status
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        KEEPER.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        let tree = cx.tree();
        if tree.classify(target) == TargetKind::NotApplicable {
            return Err(unsupported(tree, target, self.phase()));
        }
        let kind = &tree.node(target).kind;
        if !kind.has_status() {
            return Ok(());
        }
        let modifiers = kind.modifiers().unwrap_or_default();
        let visibility = modifiers.visibility.unwrap_or(Visibility::Public);
        let modality = modifiers
            .modality
            .unwrap_or_else(|| default_modality(tree, target));
        let effective_visibility = tree
            .containing_declaration(target)
            .and_then(|parent| tree.with_fields(parent, |fields: &DeclarationFields| fields.status))
            .flatten()
            .map_or(visibility, |parent| visibility.restrict(parent.effective_visibility));
        let status = ResolvedStatus {
            visibility,
            modality,
            effective_visibility,
        };
        tree.with_fields_mut(target, |fields: &mut DeclarationFields| fields.status = Some(status));
        Ok(())
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        if !tree.node(target).kind.has_status() {
            return Ok(());
        }
        let status = tree
            .with_fields(target, |fields: &DeclarationFields| fields.status)
            .flatten();
        match status {
            Some(_) => Ok(()),
            None => Err(violation(
                tree,
                target,
                self.phase(),
                "a resolved status",
                "no status".to_string(),
            )),
        }
    }
}

fn default_modality(tree: &Tree, target: NodeId) -> Modality {
    let kind = &tree.node(target).kind;
    if let NodeKind::Class(class) = kind {
        if class.class_kind == ClassKind::Interface {
            return Modality::Abstract;
        }
    }
    let in_interface = tree
        .parent(target)
        .is_some_and(|parent| matches!(&tree.node(parent).kind, NodeKind::Class(class) if class.class_kind == ClassKind::Interface));
    if !in_interface {
        return Modality::Final;
    }
    let has_body = match kind {
        NodeKind::Function(function) => function.body.is_some(),
        NodeKind::Property(property) => property.initializer.is_some(),
        _ => return Modality::Final,
    };
    if has_body {
        Modality::Open
    } else {
        Modality::Abstract
    }
}
