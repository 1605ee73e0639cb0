use crate::{
    LazyResolver, ResolveCx, SymbolProvider,
    checker::{check_owned, unsupported},
    keepers,
};
use phasec_error::ResolveResult;
use phasec_keeper::{DeclarationKeeper, KeeperGuard};
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{Diagnostic, FileFields, ImportResolution},
    node::{ImportDirective, NodeKind},
    visit::{Ownership, TargetKind},
};

static KEEPER: DeclarationKeeper = DeclarationKeeper::new(|tree, target, scope| {
    if tree.classify(target) == TargetKind::File {
        scope.entity(target, &keepers::FILE);
    }
});

/// Binds the import directives of files. Other declarations only move their
/// phase marker.
pub struct ImportsResolver;

impl LazyResolver for ImportsResolver {
    fn phase(&self) -> ResolvePhase {
        ResolvePhase::Imports
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        KEEPER.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        let tree = cx.tree();
        match tree.classify(target) {
            TargetKind::File => {
                let NodeKind::File(file) = &tree.node(target).kind else {
                    unreachable!("bug! classified as file")
                };
                let imports: Vec<_> = file
                    .imports
                    .iter()
                    .map(|directive| resolve_import(cx.symbols(), directive))
                    .collect();
                tree.with_fields_mut(target, |fields: &mut FileFields| fields.imports = imports);
                Ok(())
            }
            TargetKind::RegularClass
            | TargetKind::Script
            | TargetKind::RegularDeclaration
            | TargetKind::CodeFragment => Ok(()),
            TargetKind::NotApplicable => Err(unsupported(tree, target, self.phase())),
        }
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        check_owned(
            tree,
            target,
            Ownership::HEADER,
            self.phase(),
            "every import bound or reported",
            |file: &FileFields| {
                file.imports
                    .iter()
                    .all(|import| !matches!(import, ImportResolution::Unresolved))
            },
        )
    }
}

fn resolve_import(symbols: &SymbolProvider, directive: &ImportDirective) -> ImportResolution {
    if directive.all_under {
        return if symbols.has_package(directive.path) {
            ImportResolution::Package(directive.path)
        } else {
            ImportResolution::Error(Diagnostic::UnresolvedImport(directive.path))
        };
    }
    match symbols.qualified(directive.path).first() {
        Some(&declaration) if directive.path.split_qualified().is_some() => {
            ImportResolution::Declaration(declaration)
        }
        _ => ImportResolution::Error(Diagnostic::UnresolvedImport(directive.path)),
    }
}
