use phasec_span::Symbol;
use phasec_tree::{NodeId, Tree, node::NodeKind};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashSet};
use smallvec::SmallVec;

/// Index of top-level declarations by package, built once per session.
#[derive(Debug, Default)]
pub struct SymbolProvider {
    top_level: IndexMap<(Symbol, Symbol), SmallVec<[NodeId; 1]>, FxBuildHasher>,
    packages: FxHashSet<Symbol>,
}

impl SymbolProvider {
    pub fn new(tree: &Tree) -> SymbolProvider {
        let mut provider = SymbolProvider::default();
        for &file in tree.files() {
            let NodeKind::File(syntax) = &tree.node(file).kind else {
                unreachable!("bug! tree file list holds a non-file node")
            };
            provider.packages.insert(syntax.package);
            for &declaration in &syntax.declarations {
                let kind = &tree.node(declaration).kind;
                if !matches!(
                    kind,
                    NodeKind::Class(_)
                        | NodeKind::Function(_)
                        | NodeKind::Property(_)
                        | NodeKind::TypeAlias(_)
                ) {
                    continue;
                }
                if let Some(name) = kind.name() {
                    provider
                        .top_level
                        .entry((syntax.package, name))
                        .or_default()
                        .push(declaration);
                }
            }
        }
        provider
    }

    pub fn top_level(&self, package: Symbol, name: Symbol) -> &[NodeId] {
        self.top_level
            .get(&(package, name))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Declarations named by a fully qualified path such as `lib.Marker`.
    pub fn qualified(&self, path: Symbol) -> &[NodeId] {
        match path.split_qualified() {
            Some((package, name)) => self.top_level(package, name),
            None => self.top_level(Symbol::new(""), path),
        }
    }

    /// Top-level declarations of `package`, in source order.
    pub fn package_members(&self, package: Symbol) -> impl Iterator<Item = (Symbol, NodeId)> + '_ {
        self.top_level
            .iter()
            .filter(move |((owner, _), _)| *owner == package)
            .flat_map(|(&(_, name), ids)| ids.iter().map(move |&id| (name, id)))
    }

    pub fn has_package(&self, package: Symbol) -> bool {
        self.packages.contains(&package)
    }
}
