use crate::SymbolProvider;
use indexmap::IndexSet;
use phasec_span::Symbol;
use phasec_tree::{
    NodeId, Tree,
    fields::{BuiltinType, FileFields, ImportResolution},
    node::{ClassKind, NodeKind, Statement, StatementKind},
};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Classes, type aliases and type parameters.
    Type,
    /// Properties, parameters, locals and objects.
    Value,
    /// Functions and class constructors.
    Callable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(NodeId),
    Builtin(BuiltinType),
    Ambiguous,
    NotFound,
}

/// Names visible at an element, as reported to a context collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub owner: NodeId,
    pub types: Vec<Symbol>,
    pub values: Vec<Symbol>,
}

#[derive(Debug, Clone)]
enum Level {
    Locals(Vec<(Symbol, NodeId)>),
    Declaration {
        node: NodeId,
        constructor_parameters: bool,
    },
    ExplicitImports(NodeId),
    Package(Symbol),
    StarImports(NodeId),
}

/// Lexical scopes around an element, innermost first.
pub struct ScopeTower<'a> {
    tree: &'a Tree,
    symbols: &'a SymbolProvider,
    levels: Vec<Level>,
}

impl<'a> ScopeTower<'a> {
    /// Scopes of `element`: its own declaration (if it is one), enclosing
    /// declarations, then the file's imports and package.
    pub fn for_element(tree: &'a Tree, symbols: &'a SymbolProvider, element: NodeId) -> Self {
        let mut levels = Vec::new();
        let declarations = std::iter::once(element)
            .chain(tree.ancestors(element))
            .filter(|&node| tree.node(node).is_declaration());
        for (depth, node) in declarations.enumerate() {
            match &tree.node(node).kind {
                NodeKind::File(file) => {
                    levels.push(Level::ExplicitImports(node));
                    levels.push(Level::Package(file.package));
                    levels.push(Level::StarImports(node));
                }
                _ => levels.push(Level::Declaration {
                    node,
                    // only members see the primary constructor of their class
                    constructor_parameters: depth == 1,
                }),
            }
        }
        ScopeTower {
            tree,
            symbols,
            levels,
        }
    }

    /// Opens a scope for locals, innermost.
    pub fn push_locals(&mut self, locals: impl IntoIterator<Item = (Symbol, NodeId)>) {
        self.levels.insert(0, Level::Locals(locals.into_iter().collect()));
    }

    /// Adds a local to the innermost local scope. Later locals shadow earlier ones.
    pub fn add_local(&mut self, name: Symbol, node: NodeId) {
        match self.levels.first_mut() {
            Some(Level::Locals(locals)) => locals.push((name, node)),
            _ => self.levels.insert(0, Level::Locals(vec![(name, node)])),
        }
    }

    pub fn lookup(&self, namespace: Namespace, name: Symbol) -> Lookup {
        if name.as_str().contains('.') {
            return self.lookup_qualified(namespace, name);
        }
        for level in &self.levels {
            let candidates = self.candidates(level, namespace, name);
            match candidates.as_slice() {
                [] => continue,
                [single] => return Lookup::Found(*single),
                _ if namespace == Namespace::Callable => return Lookup::Found(candidates[0]),
                _ => return Lookup::Ambiguous,
            }
        }
        match namespace {
            Namespace::Type => BuiltinType::from_name(name.as_str())
                .map(Lookup::Builtin)
                .unwrap_or(Lookup::NotFound),
            Namespace::Value | Namespace::Callable => Lookup::NotFound,
        }
    }

    fn lookup_qualified(&self, namespace: Namespace, path: Symbol) -> Lookup {
        let candidates: SmallVec<[NodeId; 2]> = self
            .symbols
            .qualified(path)
            .iter()
            .copied()
            .filter(|&id| self.in_namespace(id, namespace))
            .collect();
        match candidates.as_slice() {
            [] => Lookup::NotFound,
            [single] => Lookup::Found(*single),
            _ => Lookup::Ambiguous,
        }
    }

    fn in_namespace(&self, id: NodeId, namespace: Namespace) -> bool {
        match (&self.tree.node(id).kind, namespace) {
            (NodeKind::Class(_) | NodeKind::TypeAlias(_) | NodeKind::TypeParameter(_), Namespace::Type) => true,
            (NodeKind::Class(class), Namespace::Value) => class.class_kind == ClassKind::Object,
            (
                NodeKind::Property(_)
                | NodeKind::ValueParameter(_)
                | NodeKind::Statement(Statement {
                    kind: StatementKind::LocalVariable { .. },
                    ..
                }),
                Namespace::Value,
            ) => true,
            (NodeKind::Function(_) | NodeKind::Class(_), Namespace::Callable) => true,
            _ => false,
        }
    }

    /// Every `(name, node)` a level introduces, before namespace filtering.
    fn entries(&self, level: &Level) -> Vec<(Symbol, NodeId)> {
        let tree = self.tree;
        let named = |id: NodeId| tree.node(id).name().map(|name| (name, id));
        match level {
            Level::Locals(locals) => locals.iter().rev().copied().collect(),
            Level::Declaration {
                node,
                constructor_parameters,
            } => {
                let kind = &tree.node(*node).kind;
                let mut entries: Vec<_> = kind.type_parameters().iter().filter_map(|&id| named(id)).collect();
                match kind {
                    NodeKind::Function(_) => {
                        entries.extend(kind.value_parameters().iter().filter_map(|&id| named(id)))
                    }
                    NodeKind::Class(_) if *constructor_parameters => {
                        entries.extend(kind.value_parameters().iter().filter_map(|&id| named(id)))
                    }
                    _ => {}
                }
                entries.extend(kind.declarations().iter().filter_map(|&id| named(id)));
                entries
            }
            Level::ExplicitImports(file) => {
                let NodeKind::File(syntax) = &tree.node(*file).kind else {
                    return Vec::new();
                };
                let resolved = tree
                    .with_fields(*file, |fields: &FileFields| fields.imports.clone())
                    .unwrap_or_default();
                syntax
                    .imports
                    .iter()
                    .zip(resolved)
                    .filter_map(|(directive, resolution)| match resolution {
                        ImportResolution::Declaration(id) => {
                            directive.imported_name().map(|name| (name, id))
                        }
                        _ => None,
                    })
                    .collect()
            }
            Level::Package(package) => self.package_entries(*package),
            Level::StarImports(file) => tree
                .with_fields(*file, |fields: &FileFields| fields.imports.clone())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|resolution| match resolution {
                    ImportResolution::Package(package) => Some(package),
                    _ => None,
                })
                .flat_map(|package| self.package_entries(package))
                .collect(),
        }
    }

    fn package_entries(&self, package: Symbol) -> Vec<(Symbol, NodeId)> {
        self.symbols.package_members(package).collect()
    }

    fn candidates(&self, level: &Level, namespace: Namespace, name: Symbol) -> SmallVec<[NodeId; 2]> {
        match level {
            Level::Package(package) => self
                .symbols
                .top_level(*package, name)
                .iter()
                .copied()
                .filter(|&id| self.in_namespace(id, namespace))
                .collect(),
            Level::Locals(locals) => locals
                .iter()
                .rev()
                .find(|(local, id)| *local == name && self.in_namespace(*id, namespace))
                .map(|&(_, id)| id)
                .into_iter()
                .collect(),
            _ => self
                .entries(level)
                .into_iter()
                .filter(|&(entry, id)| entry == name && self.in_namespace(id, namespace))
                .map(|(_, id)| id)
                .collect(),
        }
    }

    pub fn snapshot(&self, owner: NodeId) -> ScopeSnapshot {
        let mut types = IndexSet::new();
        let mut values = IndexSet::new();
        for level in &self.levels {
            for (name, id) in self.entries(level) {
                if self.in_namespace(id, Namespace::Type) {
                    types.insert(name);
                }
                if self.in_namespace(id, Namespace::Value) || self.in_namespace(id, Namespace::Callable) {
                    values.insert(name);
                }
            }
        }
        ScopeSnapshot {
            owner,
            types: types.into_iter().collect(),
            values: values.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasec_tree::{TreeBuilder, fields::Expression};

    #[test]
    fn test_lookup_order() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let top = builder.property(file, "value", Some("Int"), None);
        let class = builder.class(file, "C", ClassKind::Class);
        let type_parameter = builder.type_parameter(class, "T");
        let constructor = builder.value_parameter(class, "value", "Int");
        let member = builder.function(class, "f", Some("Unit"));
        let first = builder.function(file, "twice", None);
        builder.function(file, "twice", None);
        builder.class(file, "Dup", ClassKind::Class);
        builder.type_alias(file, "Dup", "Int");
        let tree = builder.finish();
        let symbols = SymbolProvider::new(&tree);

        let scope = ScopeTower::for_element(&tree, &symbols, member);
        assert_eq!(scope.lookup(Namespace::Value, "value".into()), Lookup::Found(constructor));
        assert_eq!(scope.lookup(Namespace::Type, "T".into()), Lookup::Found(type_parameter));
        assert_eq!(
            scope.lookup(Namespace::Type, "Int".into()),
            Lookup::Builtin(BuiltinType::Int)
        );
        assert_eq!(scope.lookup(Namespace::Type, "Dup".into()), Lookup::Ambiguous);
        assert_eq!(scope.lookup(Namespace::Callable, "twice".into()), Lookup::Found(first));
        assert_eq!(scope.lookup(Namespace::Value, "missing".into()), Lookup::NotFound);

        // constructor parameters are only visible to members
        let outside = ScopeTower::for_element(&tree, &symbols, class);
        assert_eq!(outside.lookup(Namespace::Value, "value".into()), Lookup::Found(top));
    }

    #[test]
    fn test_later_locals_shadow_earlier_ones() {
        let mut builder = TreeBuilder::new();
        let file = builder.file("main.kt", "app");
        let function = builder.function(file, "f", None);
        let name = Symbol::new("x");
        let local = StatementKind::LocalVariable { name };
        let first = builder.statement(function, local.clone(), Expression::int(1));
        let second = builder.statement(function, local, Expression::int(2));
        let tree = builder.finish();
        let symbols = SymbolProvider::new(&tree);

        let mut scope = ScopeTower::for_element(&tree, &symbols, function);
        scope.push_locals([]);
        scope.add_local(name, first);
        assert_eq!(scope.lookup(Namespace::Value, name), Lookup::Found(first));
        scope.add_local(name, second);
        assert_eq!(scope.lookup(Namespace::Value, name), Lookup::Found(second));

        let snapshot = scope.snapshot(second);
        assert_eq!(snapshot.owner, second);
        assert_eq!(snapshot.values, vec![name, Symbol::new("f")]);
        assert!(snapshot.types.is_empty());
    }
}
