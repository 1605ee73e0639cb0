use crate::{
    NodeId,
    fields::{ArgumentMapping, ImportResolution, NodeFields, TypeRefState},
    node::NodeKind,
    tree::Tree,
};
use std::fmt::Write;

/// Renders a tree as an indented outline with phases and resolved state.
pub struct TreePrinter<'t> {
    tree: &'t Tree,
    out: String,
    depth: usize,
}

impl<'t> TreePrinter<'t> {
    pub fn new(tree: &'t Tree) -> TreePrinter<'t> {
        TreePrinter {
            tree,
            out: String::new(),
            depth: 0,
        }
    }

    pub fn print(mut self) -> String {
        for &file in self.tree.files() {
            self.node(file);
        }
        self.out
    }

    pub fn print_node(mut self, node: NodeId) -> String {
        self.node(node);
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn node(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        let mut text = String::new();
        let _ = write!(text, "{}", node.tag());
        if let Some(name) = node.name() {
            let _ = write!(text, " {name}");
        }
        if node.is_declaration() {
            let _ = write!(text, " [{}]", node.phase());
        }
        self.describe(&node.kind, &node.fields(), &mut text);
        self.line(&text);

        self.depth += 1;
        for child in self.tree.children(id) {
            self.node(child);
        }
        self.depth -= 1;
    }

    fn describe(&self, kind: &NodeKind, fields: &NodeFields, text: &mut String) {
        match fields {
            NodeFields::None => {}
            NodeFields::File(file) => {
                let NodeKind::File(syntax) = kind else { return };
                for (directive, resolution) in syntax.imports.iter().zip(&file.imports) {
                    let star = if directive.all_under { ".*" } else { "" };
                    let _ = match resolution {
                        ImportResolution::Unresolved => write!(text, " import {}{star}?", directive.path),
                        ImportResolution::Declaration(id) => {
                            write!(text, " import {}@{}", directive.path, id.index())
                        }
                        ImportResolution::Package(_) => write!(text, " import {}{star}", directive.path),
                        ImportResolution::Error(diagnostic) => {
                            write!(text, " import {}{star} ({diagnostic})", directive.path)
                        }
                    };
                }
            }
            NodeFields::Declaration(declaration) => {
                if let Some(status) = declaration.status {
                    let _ = write!(
                        text,
                        " {:?} {:?} (effective {:?})",
                        status.visibility, status.modality, status.effective_visibility
                    );
                }
            }
            NodeFields::TypeRef(type_ref) => {
                let _ = match &type_ref.ty {
                    TypeRefState::Unresolved => write!(text, " : ?"),
                    TypeRefState::Implicit => write!(text, " : <implicit>"),
                    TypeRefState::Resolved(ty) => write!(text, " : {ty}"),
                };
            }
            NodeFields::Annotation(annotation) => match &annotation.argument_mapping {
                ArgumentMapping::Unresolved => text.push_str(" (unresolved)"),
                ArgumentMapping::Resolved { mapping, unmatched } => {
                    text.push_str(" (");
                    for (index, (name, value)) in mapping.iter().enumerate() {
                        if index > 0 {
                            text.push_str(", ");
                        }
                        let _ = write!(text, "{name} = {value}");
                    }
                    text.push(')');
                    for diagnostic in unmatched {
                        let _ = write!(text, " !{diagnostic}");
                    }
                }
            },
            NodeFields::Statement(statement) => {
                let _ = write!(text, " {}", statement.expression);
                if let Some(ty) = &statement.ty {
                    let _ = write!(text, " : {ty}");
                }
            }
        }
    }
}
