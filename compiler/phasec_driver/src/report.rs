use crate::resolve::Outcome;
use colored::Colorize;
use phasec_tree::{
    NodeId, ResolvePhase, Tree,
    fields::{ArgumentMapping, ConeType, Diagnostic, ImportResolution, NodeFields, Reference, TypeRefState},
    node::NodeKind,
};
use std::fmt::Write;

/// Diagnostics recorded anywhere in the tree, in node order.
pub fn diagnostics(tree: &Tree) -> Vec<(NodeId, Diagnostic)> {
    let mut found = Vec::new();
    for node in tree.iter() {
        let mut local = Vec::new();
        match &*node.fields() {
            NodeFields::None | NodeFields::Declaration(_) => {}
            NodeFields::File(file) => {
                for import in &file.imports {
                    if let ImportResolution::Error(diagnostic) = import {
                        local.push(diagnostic.clone());
                    }
                }
            }
            NodeFields::TypeRef(type_ref) => {
                if let TypeRefState::Resolved(ConeType::Error(diagnostic)) = &type_ref.ty {
                    local.push(diagnostic.clone());
                }
            }
            NodeFields::Annotation(annotation) => {
                if let Some(call) = &annotation.call {
                    if let Reference::Error(diagnostic) = &call.callee {
                        local.push(diagnostic.clone());
                    }
                    for argument in call.argument_list.arguments() {
                        argument.value.diagnostics(&mut local);
                    }
                }
                if let ArgumentMapping::Resolved { unmatched, .. } = &annotation.argument_mapping {
                    local.extend(unmatched.iter().cloned());
                }
            }
            NodeFields::Statement(statement) => {
                statement.expression.diagnostics(&mut local);
                if local.is_empty() {
                    if let Some(ConeType::Error(diagnostic)) = &statement.ty {
                        local.push(diagnostic.clone());
                    }
                }
            }
        }
        found.extend(local.into_iter().map(|diagnostic| (node.id, diagnostic)));
    }
    found
}

pub struct Report<'t> {
    tree: &'t Tree,
    phase: ResolvePhase,
    outcome: &'t Outcome,
    diagnostics: Vec<(NodeId, Diagnostic)>,
}

impl<'t> Report<'t> {
    pub fn new(tree: &'t Tree, phase: ResolvePhase, outcome: &'t Outcome) -> Report<'t> {
        Report {
            tree,
            phase,
            outcome,
            diagnostics: diagnostics(tree),
        }
    }

    pub fn diagnostics(&self) -> &[(NodeId, Diagnostic)] {
        &self.diagnostics
    }

    fn location(&self, node: NodeId) -> String {
        let file = self
            .tree
            .containing_file(node)
            .and_then(|file| match &self.tree.node(file).kind {
                NodeKind::File(file) => Some(file.name.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("{file}:{}", self.tree.node(node).span.start.line)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (node, diagnostic) in &self.diagnostics {
            let _ = writeln!(
                out,
                "{}: {} {}",
                self.location(*node).bold(),
                "error:".red().bold(),
                diagnostic
            );
        }
        for (target, error) in &self.outcome.failures {
            let _ = writeln!(out, "{} {target}: {error}", "failed:".red().bold());
        }

        let summary = format!(
            "Resolved {} of {} targets to {} ({} diagnostics, {} failures)",
            self.outcome.resolved,
            self.outcome.resolved + self.outcome.failures.len(),
            self.phase,
            self.diagnostics.len(),
            self.outcome.failures.len()
        );
        let summary = if self.outcome.failures.is_empty() {
            summary.green().bold()
        } else {
            summary.red().bold()
        };
        let _ = writeln!(out, "{summary}");
        out
    }
}
