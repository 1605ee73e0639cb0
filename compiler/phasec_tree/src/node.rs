use crate::{NodeId, fields::Argument, fields::Expression};
use phasec_span::Symbol;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    Private,
    Protected,
    Internal,
    Public,
}

impl Visibility {
    /// The more restrictive of the two.
    pub fn restrict(self, other: Visibility) -> Visibility {
        self.min(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Final,
    Open,
    Abstract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub visibility: Option<Visibility>,
    pub modality: Option<Modality>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    Object,
    Annotation,
}

#[derive(Debug, Clone)]
pub struct ImportDirective {
    /// Fully qualified path, `pkg.Name` or `pkg` for star imports.
    pub path: Symbol,
    pub alias: Option<Symbol>,
    pub all_under: bool,
}

impl ImportDirective {
    /// Name the import introduces into the file scope.
    pub fn imported_name(&self) -> Option<Symbol> {
        if self.all_under {
            return None;
        }
        self.alias.or_else(|| {
            self.path
                .split_qualified()
                .map(|(_, name)| name)
                .or(Some(self.path))
        })
    }
}

#[derive(Debug, Clone)]
pub struct File {
    pub name: Symbol,
    pub package: Symbol,
    pub imports: Vec<ImportDirective>,
    pub annotations_container: Option<NodeId>,
    pub declarations: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub name: Symbol,
    pub annotations: Vec<NodeId>,
    pub body: Option<NodeId>,
    pub declarations: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CodeFragment {
    pub block: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Symbol,
    pub class_kind: ClassKind,
    pub modifiers: Modifiers,
    pub annotations: Vec<NodeId>,
    pub type_parameters: Vec<NodeId>,
    /// Primary constructor parameters.
    pub value_parameters: Vec<NodeId>,
    pub super_types: Vec<NodeId>,
    pub declarations: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub modifiers: Modifiers,
    pub annotations: Vec<NodeId>,
    pub type_parameters: Vec<NodeId>,
    pub value_parameters: Vec<NodeId>,
    pub return_type: Option<NodeId>,
    pub body: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: Symbol,
    pub is_var: bool,
    pub modifiers: Modifiers,
    pub annotations: Vec<NodeId>,
    pub return_type: Option<NodeId>,
    pub initializer: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ValueParameter {
    pub name: Symbol,
    pub annotations: Vec<NodeId>,
    pub return_type: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct TypeAlias {
    pub name: Symbol,
    pub modifiers: Modifiers,
    pub annotations: Vec<NodeId>,
    pub type_parameters: Vec<NodeId>,
    pub expanded_type: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct AnonymousInitializer {
    pub annotations: Vec<NodeId>,
    pub body: Option<NodeId>,
}

/// Modifier list left without a declaration, e.g. a trailing `@A` in a class body.
#[derive(Debug, Clone)]
pub struct DanglingModifierList {
    pub annotations: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FileAnnotationsContainer {
    pub annotations: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct TypeParameter {
    pub name: Symbol,
    pub annotations: Vec<NodeId>,
    pub bounds: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct TypeRef {
    /// `None` for an implicit (omitted) type.
    pub name: Option<Symbol>,
    pub nullable: bool,
    pub annotations: Vec<NodeId>,
    pub arguments: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: Symbol,
    pub type_arguments: Vec<Symbol>,
    /// Arguments as written; the working copy lives in the annotation fields.
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expression,
    LocalVariable { name: Symbol },
    Return,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Expression as written; the working copy lives in the statement fields.
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    File(File),
    Script(Script),
    CodeFragment(CodeFragment),
    Class(Class),
    Function(Function),
    Property(Property),
    ValueParameter(ValueParameter),
    TypeAlias(TypeAlias),
    AnonymousInitializer(AnonymousInitializer),
    DanglingModifierList(DanglingModifierList),
    FileAnnotationsContainer(FileAnnotationsContainer),
    TypeParameter(TypeParameter),
    TypeRef(TypeRef),
    Annotation(Annotation),
    Block(Block),
    Statement(Statement),
}

/// Field-less discriminant of [`NodeKind`], used in diagnostics and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    File,
    Script,
    CodeFragment,
    Class,
    Function,
    Property,
    ValueParameter,
    TypeAlias,
    AnonymousInitializer,
    DanglingModifierList,
    FileAnnotationsContainer,
    TypeParameter,
    TypeRef,
    Annotation,
    Block,
    Statement,
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeTag::File => "file",
            NodeTag::Script => "script",
            NodeTag::CodeFragment => "code fragment",
            NodeTag::Class => "class",
            NodeTag::Function => "function",
            NodeTag::Property => "property",
            NodeTag::ValueParameter => "value parameter",
            NodeTag::TypeAlias => "type alias",
            NodeTag::AnonymousInitializer => "anonymous initializer",
            NodeTag::DanglingModifierList => "dangling modifier list",
            NodeTag::FileAnnotationsContainer => "file annotations container",
            NodeTag::TypeParameter => "type parameter",
            NodeTag::TypeRef => "type reference",
            NodeTag::Annotation => "annotation",
            NodeTag::Block => "block",
            NodeTag::Statement => "statement",
        };
        f.write_str(name)
    }
}

impl NodeKind {
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::File(_) => NodeTag::File,
            NodeKind::Script(_) => NodeTag::Script,
            NodeKind::CodeFragment(_) => NodeTag::CodeFragment,
            NodeKind::Class(_) => NodeTag::Class,
            NodeKind::Function(_) => NodeTag::Function,
            NodeKind::Property(_) => NodeTag::Property,
            NodeKind::ValueParameter(_) => NodeTag::ValueParameter,
            NodeKind::TypeAlias(_) => NodeTag::TypeAlias,
            NodeKind::AnonymousInitializer(_) => NodeTag::AnonymousInitializer,
            NodeKind::DanglingModifierList(_) => NodeTag::DanglingModifierList,
            NodeKind::FileAnnotationsContainer(_) => NodeTag::FileAnnotationsContainer,
            NodeKind::TypeParameter(_) => NodeTag::TypeParameter,
            NodeKind::TypeRef(_) => NodeTag::TypeRef,
            NodeKind::Annotation(_) => NodeTag::Annotation,
            NodeKind::Block(_) => NodeTag::Block,
            NodeKind::Statement(_) => NodeTag::Statement,
        }
    }

    /// Declarations carry their own phase and bound the traversal of enclosing declarations.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::File(_)
                | NodeKind::Script(_)
                | NodeKind::CodeFragment(_)
                | NodeKind::Class(_)
                | NodeKind::Function(_)
                | NodeKind::Property(_)
                | NodeKind::TypeAlias(_)
                | NodeKind::AnonymousInitializer(_)
                | NodeKind::DanglingModifierList(_)
                | NodeKind::FileAnnotationsContainer(_)
        )
    }

    pub fn is_statement(&self) -> bool {
        matches!(self, NodeKind::Block(_) | NodeKind::Statement(_))
    }

    pub fn is_regular_declaration_with_annotation(&self) -> bool {
        matches!(
            self,
            NodeKind::Function(_)
                | NodeKind::Property(_)
                | NodeKind::AnonymousInitializer(_)
                | NodeKind::DanglingModifierList(_)
                | NodeKind::FileAnnotationsContainer(_)
                | NodeKind::TypeAlias(_)
        )
    }

    /// Declarations that carry a resolved status once past STATUS.
    pub fn has_status(&self) -> bool {
        matches!(
            self,
            NodeKind::Class(_) | NodeKind::Function(_) | NodeKind::Property(_) | NodeKind::TypeAlias(_)
        )
    }

    pub fn name(&self) -> Option<Symbol> {
        match self {
            NodeKind::File(file) => Some(file.name),
            NodeKind::Script(script) => Some(script.name),
            NodeKind::Class(class) => Some(class.name),
            NodeKind::Function(function) => Some(function.name),
            NodeKind::Property(property) => Some(property.name),
            NodeKind::ValueParameter(parameter) => Some(parameter.name),
            NodeKind::TypeAlias(alias) => Some(alias.name),
            NodeKind::TypeParameter(parameter) => Some(parameter.name),
            NodeKind::TypeRef(type_ref) => type_ref.name,
            NodeKind::Annotation(annotation) => Some(annotation.name),
            NodeKind::Statement(Statement {
                kind: StatementKind::LocalVariable { name },
                ..
            }) => Some(*name),
            _ => None,
        }
    }

    pub fn modifiers(&self) -> Option<Modifiers> {
        match self {
            NodeKind::Class(class) => Some(class.modifiers),
            NodeKind::Function(function) => Some(function.modifiers),
            NodeKind::Property(property) => Some(property.modifiers),
            NodeKind::TypeAlias(alias) => Some(alias.modifiers),
            _ => None,
        }
    }

    pub fn annotations(&self) -> &[NodeId] {
        match self {
            NodeKind::Script(script) => &script.annotations,
            NodeKind::Class(class) => &class.annotations,
            NodeKind::Function(function) => &function.annotations,
            NodeKind::Property(property) => &property.annotations,
            NodeKind::ValueParameter(parameter) => &parameter.annotations,
            NodeKind::TypeAlias(alias) => &alias.annotations,
            NodeKind::AnonymousInitializer(init) => &init.annotations,
            NodeKind::DanglingModifierList(list) => &list.annotations,
            NodeKind::FileAnnotationsContainer(container) => &container.annotations,
            NodeKind::TypeParameter(parameter) => &parameter.annotations,
            NodeKind::TypeRef(type_ref) => &type_ref.annotations,
            NodeKind::File(_)
            | NodeKind::CodeFragment(_)
            | NodeKind::Annotation(_)
            | NodeKind::Block(_)
            | NodeKind::Statement(_) => &[],
        }
    }

    pub fn type_parameters(&self) -> &[NodeId] {
        match self {
            NodeKind::Class(class) => &class.type_parameters,
            NodeKind::Function(function) => &function.type_parameters,
            NodeKind::TypeAlias(alias) => &alias.type_parameters,
            _ => &[],
        }
    }

    pub fn value_parameters(&self) -> &[NodeId] {
        match self {
            NodeKind::Class(class) => &class.value_parameters,
            NodeKind::Function(function) => &function.value_parameters,
            _ => &[],
        }
    }

    /// Type reference describing the declared (or implicit) type of a callable.
    pub fn return_type(&self) -> Option<NodeId> {
        match self {
            NodeKind::Function(function) => function.return_type,
            NodeKind::Property(property) => property.return_type,
            NodeKind::ValueParameter(parameter) => parameter.return_type,
            NodeKind::TypeAlias(alias) => alias.expanded_type,
            _ => None,
        }
    }

    /// Member or top-level declarations directly nested in this node.
    pub fn declarations(&self) -> &[NodeId] {
        match self {
            NodeKind::File(file) => &file.declarations,
            NodeKind::Script(script) => &script.declarations,
            NodeKind::Class(class) => &class.declarations,
            _ => &[],
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut children = Vec::new();
        match self {
            NodeKind::File(file) => {
                children.extend(file.annotations_container);
                children.extend_from_slice(&file.declarations);
            }
            NodeKind::Script(script) => {
                children.extend_from_slice(&script.annotations);
                children.extend(script.body);
                children.extend_from_slice(&script.declarations);
            }
            NodeKind::CodeFragment(fragment) => children.extend(fragment.block),
            NodeKind::Class(class) => {
                children.extend_from_slice(&class.annotations);
                children.extend_from_slice(&class.type_parameters);
                children.extend_from_slice(&class.value_parameters);
                children.extend_from_slice(&class.super_types);
                children.extend_from_slice(&class.declarations);
            }
            NodeKind::Function(function) => {
                children.extend_from_slice(&function.annotations);
                children.extend_from_slice(&function.type_parameters);
                children.extend_from_slice(&function.value_parameters);
                children.extend(function.return_type);
                children.extend(function.body);
            }
            NodeKind::Property(property) => {
                children.extend_from_slice(&property.annotations);
                children.extend(property.return_type);
                children.extend(property.initializer);
            }
            NodeKind::ValueParameter(parameter) => {
                children.extend_from_slice(&parameter.annotations);
                children.extend(parameter.return_type);
            }
            NodeKind::TypeAlias(alias) => {
                children.extend_from_slice(&alias.annotations);
                children.extend_from_slice(&alias.type_parameters);
                children.extend(alias.expanded_type);
            }
            NodeKind::AnonymousInitializer(init) => {
                children.extend_from_slice(&init.annotations);
                children.extend(init.body);
            }
            NodeKind::DanglingModifierList(list) => {
                children.extend_from_slice(&list.annotations)
            }
            NodeKind::FileAnnotationsContainer(container) => {
                children.extend_from_slice(&container.annotations)
            }
            NodeKind::TypeParameter(parameter) => {
                children.extend_from_slice(&parameter.annotations);
                children.extend_from_slice(&parameter.bounds);
            }
            NodeKind::TypeRef(type_ref) => {
                children.extend_from_slice(&type_ref.annotations);
                children.extend_from_slice(&type_ref.arguments);
            }
            NodeKind::Annotation(_) => {}
            NodeKind::Block(block) => children.extend_from_slice(&block.statements),
            NodeKind::Statement(_) => {}
        }
        children
    }
}
