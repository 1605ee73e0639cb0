use crate::{
    NodeId,
    node::{Modality, Visibility},
};
use indexmap::IndexMap;
use phasec_span::Symbol;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    UnresolvedReference(Symbol),
    AmbiguousReference(Symbol),
    NotAnAnnotationClass(Symbol),
    NoSuchParameter(Symbol),
    TooManyArguments { annotation: Symbol, index: usize },
    ArgumentPassedTwice(Symbol),
    RecursiveImplicitType(Symbol),
    RecursiveTypeAlias(Symbol),
    CannotInferType(Symbol),
    UnresolvedImport(Symbol),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedReference(name) => write!(f, "unresolved reference `{name}`"),
            Diagnostic::AmbiguousReference(name) => write!(f, "ambiguous reference `{name}`"),
            Diagnostic::NotAnAnnotationClass(name) => {
                write!(f, "`{name}` is not an annotation class")
            }
            Diagnostic::NoSuchParameter(name) => write!(f, "no parameter named `{name}`"),
            Diagnostic::TooManyArguments { annotation, index } => {
                write!(f, "too many arguments for `{annotation}` (argument #{index})")
            }
            Diagnostic::ArgumentPassedTwice(name) => {
                write!(f, "argument `{name}` is passed more than once")
            }
            Diagnostic::RecursiveImplicitType(name) => {
                write!(f, "type of `{name}` cannot be inferred: recursive dependency")
            }
            Diagnostic::RecursiveTypeAlias(name) => {
                write!(f, "type alias `{name}` expands to itself")
            }
            Diagnostic::CannotInferType(name) => write!(f, "cannot infer a type for `{name}`"),
            Diagnostic::UnresolvedImport(path) => write!(f, "unresolved import `{path}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Unresolved,
    Resolved(NodeId),
    Error(Diagnostic),
}

impl Reference {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Reference::Unresolved)
    }

    pub fn target(&self) -> Option<NodeId> {
        match self {
            Reference::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub name: Symbol,
    pub reference: Reference,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Symbol,
    pub reference: Reference,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Access(Access),
    Call(Call),
}

impl Expression {
    pub fn int(value: i64) -> Expression {
        Expression::Literal(Literal::Int(value))
    }

    pub fn string(value: &str) -> Expression {
        Expression::Literal(Literal::String(value.to_string()))
    }

    pub fn boolean(value: bool) -> Expression {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn access(name: &str) -> Expression {
        Expression::Access(Access {
            name: Symbol::new(name),
            reference: Reference::Unresolved,
        })
    }

    pub fn call(callee: &str, arguments: Vec<Expression>) -> Expression {
        Expression::Call(Call {
            callee: Symbol::new(callee),
            reference: Reference::Unresolved,
            arguments,
        })
    }

    /// True when no reference anywhere in the expression is still unresolved.
    pub fn is_resolved(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Access(access) => access.reference.is_resolved(),
            Expression::Call(call) => {
                call.reference.is_resolved() && call.arguments.iter().all(Expression::is_resolved)
            }
        }
    }

    pub fn diagnostics(&self, out: &mut Vec<Diagnostic>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Access(access) => {
                if let Reference::Error(diagnostic) = &access.reference {
                    out.push(diagnostic.clone());
                }
            }
            Expression::Call(call) => {
                if let Reference::Error(diagnostic) = &call.reference {
                    out.push(diagnostic.clone());
                }
                for argument in &call.arguments {
                    argument.diagnostics(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Literal::Int(value)) => write!(f, "{value}"),
            Expression::Literal(Literal::String(value)) => write!(f, "{value:?}"),
            Expression::Literal(Literal::Boolean(value)) => write!(f, "{value}"),
            Expression::Literal(Literal::Null) => f.write_str("null"),
            Expression::Access(access) => match &access.reference {
                Reference::Unresolved => write!(f, "{}?", access.name),
                Reference::Resolved(id) => write!(f, "{}@{}", access.name, id.index()),
                Reference::Error(_) => write!(f, "{}!", access.name),
            },
            Expression::Call(call) => {
                write!(f, "{}(", call.callee)?;
                for (index, argument) in call.arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<Symbol>,
    pub value: Expression,
}

impl Argument {
    pub fn positional(value: Expression) -> Argument {
        Argument { name: None, value }
    }

    pub fn named(name: &str, value: Expression) -> Argument {
        Argument {
            name: Some(Symbol::new(name)),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentList {
    Empty,
    Raw(Vec<Argument>),
    Resolved(Vec<Argument>),
}

impl ArgumentList {
    pub fn from_source(arguments: &[Argument]) -> ArgumentList {
        if arguments.is_empty() {
            ArgumentList::Empty
        } else {
            ArgumentList::Raw(arguments.to_vec())
        }
    }

    pub fn arguments(&self) -> &[Argument] {
        match self {
            ArgumentList::Empty => &[],
            ArgumentList::Raw(arguments) | ArgumentList::Resolved(arguments) => arguments,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ArgumentList::Empty | ArgumentList::Resolved(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentMapping {
    Unresolved,
    Resolved {
        mapping: IndexMap<Symbol, Expression>,
        unmatched: Vec<Diagnostic>,
    },
}

impl ArgumentMapping {
    pub fn get(&self, parameter: &str) -> Option<&Expression> {
        match self {
            ArgumentMapping::Unresolved => None,
            ArgumentMapping::Resolved { mapping, .. } => mapping.get(&Symbol::new(parameter)),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ArgumentMapping::Resolved { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Int,
    String,
    Boolean,
    Unit,
    Any,
    Nothing,
}

impl BuiltinType {
    pub fn from_name(name: &str) -> Option<BuiltinType> {
        let builtin = match name {
            "Int" => BuiltinType::Int,
            "String" => BuiltinType::String,
            "Boolean" => BuiltinType::Boolean,
            "Unit" => BuiltinType::Unit,
            "Any" => BuiltinType::Any,
            "Nothing" => BuiltinType::Nothing,
            _ => return None,
        };
        Some(builtin)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConeType {
    Builtin(BuiltinType),
    Class {
        class: NodeId,
        arguments: Vec<ConeType>,
        nullable: bool,
    },
    TypeParameter {
        parameter: NodeId,
        nullable: bool,
    },
    Error(Diagnostic),
}

impl ConeType {
    pub fn is_error(&self) -> bool {
        matches!(self, ConeType::Error(_))
    }
}

impl fmt::Display for ConeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConeType::Builtin(builtin) => write!(f, "{builtin:?}"),
            ConeType::Class {
                class,
                arguments,
                nullable,
            } => {
                write!(f, "class@{}", class.index())?;
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    for (index, argument) in arguments.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{argument}")?;
                    }
                    f.write_str(">")?;
                }
                if *nullable {
                    f.write_str("?")?;
                }
                Ok(())
            }
            ConeType::TypeParameter {
                parameter,
                nullable,
            } => write!(
                f,
                "T@{}{}",
                parameter.index(),
                if *nullable { "?" } else { "" }
            ),
            ConeType::Error(diagnostic) => write!(f, "<error: {diagnostic}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRefState {
    Unresolved,
    Implicit,
    Resolved(ConeType),
}

impl TypeRefState {
    pub fn resolved(&self) -> Option<&ConeType> {
        match self {
            TypeRefState::Resolved(ty) => Some(ty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportResolution {
    Unresolved,
    Declaration(NodeId),
    Package(Symbol),
    Error(Diagnostic),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStatus {
    pub visibility: Visibility,
    pub modality: Modality,
    pub effective_visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileFields {
    pub imports: Vec<ImportResolution>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeclarationFields {
    pub status: Option<ResolvedStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRefFields {
    pub ty: TypeRefState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationCallFields {
    pub callee: Reference,
    pub argument_list: ArgumentList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationFields {
    pub argument_mapping: ArgumentMapping,
    pub type_arguments: Vec<TypeRefState>,
    /// Present for annotations written in source; absent for already resolved ones.
    pub call: Option<AnnotationCallFields>,
}

impl AnnotationFields {
    pub fn is_resolved(&self) -> bool {
        let call_resolved = self
            .call
            .as_ref()
            .is_none_or(|call| call.callee.is_resolved() && call.argument_list.is_resolved());
        call_resolved
            && self.argument_mapping.is_resolved()
            && self
                .type_arguments
                .iter()
                .all(|ty| !matches!(ty, TypeRefState::Unresolved))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementFields {
    pub expression: Expression,
    pub ty: Option<ConeType>,
}

/// Mutable semantic state of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeFields {
    None,
    File(FileFields),
    Declaration(DeclarationFields),
    TypeRef(TypeRefFields),
    Annotation(AnnotationFields),
    Statement(StatementFields),
}

/// A typed view into [`NodeFields`] that the state keeper can capture.
pub trait NodeEntity: Sized + Send + 'static {
    fn project(fields: &NodeFields) -> Option<&Self>;
    fn project_mut(fields: &mut NodeFields) -> Option<&mut Self>;
}

macro_rules! impl_node_entity {
    ($($variant:ident($ty:ty),)*) => {
        $(
        impl NodeEntity for $ty {
            fn project(fields: &NodeFields) -> Option<&Self> {
                match fields {
                    NodeFields::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn project_mut(fields: &mut NodeFields) -> Option<&mut Self> {
                match fields {
                    NodeFields::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
        )*
    }
}

impl_node_entity! {
    File(FileFields),
    Declaration(DeclarationFields),
    TypeRef(TypeRefFields),
    Annotation(AnnotationFields),
    Statement(StatementFields),
}
