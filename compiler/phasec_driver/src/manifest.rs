use crate::error::{DriverError, DriverResult};
use phasec_resolve::SessionConfig;
use phasec_span::Symbol;
use phasec_tree::{
    NodeId, ResolvePhase, Tree, TreeBuilder,
    fields::{Argument, Expression},
    node::{ClassKind, Modality, Modifiers, StatementKind, Visibility},
};
use serde::Deserialize;
use std::path::Path;

fn invalid(message: impl Into<String>) -> DriverError {
    DriverError::Invalid(message.into())
}

/// A declaration tree written as TOML.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default, rename = "file")]
    pub files: Vec<FileSpec>,
}

impl Manifest {
    pub fn parse(path: &Path) -> DriverResult<Manifest> {
        let content = std::fs::read_to_string(path).map_err(|source| DriverError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Manifest::from_toml(&content).map_err(|source| DriverError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Manifest, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn build(&self) -> DriverResult<Tree> {
        let mut builder = TreeBuilder::new();
        for file in &self.files {
            file.build(&mut builder)?;
        }
        Ok(builder.finish())
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub name: String,
    #[serde(default)]
    pub package: String,
    /// `pkg.Name`, `pkg.Name as Alias` or `pkg.*`.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
    #[serde(default, rename = "declaration")]
    pub declarations: Vec<DeclarationSpec>,
}

impl FileSpec {
    fn build(&self, builder: &mut TreeBuilder) -> DriverResult<NodeId> {
        let file = builder.file(&self.name, &self.package);
        for import in &self.imports {
            let import = import.trim();
            if let Some(package) = import.strip_suffix(".*") {
                builder.import_all(file, package);
            } else if let Some((path, alias)) = import.split_once(" as ") {
                builder.import_alias(file, path.trim(), alias.trim());
            } else if import.is_empty() {
                return Err(invalid(format!("empty import in `{}`", self.name)));
            } else {
                builder.import(file, import);
            }
        }
        for annotation in &self.annotations {
            annotation.build(builder, file)?;
        }
        for declaration in &self.declarations {
            declaration.build(builder, file, Container::File)?;
        }
        Ok(file)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationKind {
    Class,
    Interface,
    Object,
    AnnotationClass,
    Function,
    Property,
    TypeAlias,
    Init,
    Modifiers,
    Script,
    Fragment,
}

impl DeclarationKind {
    fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Class => "class",
            DeclarationKind::Interface => "interface",
            DeclarationKind::Object => "object",
            DeclarationKind::AnnotationClass => "annotation-class",
            DeclarationKind::Function => "function",
            DeclarationKind::Property => "property",
            DeclarationKind::TypeAlias => "type-alias",
            DeclarationKind::Init => "init",
            DeclarationKind::Modifiers => "modifiers",
            DeclarationKind::Script => "script",
            DeclarationKind::Fragment => "fragment",
        }
    }

    fn class_kind(self) -> Option<ClassKind> {
        match self {
            DeclarationKind::Class => Some(ClassKind::Class),
            DeclarationKind::Interface => Some(ClassKind::Interface),
            DeclarationKind::Object => Some(ClassKind::Object),
            DeclarationKind::AnnotationClass => Some(ClassKind::Annotation),
            _ => None,
        }
    }

    fn has_body(self) -> bool {
        matches!(
            self,
            DeclarationKind::Function | DeclarationKind::Init | DeclarationKind::Script | DeclarationKind::Fragment
        )
    }

    fn has_modifiers(self) -> bool {
        self.class_kind().is_some()
            || matches!(
                self,
                DeclarationKind::Function | DeclarationKind::Property | DeclarationKind::TypeAlias
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    File,
    Script,
    Class,
}

impl Container {
    fn allows(self, kind: DeclarationKind) -> bool {
        match kind {
            DeclarationKind::Init => self == Container::Class,
            DeclarationKind::Script | DeclarationKind::Fragment => self == Container::File,
            _ => true,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum VisibilitySpec {
    Private,
    Protected,
    Internal,
    Public,
}

impl From<VisibilitySpec> for Visibility {
    fn from(visibility: VisibilitySpec) -> Self {
        match visibility {
            VisibilitySpec::Private => Visibility::Private,
            VisibilitySpec::Protected => Visibility::Protected,
            VisibilitySpec::Internal => Visibility::Internal,
            VisibilitySpec::Public => Visibility::Public,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ModalitySpec {
    Final,
    Open,
    Abstract,
}

impl From<ModalitySpec> for Modality {
    fn from(modality: ModalitySpec) -> Self {
        match modality {
            ModalitySpec::Final => Modality::Final,
            ModalitySpec::Open => Modality::Open,
            ModalitySpec::Abstract => Modality::Abstract,
        }
    }
}

/// One declaration. Which fields apply depends on `kind`; fields that do not
/// apply are rejected.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeclarationSpec {
    pub kind: DeclarationKind,
    pub name: Option<String>,
    /// Property type, function return type or alias expansion. Omitted for an
    /// implicit type.
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub visibility: Option<VisibilitySpec>,
    pub modality: Option<ModalitySpec>,
    #[serde(default)]
    pub var: bool,
    #[serde(default)]
    pub type_parameters: Vec<TypeParameterSpec>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub super_types: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
    pub initializer: Option<ExpressionSpec>,
    #[serde(default)]
    pub body: Vec<StatementSpec>,
    #[serde(default, rename = "declaration")]
    pub declarations: Vec<DeclarationSpec>,
    /// Phase the declaration is already resolved to, as for library code.
    pub resolved: Option<String>,
}

impl DeclarationSpec {
    fn name(&self) -> DriverResult<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| invalid(format!("{} without a name", self.kind.as_str())))
    }

    fn reject(&self, present: bool, field: &str) -> DriverResult<()> {
        if present {
            return Err(invalid(format!(
                "`{field}` does not apply to {} {}",
                self.kind.as_str(),
                self.name.as_deref().unwrap_or("<anonymous>")
            )));
        }
        Ok(())
    }

    fn validate(&self, container: Container) -> DriverResult<()> {
        let kind = self.kind;
        if !container.allows(kind) {
            return Err(invalid(format!(
                "{} cannot be declared inside a {container:?}",
                kind.as_str()
            )));
        }
        let is_class = kind.class_kind().is_some();
        self.reject(
            !self.body.is_empty() && !kind.has_body(),
            "body",
        )?;
        self.reject(
            (self.visibility.is_some() || self.modality.is_some()) && !kind.has_modifiers(),
            "visibility/modality",
        )?;
        self.reject(
            self.ty.is_some()
                && !matches!(
                    kind,
                    DeclarationKind::Function | DeclarationKind::Property | DeclarationKind::TypeAlias
                ),
            "type",
        )?;
        self.reject(self.var && kind != DeclarationKind::Property, "var")?;
        self.reject(self.initializer.is_some() && kind != DeclarationKind::Property, "initializer")?;
        self.reject(
            !self.parameters.is_empty() && !is_class && kind != DeclarationKind::Function,
            "parameters",
        )?;
        self.reject(
            !self.type_parameters.is_empty()
                && !is_class
                && !matches!(kind, DeclarationKind::Function | DeclarationKind::TypeAlias),
            "type_parameters",
        )?;
        self.reject(!self.super_types.is_empty() && !is_class, "super_types")?;
        self.reject(
            !self.declarations.is_empty() && !is_class && kind != DeclarationKind::Script,
            "declaration",
        )?;
        self.reject(!self.annotations.is_empty() && kind == DeclarationKind::Fragment, "annotations")
    }

    fn build(&self, builder: &mut TreeBuilder, owner: NodeId, container: Container) -> DriverResult<NodeId> {
        self.validate(container)?;
        let ty = self.ty.as_deref().map(TypeSyntax::parse).transpose()?;
        let declaration = match self.kind {
            DeclarationKind::Function => {
                let function = builder.function(owner, self.name()?, ty.as_ref().map(|ty| ty.name.as_str()));
                self.build_header(builder, function)?;
                function
            }
            DeclarationKind::Property => {
                let initializer = self.initializer.as_ref().map(ExpressionSpec::to_expression);
                let property = builder.property(
                    owner,
                    self.name()?,
                    ty.as_ref().map(|ty| ty.name.as_str()),
                    initializer,
                );
                if self.var {
                    builder.set_var(property);
                }
                property
            }
            DeclarationKind::TypeAlias => {
                let Some(expanded) = &ty else {
                    return Err(invalid(format!("type alias {} needs a `type`", self.name()?)));
                };
                let alias = builder.type_alias(owner, self.name()?, &expanded.name);
                self.build_header(builder, alias)?;
                alias
            }
            DeclarationKind::Init => builder.anonymous_initializer(owner),
            DeclarationKind::Modifiers => builder.dangling_modifier_list(owner),
            DeclarationKind::Script => builder.script(owner, self.name()?),
            DeclarationKind::Fragment => builder.code_fragment(owner),
            kind => {
                let class_kind = kind.class_kind().expect("bug! remaining kinds are classes");
                let class = builder.class(owner, self.name()?, class_kind);
                self.build_header(builder, class)?;
                for super_type in &self.super_types {
                    let syntax = TypeSyntax::parse(super_type)?;
                    let type_ref = builder.super_type(class, &syntax.name);
                    syntax.attach(builder, type_ref);
                }
                class
            }
        };

        if let (Some(ty), Some(type_ref)) = (&ty, builder.type_ref_of(declaration)) {
            ty.attach(builder, type_ref);
        }
        for annotation in &self.annotations {
            annotation.build(builder, declaration)?;
        }
        for statement in &self.body {
            statement.build(builder, declaration);
        }
        let nested = match self.kind {
            DeclarationKind::Script => Container::Script,
            _ => Container::Class,
        };
        for member in &self.declarations {
            member.build(builder, declaration, nested)?;
        }
        if self.kind.has_modifiers() && (self.visibility.is_some() || self.modality.is_some()) {
            builder.set_modifiers(
                declaration,
                Modifiers {
                    visibility: self.visibility.map(Visibility::from),
                    modality: self.modality.map(Modality::from),
                },
            );
        }
        if let Some(phase) = &self.resolved {
            let phase: ResolvePhase = phase.parse().map_err(|error| invalid(format!("{error}")))?;
            builder.mark_resolved(declaration, phase);
        }
        Ok(declaration)
    }

    fn build_header(&self, builder: &mut TreeBuilder, declaration: NodeId) -> DriverResult<()> {
        for type_parameter in &self.type_parameters {
            let parameter = builder.type_parameter(declaration, &type_parameter.name);
            for bound in &type_parameter.bounds {
                let syntax = TypeSyntax::parse(bound)?;
                let type_ref = builder.bound(parameter, &syntax.name);
                syntax.attach(builder, type_ref);
            }
        }
        for spec in &self.parameters {
            let syntax = TypeSyntax::parse(&spec.ty)?;
            let parameter = builder.value_parameter(declaration, &spec.name, &syntax.name);
            if let Some(type_ref) = builder.type_ref_of(parameter) {
                syntax.attach(builder, type_ref);
            }
            for annotation in &spec.annotations {
                annotation.build(builder, parameter)?;
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TypeParameterSpec {
    pub name: String,
    #[serde(default)]
    pub bounds: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AnnotationSpec {
    pub name: String,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    /// Arguments already mapped to parameters; every argument must be named.
    #[serde(default)]
    pub resolved: bool,
}

impl AnnotationSpec {
    fn build(&self, builder: &mut TreeBuilder, owner: NodeId) -> DriverResult<NodeId> {
        if !self.resolved {
            let arguments = self.arguments.iter().map(ArgumentSpec::to_argument).collect();
            let type_arguments: Vec<&str> = self.type_arguments.iter().map(String::as_str).collect();
            return Ok(builder.annotation_with_type_arguments(owner, &self.name, &type_arguments, arguments));
        }
        if !self.type_arguments.is_empty() {
            return Err(invalid(format!("resolved annotation {} cannot take type arguments", self.name)));
        }
        let mapping = self
            .arguments
            .iter()
            .map(|argument| match &argument.name {
                Some(name) => Ok((name.as_str(), argument.value.to_expression())),
                None => Err(invalid(format!("resolved annotation {} has a positional argument", self.name))),
            })
            .collect::<DriverResult<Vec<_>>>()?;
        Ok(builder.resolved_annotation(owner, &self.name, mapping))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ArgumentSpec {
    pub name: Option<String>,
    pub value: ExpressionSpec,
}

impl ArgumentSpec {
    fn to_argument(&self) -> Argument {
        match &self.name {
            Some(name) => Argument::named(name, self.value.to_expression()),
            None => Argument::positional(self.value.to_expression()),
        }
    }
}

/// `{ int = 1 }`, `{ access = "x" }`, `{ call = { callee = "f", arguments = [...] } }`
/// or `"null"`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionSpec {
    Int(i64),
    String(String),
    Boolean(bool),
    Null,
    Access(String),
    Call {
        callee: String,
        #[serde(default)]
        arguments: Vec<ExpressionSpec>,
    },
}

impl ExpressionSpec {
    pub fn to_expression(&self) -> Expression {
        match self {
            ExpressionSpec::Int(value) => Expression::int(*value),
            ExpressionSpec::String(value) => Expression::string(value),
            ExpressionSpec::Boolean(value) => Expression::boolean(*value),
            ExpressionSpec::Null => Expression::Literal(phasec_tree::fields::Literal::Null),
            ExpressionSpec::Access(name) => Expression::access(name),
            ExpressionSpec::Call { callee, arguments } => {
                Expression::call(callee, arguments.iter().map(ExpressionSpec::to_expression).collect())
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StatementSpec {
    Expression(ExpressionSpec),
    Return(ExpressionSpec),
    Let { name: String, value: ExpressionSpec },
}

impl StatementSpec {
    fn build(&self, builder: &mut TreeBuilder, owner: NodeId) -> NodeId {
        match self {
            StatementSpec::Expression(expression) => {
                builder.statement(owner, StatementKind::Expression, expression.to_expression())
            }
            StatementSpec::Return(expression) => {
                builder.statement(owner, StatementKind::Return, expression.to_expression())
            }
            StatementSpec::Let { name, value } => builder.statement(
                owner,
                StatementKind::LocalVariable {
                    name: Symbol::new(name),
                },
                value.to_expression(),
            ),
        }
    }
}

/// `Name`, `Name?` or `Name<Argument, ...>`.
#[derive(Debug, Clone, PartialEq)]
struct TypeSyntax {
    name: String,
    nullable: bool,
    arguments: Vec<TypeSyntax>,
}

impl TypeSyntax {
    fn parse(text: &str) -> DriverResult<TypeSyntax> {
        let mut parser = TypeParser { text, position: 0 };
        let syntax = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.position != text.len() {
            return Err(parser.error());
        }
        Ok(syntax)
    }

    fn attach(&self, builder: &mut TreeBuilder, type_ref: NodeId) {
        if self.nullable {
            builder.set_nullable(type_ref, true);
        }
        for argument in &self.arguments {
            let nested = builder.type_argument(type_ref, &argument.name);
            argument.attach(builder, nested);
        }
    }
}

struct TypeParser<'a> {
    text: &'a str,
    position: usize,
}

impl TypeParser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += expected.len_utf8();
            return true;
        }
        false
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.position += c.len_utf8();
        }
    }

    fn error(&self) -> DriverError {
        invalid(format!("malformed type `{}` at offset {}", self.text, self.position))
    }

    fn parse_type(&mut self) -> DriverResult<TypeSyntax> {
        self.skip_whitespace();
        let start = self.position;
        while let Some(c) = self.peek().filter(|&c| c.is_alphanumeric() || c == '_' || c == '.') {
            self.position += c.len_utf8();
        }
        if start == self.position {
            return Err(self.error());
        }
        let name = self.text[start..self.position].to_string();

        let mut arguments = Vec::new();
        self.skip_whitespace();
        if self.eat('<') {
            loop {
                arguments.push(self.parse_type()?);
                self.skip_whitespace();
                if self.eat(',') {
                    continue;
                }
                if self.eat('>') {
                    break;
                }
                return Err(self.error());
            }
            self.skip_whitespace();
        }
        let nullable = self.eat('?');
        Ok(TypeSyntax {
            name,
            nullable,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasec_tree::node::NodeKind;

    const MANIFEST: &str = r#"
[session]
verify = true

[[file]]
name = "lib.kt"
package = "lib"

[[file.declaration]]
kind = "annotation-class"
name = "Tag"
parameters = [{ name = "value", type = "String" }]

[[file]]
name = "main.kt"
package = "app"
imports = ["lib.Tag", "lib.*", "lib.Tag as Label"]

[[file.declaration]]
kind = "class"
name = "Box"
visibility = "internal"
type_parameters = [{ name = "T", bounds = ["Any"] }]
parameters = [{ name = "item", type = "T?" }]
super_types = ["Holder<T>"]
annotations = [{ name = "Tag", arguments = [{ name = "value", value = { string = "box" } }] }]

[[file.declaration.declaration]]
kind = "function"
name = "get"
body = [
    { let = { name = "x", value = { access = "item" } } },
    { return = { access = "x" } },
]

[[file.declaration]]
kind = "property"
name = "answer"
initializer = { call = { callee = "compute", arguments = [{ int = 42 }, "null"] } }
"#;

    #[test]
    fn test_parse_and_build() {
        let manifest = Manifest::from_toml(MANIFEST).unwrap();
        assert!(manifest.session.verify);
        assert_eq!(manifest.files.len(), 2);

        let tree = manifest.build().unwrap();
        let class = tree.find("app.Box").unwrap();
        let NodeKind::Class(syntax) = &tree.node(class).kind else {
            panic!("expected a class");
        };
        assert_eq!(syntax.type_parameters.len(), 1);
        assert_eq!(syntax.value_parameters.len(), 1);
        assert_eq!(syntax.super_types.len(), 1);
        assert_eq!(syntax.annotations.len(), 1);
        assert_eq!(syntax.modifiers.visibility, Some(Visibility::Internal));

        let super_type = syntax.super_types[0];
        let NodeKind::TypeRef(super_type) = &tree.node(super_type).kind else {
            panic!("expected a type reference");
        };
        assert_eq!(super_type.arguments.len(), 1);

        let parameter = syntax.value_parameters[0];
        let item_type = tree.node(parameter).kind.return_type().unwrap();
        let NodeKind::TypeRef(item_type) = &tree.node(item_type).kind else {
            panic!("expected a type reference");
        };
        assert!(item_type.nullable);

        let function = tree.find("app.Box.get").unwrap();
        let NodeKind::Function(function) = &tree.node(function).kind else {
            panic!("expected a function");
        };
        let body = function.body.unwrap();
        assert_eq!(tree.children(body).len(), 2);
        assert!(tree.find("app.answer").is_some());
    }

    #[test]
    fn test_expression_forms() {
        #[derive(Deserialize)]
        struct Body {
            body: Vec<StatementSpec>,
        }

        let Body { body } = toml::from_str(
            r#"body = [
                { return = "null" },
                { expression = { call = { callee = "f" } } },
                { let = { name = "b", value = { boolean = true } } },
            ]"#,
        )
        .unwrap();
        assert_eq!(
            body,
            vec![
                StatementSpec::Return(ExpressionSpec::Null),
                StatementSpec::Expression(ExpressionSpec::Call {
                    callee: "f".to_string(),
                    arguments: vec![],
                }),
                StatementSpec::Let {
                    name: "b".to_string(),
                    value: ExpressionSpec::Boolean(true),
                },
            ]
        );
        assert_eq!(
            ExpressionSpec::Call {
                callee: "f".to_string(),
                arguments: vec![ExpressionSpec::Int(1)],
            }
            .to_expression(),
            Expression::call("f", vec![Expression::int(1)])
        );
    }

    #[test]
    fn test_type_syntax() {
        let syntax = TypeSyntax::parse("Map<String, List<Int?>>?").unwrap();
        assert_eq!(syntax.name, "Map");
        assert!(syntax.nullable);
        assert_eq!(syntax.arguments.len(), 2);
        assert!(syntax.arguments[1].arguments[0].nullable);

        assert!(TypeSyntax::parse("").is_err());
        assert!(TypeSyntax::parse("List<Int").is_err());
        assert!(TypeSyntax::parse("Int Int").is_err());
    }

    #[test]
    fn test_misplaced_declarations_are_rejected() {
        let manifest = Manifest::from_toml(
            r#"
[[file]]
name = "main.kt"

[[file.declaration]]
kind = "init"
"#,
        )
        .unwrap();
        assert!(matches!(manifest.build(), Err(DriverError::Invalid(_))));

        let manifest = Manifest::from_toml(
            r#"
[[file]]
name = "main.kt"

[[file.declaration]]
kind = "property"
name = "p"
body = [{ return = { int = 1 } }]
"#,
        )
        .unwrap();
        assert!(matches!(manifest.build(), Err(DriverError::Invalid(_))));
    }

    #[test]
    fn test_resolved_marker() {
        let manifest = Manifest::from_toml(
            r#"
[[file]]
name = "lib.kt"
package = "lib"

[[file.declaration]]
kind = "class"
name = "Done"
resolved = "body-resolve"
"#,
        )
        .unwrap();
        let tree = manifest.build().unwrap();
        let class = tree.find("lib.Done").unwrap();
        assert_eq!(tree.phase(class), ResolvePhase::BodyResolve);
    }
}
