//! mcdoc abstract syntax tree
//!
//! Plain data produced by the parser and consumed by the resolver. Every node
//! carries the byte span of the source text it was parsed from. The parser
//! records paths and references verbatim; nothing here is resolved.

use mcdoc_diagnostics::Span;
use std::fmt;

/// One parsed `.mcdoc` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Canonical module path, e.g. `java::data::worldgen::biome`.
    pub path: String,
    pub items: Vec<Item>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub attributes: Vec<Attribute>,
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Use(UseItem),
    TypeAlias(TypeAlias),
    Struct(StructDef),
    Enum(EnumDef),
    Dispatch(DispatchItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    pub path: ModulePath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub attributes: Vec<Attribute>,
    pub kind: FieldKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// `name?: Type`
    Named {
        name: Ident,
        optional: bool,
        ty: TypeExpr,
    },
    /// `[KeyType]: ValueType` — matches every remaining key of the object.
    Computed { key: TypeExpr, value: TypeExpr },
    /// `...Type` — inlines the fields of another struct.
    Spread { ty: TypeExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub base: Primitive,
    pub base_span: Span,
    pub name: Ident,
    pub entries: Vec<EnumEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumEntry {
    pub attributes: Vec<Attribute>,
    pub name: Ident,
    pub value: Literal,
    pub span: Span,
}

/// `dispatch ns:res/path[k1, k2] to <target>`
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchItem {
    pub namespace: Ident,
    pub resource: Vec<Ident>,
    pub keys: Vec<DispatchKey>,
    pub params: Vec<Ident>,
    pub target: DispatchTarget,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchKey {
    /// A concrete key, possibly slash-separated (`worldgen/biome`).
    Name { name: String, span: Span },
    /// `%fallback` / `%unknown` / `%none` — all select the fallback slot.
    Fallback { span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTarget {
    /// `to struct Name { … }` — defines the struct and dispatches to it.
    Struct(StructDef),
    Type(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Primitive {
        prim: Primitive,
        span: Span,
    },
    Literal {
        value: Literal,
        span: Span,
    },
    /// Reference by bare identifier; resolution order is decided later.
    Ident(Ident),
    /// Reference by `::`-separated path.
    Path(ModulePath),
    /// Dispatcher reference, `ns:res/path[…]` or `ns:res/path[[…]]`.
    Complex(ComplexRef),
    Array {
        elem: Box<TypeExpr>,
        len: Option<RangeExpr>,
        span: Span,
    },
    /// Anonymous `struct { … }`.
    StructLiteral {
        fields: Vec<StructField>,
        span: Span,
    },
    Union {
        members: Vec<TypeExpr>,
        span: Span,
    },
    Attributed {
        attributes: Vec<Attribute>,
        ty: Box<TypeExpr>,
    },
    /// `base @ range`.
    Constrained {
        base: Box<TypeExpr>,
        range: RangeExpr,
        span: Span,
    },
    /// `Base<Arg, …>`.
    Generic {
        base: Box<TypeExpr>,
        args: Vec<TypeExpr>,
        span: Span,
    },
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            Self::Primitive { span, .. }
            | Self::Literal { span, .. }
            | Self::Array { span, .. }
            | Self::StructLiteral { span, .. }
            | Self::Union { span, .. }
            | Self::Constrained { span, .. }
            | Self::Generic { span, .. } => *span,
            Self::Ident(ident) => ident.span,
            Self::Path(path) => path.span,
            Self::Complex(complex) => complex.span,
            Self::Attributed { ty, attributes } => attributes
                .first()
                .map(|a| a.span.cover(ty.span()))
                .unwrap_or_else(|| ty.span()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexRef {
    pub namespace: Ident,
    pub resource: Vec<Ident>,
    pub index: DispatchIndex,
    pub args: Vec<TypeExpr>,
    pub span: Span,
}

impl ComplexRef {
    /// The dispatcher resource this reference targets, e.g. `minecraft:resource`.
    pub fn resource_id(&self) -> String {
        let path: Vec<&str> = self.resource.iter().map(|i| i.name.as_str()).collect();
        format!("{}:{}", self.namespace.name, path.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchIndex {
    /// `[flat]` — selects one registered variant without runtime lookup.
    Static { key: String, span: Span },
    /// `[[…]]` — the discriminator value is read from the JSON at runtime.
    Dynamic(Accessor),
}

/// Content of a `[[…]]` index: where the runtime key comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub root: AccessorRoot,
    /// Trailing `.ident` navigation, outermost first.
    pub path: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessorRoot {
    /// `[[type]]` — value of the named sibling field.
    Field(String),
    /// `[[%key]]` — the computed-field key currently being validated.
    Key,
    /// `[[%parent]]` — walk up one JSON level before navigating.
    Parent,
    /// `[[%fallback]]` / `[[%unknown]]` / `[[%none]]`.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Int,
    Float,
    Double,
    Boolean,
    Any,
}

impl Primitive {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Double)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Any => "any",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Numeric range `a..b` with optional exclusive endpoints (`<..`, `..<`).
/// `None` endpoints are unbounded. A bare number is `min == max`, inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeExpr {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// `a::b::c`, `::a::b`, or `super::sibling` — recorded verbatim by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePath {
    pub absolute: bool,
    pub segments: Vec<PathSegment>,
    pub span: Span,
}

impl ModulePath {
    /// Final identifier segment, if the path ends in one.
    pub fn leaf(&self) -> Option<&str> {
        match self.segments.last() {
            Some(PathSegment::Ident(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "::")?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "::")?;
            }
            match seg {
                PathSegment::Super => write!(f, "super")?,
                PathSegment::Ident(name) => write!(f, "{}", name)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Super,
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Ident,
    pub value: Option<AttributeValue>,
    pub span: Span,
}

impl Attribute {
    /// String payload for `#[name="…"]`-shaped attributes.
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            Some(AttributeValue::Literal {
                value: Literal::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Literal { value: Literal, span: Span },
    /// Bare identifier value, `#[category=predicate]`.
    Word(Ident),
    Array { items: Vec<AttributeValue>, span: Span },
    /// Argument list: `#[name(a, b)]` and `#[name=(a, b)]` both land here.
    Args { items: Vec<AttributeValue>, span: Span },
    /// Nested call inside a value position, `#[a=b(c)]`.
    Call {
        name: Ident,
        args: Vec<AttributeValue>,
        span: Span,
    },
}
