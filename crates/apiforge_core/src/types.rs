//! Declared types for operation arguments, return values and entity fields.
//!
//! A [`TypeExpr`] is non-null unless wrapped in [`TypeExpr::Optional`]. The
//! [`Display`](std::fmt::Display) form uses the familiar GraphQL notation
//! (`String!`, `[User!]!`, `User`) so exported schemas read naturally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scalar {
    String,
    Int,
    Float,
    Boolean,
    /// Opaque identifier, always rendered as a string.
    Id,
}

impl Scalar {
    /// The scalar's name as it appears in exported schemas.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Scalar::String => "String",
            Scalar::Int => "Int",
            Scalar::Float => "Float",
            Scalar::Boolean => "Boolean",
            Scalar::Id => "ID",
        }
    }
}

/// A type expression referencing scalars, entity shapes, lists and
/// optionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    Scalar(Scalar),
    /// Reference to a registered entity shape by name.
    Entity(String),
    List(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
}

impl TypeExpr {
    #[must_use]
    pub const fn string() -> Self {
        TypeExpr::Scalar(Scalar::String)
    }

    #[must_use]
    pub const fn int() -> Self {
        TypeExpr::Scalar(Scalar::Int)
    }

    #[must_use]
    pub const fn float() -> Self {
        TypeExpr::Scalar(Scalar::Float)
    }

    #[must_use]
    pub const fn boolean() -> Self {
        TypeExpr::Scalar(Scalar::Boolean)
    }

    #[must_use]
    pub const fn id() -> Self {
        TypeExpr::Scalar(Scalar::Id)
    }

    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        TypeExpr::Entity(name.into())
    }

    #[must_use]
    pub fn list(inner: TypeExpr) -> Self {
        TypeExpr::List(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::Optional(Box::new(inner))
    }

    /// Returns `true` if a null value satisfies this type.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, TypeExpr::Optional(_))
    }

    /// The entity shape this type ultimately refers to, looking through
    /// lists and optionality.
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Scalar(_) => None,
            TypeExpr::Entity(name) => Some(name),
            TypeExpr::List(inner) | TypeExpr::Optional(inner) => inner.entity_name(),
        }
    }

    fn fmt_base(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Scalar(s) => f.write_str(s.name()),
            TypeExpr::Entity(name) => f.write_str(name),
            TypeExpr::List(inner) => write!(f, "[{inner}]"),
            TypeExpr::Optional(inner) => inner.fmt_base(f),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Optional(inner) => inner.fmt_base(f),
            other => {
                other.fmt_base(f)?;
                f.write_str("!")
            }
        }
    }
}
