//! Entity shapes: the field-level description of a domain type.
//!
//! A shape is an ordered list of fields. Stored fields are backed by a value
//! on each [`Entity`]; computed fields carry a closure that derives their
//! value from the instance every time the entity is shaped.
//!
//! ```rust
//! use apiforge_core::{EntityShape, SequentialId, TypeExpr};
//! use serde_json::{json, Value};
//!
//! let shape = EntityShape::new("User")
//!     .stored("name", TypeExpr::string())
//!     .id_field("id")
//!     .computed("greeting", TypeExpr::string(), |user| {
//!         Value::String(format!("hi {}", user.get_str("name").unwrap_or_default()))
//!     });
//!
//! let values = json!({ "name": "Ada" }).as_object().cloned().unwrap();
//! let user = shape.instantiate(values, &SequentialId::default()).unwrap();
//! assert_eq!(user.get_str("id"), Some("1"));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::error::SchemaError;
use crate::id::IdGenerator;
use crate::types::TypeExpr;

/// Derives a computed field's value from its owning instance.
pub type ComputeFn = Arc<dyn Fn(&Entity) -> Value + Send + Sync>;

/// Whether a field is backed by a stored value or derived on read.
#[derive(Clone)]
pub enum FieldKind {
    Stored,
    Computed(ComputeFn),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Stored => f.write_str("Stored"),
            FieldKind::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// One named field of an [`EntityShape`].
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    ty: TypeExpr,
    kind: FieldKind,
}

impl FieldDef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &TypeExpr {
        &self.ty
    }

    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self.kind, FieldKind::Computed(_))
    }

    /// Produce this field's output value for `entity`.
    ///
    /// Stored fields read the instance's value (null if unset); computed
    /// fields invoke their closure with the instance.
    #[must_use]
    pub fn resolve(&self, entity: &Entity) -> Value {
        match &self.kind {
            FieldKind::Stored => entity.get(&self.name).cloned().unwrap_or(Value::Null),
            FieldKind::Computed(compute) => compute(entity),
        }
    }
}

/// The description of one domain type.
///
/// Builder methods never fail; a repeated field name is remembered and
/// reported by [`EntityShape::validate`], which the registry calls on
/// registration.
#[derive(Debug, Clone)]
pub struct EntityShape {
    name: String,
    fields: Vec<FieldDef>,
    id_field: Option<String>,
    duplicate: Option<String>,
}

impl EntityShape {
    /// Start an empty shape.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            id_field: None,
            duplicate: None,
        }
    }

    /// Add a stored field.
    #[must_use]
    pub fn stored(self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.push(FieldDef {
            name: name.into(),
            ty,
            kind: FieldKind::Stored,
        })
    }

    /// Add the stored `ID!` field that is populated by the id generator on
    /// instantiation.
    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.id_field.is_none() {
            self.id_field = Some(name.clone());
        }
        self.stored(name, TypeExpr::id())
    }

    /// Add a computed field, recomputed by `compute` on every access.
    #[must_use]
    pub fn computed<F>(self, name: impl Into<String>, ty: TypeExpr, compute: F) -> Self
    where
        F: Fn(&Entity) -> Value + Send + Sync + 'static,
    {
        self.push(FieldDef {
            name: name.into(),
            ty,
            kind: FieldKind::Computed(Arc::new(compute)),
        })
    }

    fn push(mut self, field: FieldDef) -> Self {
        if self.duplicate.is_none() && self.field(&field.name).is_some() {
            self.duplicate = Some(field.name.clone());
        }
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The name of the id field, if the shape has one.
    #[must_use]
    pub fn id_field_name(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    /// Check the shape's own invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] if a field name was declared
    /// more than once.
    pub fn validate(&self) -> Result<(), SchemaError> {
        match &self.duplicate {
            Some(field) => Err(SchemaError::DuplicateField {
                shape: self.name.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Create an instance from stored field values.
    ///
    /// The id field is filled from `ids` unless `values` already carries it
    /// (rehydrating a persisted instance). Missing optional fields become
    /// null.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::ComputedFieldAssignment`] if a value targets a
    ///   computed field.
    /// - [`SchemaError::UnknownField`] if a value targets an undeclared field.
    /// - [`SchemaError::MissingField`] if a required stored field is absent.
    pub fn instantiate(
        &self,
        mut values: Map<String, Value>,
        ids: &dyn IdGenerator,
    ) -> Result<Entity, SchemaError> {
        for key in values.keys() {
            match self.field(key) {
                Some(field) if field.is_computed() => {
                    return Err(SchemaError::ComputedFieldAssignment {
                        shape: self.name.clone(),
                        field: key.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    return Err(SchemaError::UnknownField {
                        shape: self.name.clone(),
                        field: key.clone(),
                    });
                }
            }
        }

        let mut stored = Map::new();
        let mut seen = HashSet::new();
        for field in self.fields.iter().filter(|f| !f.is_computed()) {
            if !seen.insert(field.name.as_str()) {
                continue;
            }
            let value = match values.remove(&field.name) {
                Some(value) => value,
                None if self.id_field.as_deref() == Some(field.name.as_str()) => {
                    Value::String(ids.generate())
                }
                None if field.ty.is_optional() => Value::Null,
                None => {
                    return Err(SchemaError::MissingField {
                        shape: self.name.clone(),
                        field: field.name.clone(),
                    });
                }
            };
            stored.insert(field.name.clone(), value);
        }

        Ok(Entity::from_parts(self.name.clone(), stored))
    }
}
