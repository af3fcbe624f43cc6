//! Entity instances and handler results.
//!
//! An [`Entity`] owns the stored field values of one instance of an
//! [`EntityShape`](crate::EntityShape). Computed fields are never stored on
//! the instance; they are derived at shaping time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An instance of a registered entity shape.
///
/// Instances are created through
/// [`EntityShape::instantiate`](crate::EntityShape::instantiate), which
/// validates the stored values and assigns the id field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Name of the shape this instance conforms to.
    shape: String,
    /// Stored field values keyed by field name.
    fields: Map<String, Value>,
}

impl Entity {
    pub(crate) fn from_parts(shape: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            shape: shape.into(),
            fields,
        }
    }

    /// The name of the shape this instance conforms to.
    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// Returns a stored field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a stored field value as a string slice, if it is a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Replace the value of an existing stored field.
    ///
    /// Returns `false` (and leaves the instance untouched) if the field is
    /// not stored on this instance.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        match self.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// All stored field values.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// The raw value a handler or transform produces, before shaping.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Absent result (e.g. a lookup that found nothing).
    Null,
    Entity(Entity),
    List(Vec<Resolved>),
    /// A scalar (or pre-rendered JSON) value.
    Value(Value),
}

impl Resolved {
    /// Returns the contained entity, if any.
    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Resolved::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Short description used in shaping errors.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Resolved::Null => "null",
            Resolved::Entity(_) => "entity",
            Resolved::List(_) => "list",
            Resolved::Value(_) => "value",
        }
    }
}

impl From<Entity> for Resolved {
    fn from(entity: Entity) -> Self {
        Resolved::Entity(entity)
    }
}

impl From<Option<Entity>> for Resolved {
    fn from(entity: Option<Entity>) -> Self {
        entity.map_or(Resolved::Null, Resolved::Entity)
    }
}

impl From<Vec<Entity>> for Resolved {
    fn from(entities: Vec<Entity>) -> Self {
        Resolved::List(entities.into_iter().map(Resolved::Entity).collect())
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Resolved::Null,
            other => Resolved::Value(other),
        }
    }
}
