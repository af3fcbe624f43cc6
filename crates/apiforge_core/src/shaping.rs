//! Shaping: rendering a [`Resolved`] value field-by-field according to its
//! declared type.
//!
//! Stored fields pass through the instance's value; computed fields are
//! recomputed by invoking the shape's closure with the instance. A null
//! result is returned as JSON null without consulting the type. Scalar
//! values are checked with the same rules as scalar arguments, and a plain
//! JSON array stands for a list of its elements.

use serde_json::{Map, Value};

use crate::coerce;
use crate::entity::{Entity, Resolved};
use crate::error::ShapeError;
use crate::registry::Schema;
use crate::types::TypeExpr;

/// Shape `resolved` against `ty`.
///
/// # Errors
///
/// Returns [`ShapeError`] if the value's structure does not match `ty` or
/// names an unknown shape.
pub fn shape(schema: &Schema, ty: &TypeExpr, resolved: Resolved) -> Result<Value, ShapeError> {
    match (ty, resolved) {
        (_, Resolved::Null) => Ok(Value::Null),
        (TypeExpr::Optional(inner), resolved) => shape(schema, inner, resolved),
        (TypeExpr::List(inner), Resolved::List(items)) => items
            .into_iter()
            .map(|item| shape(schema, inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (TypeExpr::List(inner), Resolved::Value(Value::Array(items))) => items
            .into_iter()
            .map(|item| shape(schema, inner, Resolved::from(item)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (TypeExpr::Entity(name), Resolved::Entity(entity)) => shape_entity(schema, name, &entity),
        (TypeExpr::Scalar(scalar), Resolved::Value(value)) => {
            let found = coerce::describe(&value);
            coerce::coerce_scalar(value, *scalar).map_err(|_| ShapeError::Mismatch {
                expected: ty.to_string(),
                found: found.to_string(),
            })
        }
        (ty, other) => Err(ShapeError::Mismatch {
            expected: ty.to_string(),
            found: other.kind_name().to_string(),
        }),
    }
}

/// Render one entity as a JSON object in its shape's field order.
///
/// # Errors
///
/// Returns [`ShapeError::UnknownShape`] if `name` is not registered, or
/// [`ShapeError::Mismatch`] if the entity belongs to a different shape.
pub fn shape_entity(schema: &Schema, name: &str, entity: &Entity) -> Result<Value, ShapeError> {
    let shape = schema
        .shape(name)
        .ok_or_else(|| ShapeError::UnknownShape(name.to_string()))?;

    if entity.shape() != name {
        return Err(ShapeError::Mismatch {
            expected: name.to_string(),
            found: entity.shape().to_string(),
        });
    }

    let mut out = Map::new();
    for field in shape.fields() {
        out.insert(field.name().to_string(), field.resolve(entity));
    }
    Ok(Value::Object(out))
}
