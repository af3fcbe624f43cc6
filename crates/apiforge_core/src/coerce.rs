//! Argument coercion against declared argument types.
//!
//! Missing required arguments and type mismatches are rejected with
//! [`DispatchError::ArgumentType`] naming the offending argument. Unknown
//! extra arguments are dropped under [`ArgumentPolicy::Permissive`] and
//! rejected under [`ArgumentPolicy::Strict`].
//!
//! Entity-typed arguments are checked against their shape: every key must
//! name a stored field, present fields are coerced to their declared types,
//! and required fields other than the id must be present.

use serde_json::{Map, Number, Value};

use crate::args::Args;
use crate::config::ArgumentPolicy;
use crate::error::DispatchError;
use crate::operation::Operation;
use crate::registry::Schema;
use crate::types::{Scalar, TypeExpr};

/// Coerce raw request arguments for `op`.
///
/// # Errors
///
/// Returns [`DispatchError::ArgumentType`] for the first argument that is
/// missing, mistyped, or (under the strict policy) undeclared.
pub fn coerce_args(
    schema: &Schema,
    op: &Operation,
    mut raw: Map<String, Value>,
    policy: ArgumentPolicy,
) -> Result<Args, DispatchError> {
    let mut coerced = Map::new();

    for arg in op.args() {
        let value = match raw.remove(&arg.name) {
            Some(value) => value,
            None if arg.ty.is_optional() => Value::Null,
            None => {
                return Err(DispatchError::ArgumentType {
                    argument: arg.name.clone(),
                    reason: format!("missing required argument of type {}", arg.ty),
                });
            }
        };
        let value =
            coerce_value(schema, value, &arg.ty).map_err(|reason| DispatchError::ArgumentType {
                argument: arg.name.clone(),
                reason,
            })?;
        coerced.insert(arg.name.clone(), value);
    }

    if policy == ArgumentPolicy::Strict
        && let Some(extra) = raw.keys().next()
    {
        return Err(DispatchError::ArgumentType {
            argument: extra.clone(),
            reason: format!("operation '{}' declares no such argument", op.name()),
        });
    }

    Ok(Args::new(coerced))
}

/// Coerce a single value to `ty`, returning a human-readable reason on
/// mismatch.
pub fn coerce_value(schema: &Schema, value: Value, ty: &TypeExpr) -> Result<Value, String> {
    match ty {
        TypeExpr::Optional(_) if value.is_null() => Ok(Value::Null),
        TypeExpr::Optional(inner) => coerce_value(schema, value, inner),
        _ if value.is_null() => Err(format!("expected {ty}, found null")),
        TypeExpr::List(inner) => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| coerce_value(schema, item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // A lone value stands for a one-element list.
            single => coerce_value(schema, single, inner).map(|v| Value::Array(vec![v])),
        },
        TypeExpr::Entity(name) => match value {
            Value::Object(fields) => coerce_entity(schema, name, fields),
            other => Err(format!("expected {name} object, found {}", describe(&other))),
        },
        TypeExpr::Scalar(scalar) => coerce_scalar(value, *scalar),
    }
}

fn coerce_entity(
    schema: &Schema,
    name: &str,
    mut fields: Map<String, Value>,
) -> Result<Value, String> {
    let shape = schema
        .shape(name)
        .ok_or_else(|| format!("no entity shape named '{name}'"))?;

    if let Some(key) = fields.keys().find(|key| shape.field(key).is_none_or(|f| f.is_computed())) {
        return Err(match shape.field(key) {
            Some(_) => format!("field '{key}' of {name} is computed and cannot be supplied"),
            None => format!("{name} has no field '{key}'"),
        });
    }

    let mut out = Map::new();
    for field in shape.fields().iter().filter(|f| !f.is_computed()) {
        match fields.remove(field.name()) {
            Some(value) => {
                let value = coerce_value(schema, value, field.ty())
                    .map_err(|reason| format!("field '{}': {reason}", field.name()))?;
                out.insert(field.name().to_string(), value);
            }
            None if field.ty().is_optional() || shape.id_field_name() == Some(field.name()) => {}
            None => {
                return Err(format!("missing field '{}' of {name}", field.name()));
            }
        }
    }
    Ok(Value::Object(out))
}

/// Check `value` against a scalar type. Float accepts any finite number and
/// ID accepts an integer, rendered as a string.
pub(crate) fn coerce_scalar(value: Value, scalar: Scalar) -> Result<Value, String> {
    let ok = match (&value, scalar) {
        (Value::String(_), Scalar::String) => true,
        (Value::Bool(_), Scalar::Boolean) => true,
        (Value::Number(n), Scalar::Int) => n.is_i64(),
        (Value::Number(n), Scalar::Float) => {
            return n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("{n} is not a finite float"));
        }
        (Value::String(_), Scalar::Id) => true,
        (Value::Number(n), Scalar::Id) if n.is_i64() || n.is_u64() => {
            return Ok(Value::String(n.to_string()));
        }
        _ => false,
    };

    if ok {
        Ok(value)
    } else {
        Err(format!("expected {}, found {}", scalar.name(), describe(&value)))
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entity::Resolved;
    use crate::registry::SchemaRegistry;
    use crate::shape::EntityShape;

    fn schema() -> Schema {
        let mut registry = SchemaRegistry::new();
        registry
            .register_shape(
                EntityShape::new("User")
                    .id_field("id")
                    .stored("name", TypeExpr::string())
                    .stored("age", TypeExpr::optional(TypeExpr::int()))
                    .computed("upper", TypeExpr::string(), |user| {
                        json!(user.get_str("name").unwrap_or_default().to_uppercase())
                    }),
            )
            .unwrap();
        registry.build().unwrap()
    }

    fn add_user() -> Operation {
        Operation::read("addUser", TypeExpr::int(), |_| async { Ok(Resolved::Null) })
            .arg("name", TypeExpr::string())
            .arg("email", TypeExpr::string())
            .arg("age", TypeExpr::optional(TypeExpr::int()))
    }

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_coerces_declared_args() {
        let args = coerce_args(
            &schema(),
            &add_user(),
            raw(json!({"name": "Ada", "email": "a@x.com", "age": 36})),
            ArgumentPolicy::Permissive,
        )
        .unwrap();
        assert_eq!(args.str("name").unwrap(), "Ada");
        assert_eq!(args.get("age"), Some(&json!(36)));
    }

    #[test]
    fn test_missing_optional_becomes_null() {
        let args = coerce_args(
            &schema(),
            &add_user(),
            raw(json!({"name": "Ada", "email": "a@x.com"})),
            ArgumentPolicy::Permissive,
        )
        .unwrap();
        assert_eq!(args.get("age"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_required_names_argument() {
        let err = coerce_args(
            &schema(),
            &add_user(),
            raw(json!({"name": "Ada"})),
            ArgumentPolicy::Permissive,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { argument, .. } if argument == "email"));
    }

    #[test]
    fn test_mismatch_names_argument() {
        let err = coerce_args(
            &schema(),
            &add_user(),
            raw(json!({"name": 7, "email": "a@x.com"})),
            ArgumentPolicy::Permissive,
        )
        .unwrap_err();
        match err {
            DispatchError::ArgumentType { argument, reason } => {
                assert_eq!(argument, "name");
                assert_eq!(reason, "expected String, found integer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_extras_follow_policy() {
        let input = json!({"name": "Ada", "email": "a@x.com", "extra": true});
        let schema = schema();
        let args =
            coerce_args(&schema, &add_user(), raw(input.clone()), ArgumentPolicy::Permissive)
                .unwrap();
        assert!(args.get("extra").is_none());

        let err =
            coerce_args(&schema, &add_user(), raw(input), ArgumentPolicy::Strict).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { argument, .. } if argument == "extra"));
    }

    #[test]
    fn test_scalar_rules() {
        let s = schema();
        assert_eq!(coerce_value(&s, json!(3), &TypeExpr::float()), Ok(json!(3.0)));
        assert!(coerce_value(&s, json!(3.5), &TypeExpr::int()).is_err());
        assert_eq!(coerce_value(&s, json!(42), &TypeExpr::id()), Ok(json!("42")));
        assert_eq!(coerce_value(&s, json!("x1"), &TypeExpr::id()), Ok(json!("x1")));
        assert!(coerce_value(&s, json!("true"), &TypeExpr::boolean()).is_err());
        assert!(coerce_value(&s, Value::Null, &TypeExpr::string()).is_err());
    }

    #[test]
    fn test_list_rules() {
        let s = schema();
        let ty = TypeExpr::list(TypeExpr::int());
        assert_eq!(coerce_value(&s, json!([1, 2]), &ty), Ok(json!([1, 2])));
        assert_eq!(coerce_value(&s, json!(5), &ty), Ok(json!([5])));
        assert!(coerce_value(&s, json!([1, "x"]), &ty).is_err());

        let ty = TypeExpr::list(TypeExpr::optional(TypeExpr::int()));
        assert_eq!(coerce_value(&s, json!([1, null]), &ty), Ok(json!([1, null])));
    }

    #[test]
    fn test_entity_input_requires_object() {
        let s = schema();
        let ty = TypeExpr::entity("User");
        assert!(coerce_value(&s, json!({"name": "Ada"}), &ty).is_ok());
        assert!(coerce_value(&s, json!("Ada"), &ty).is_err());
    }

    #[test]
    fn test_entity_input_checks_fields_against_shape() {
        let s = schema();
        let ty = TypeExpr::entity("User");

        assert_eq!(
            coerce_value(&s, json!({"id": 7, "name": "Ada"}), &ty),
            Ok(json!({"id": "7", "name": "Ada"}))
        );

        let reason = coerce_value(&s, json!({"name": "Ada", "nickname": "A"}), &ty).unwrap_err();
        assert_eq!(reason, "User has no field 'nickname'");

        let reason = coerce_value(&s, json!({"name": 5}), &ty).unwrap_err();
        assert_eq!(reason, "field 'name': expected String, found integer");

        let reason = coerce_value(&s, json!({"age": 3}), &ty).unwrap_err();
        assert_eq!(reason, "missing field 'name' of User");

        let reason = coerce_value(&s, json!({"name": "Ada", "upper": "ADA"}), &ty).unwrap_err();
        assert_eq!(reason, "field 'upper' of User is computed and cannot be supplied");
    }
}
