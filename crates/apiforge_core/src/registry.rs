//! Schema registry: collects entity shapes and operations, then freezes them
//! into an immutable [`Schema`] shared by the dispatcher, the broker and the
//! transport binding.

use std::collections::HashMap;

use serde_json::{Value, json};
use tracing::info;

use crate::error::SchemaError;
use crate::operation::{Operation, OperationKind};
use crate::shape::EntityShape;
use crate::types::TypeExpr;

/// Accumulates declarations before [`SchemaRegistry::build`].
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    shapes: HashMap<String, EntityShape>,
    operations: HashMap<OperationKind, HashMap<String, Operation>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity shape.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateShape`] if a shape with the same name exists.
    /// - [`SchemaError::DuplicateField`] if the shape repeats a field name.
    pub fn register_shape(&mut self, shape: EntityShape) -> Result<(), SchemaError> {
        shape.validate()?;
        if self.shapes.contains_key(shape.name()) {
            return Err(SchemaError::DuplicateShape(shape.name().to_string()));
        }
        self.shapes.insert(shape.name().to_string(), shape);
        Ok(())
    }

    /// Register an operation under its kind namespace.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateOperation`] if the kind already has an
    ///   operation with this name.
    /// - [`SchemaError::DuplicateArgument`] if an argument name repeats.
    pub fn register_operation(&mut self, operation: Operation) -> Result<(), SchemaError> {
        for (i, arg) in operation.args().iter().enumerate() {
            if operation.args()[..i].iter().any(|a| a.name == arg.name) {
                return Err(SchemaError::DuplicateArgument {
                    operation: operation.name().to_string(),
                    argument: arg.name.clone(),
                });
            }
        }

        let kind = operation.kind();
        let namespace = self.operations.entry(kind).or_default();
        if namespace.contains_key(operation.name()) {
            return Err(SchemaError::DuplicateOperation {
                kind,
                name: operation.name().to_string(),
            });
        }
        namespace.insert(operation.name().to_string(), operation);
        Ok(())
    }

    /// Validate every cross reference and freeze the registry.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::UnresolvedReference`] if an operation argument, return
    ///   type or entity field names an unregistered shape.
    /// - [`SchemaError::EmptyTopicBinding`] if an EventSource has no topics.
    pub fn build(self) -> Result<Schema, SchemaError> {
        for shape in self.shapes.values() {
            for field in shape.fields() {
                self.check_reference(&format!("{}.{}", shape.name(), field.name()), field.ty())?;
            }
        }

        for operation in self.operations.values().flat_map(HashMap::values) {
            for ty in operation.referenced_types() {
                self.check_reference(operation.name(), ty)?;
            }
            if operation.kind() == OperationKind::EventSource && operation.topics().is_empty() {
                return Err(SchemaError::EmptyTopicBinding(operation.name().to_string()));
            }
        }

        let schema = Schema {
            shapes: self.shapes,
            operations: self.operations,
        };
        info!(
            shapes = schema.shapes.len(),
            reads = schema.operations(OperationKind::Read).count(),
            writes = schema.operations(OperationKind::Write).count(),
            event_sources = schema.operations(OperationKind::EventSource).count(),
            "schema built"
        );
        Ok(schema)
    }

    fn check_reference(&self, owner: &str, ty: &TypeExpr) -> Result<(), SchemaError> {
        match ty.entity_name() {
            Some(name) if !self.shapes.contains_key(name) => {
                Err(SchemaError::UnresolvedReference {
                    owner: owner.to_string(),
                    type_name: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// The frozen set of shapes and operations.
///
/// Read-only after construction, so it is shared as `Arc<Schema>` without
/// further synchronisation.
#[derive(Debug, Default)]
pub struct Schema {
    shapes: HashMap<String, EntityShape>,
    operations: HashMap<OperationKind, HashMap<String, Operation>>,
}

impl Schema {
    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&EntityShape> {
        self.shapes.get(name)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &EntityShape> {
        self.shapes.values()
    }

    #[must_use]
    pub fn operation(&self, kind: OperationKind, name: &str) -> Option<&Operation> {
        self.operations.get(&kind).and_then(|ops| ops.get(name))
    }

    pub fn operations(&self, kind: OperationKind) -> impl Iterator<Item = &Operation> {
        self.operations.get(&kind).into_iter().flat_map(HashMap::values)
    }

    /// EventSources bound to `topic`.
    pub fn event_sources_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Operation> {
        self.operations(OperationKind::EventSource)
            .filter(move |op| op.is_bound_to(topic))
    }

    /// Describe one shape for clients.
    #[must_use]
    pub fn shape_json(&self, name: &str) -> Option<Value> {
        self.shape(name).map(|shape| {
            json!({
                "name": shape.name(),
                "id_field": shape.id_field_name(),
                "fields": shape.fields().iter().map(|f| {
                    json!({
                        "name": f.name(),
                        "type": f.ty().to_string(),
                        "computed": f.is_computed(),
                    })
                }).collect::<Vec<_>>(),
            })
        })
    }

    /// Serialize the schema to a JSON description for clients. Shapes and
    /// operations are sorted by name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut shape_names: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        shape_names.sort_unstable();

        let mut operations = serde_json::Map::new();
        for kind in OperationKind::ALL {
            let mut ops: Vec<&Operation> = self.operations(kind).collect();
            ops.sort_by(|a, b| a.name().cmp(b.name()));
            let described = ops
                .into_iter()
                .map(|op| {
                    json!({
                        "name": op.name(),
                        "args": op.args().iter().map(|a| {
                            json!({ "name": a.name, "type": a.ty.to_string() })
                        }).collect::<Vec<_>>(),
                        "returns": op.returns().to_string(),
                        "topics": op.topics(),
                    })
                })
                .collect::<Vec<_>>();
            operations.insert(kind.as_str().to_string(), Value::Array(described));
        }

        json!({
            "shapes": shape_names
                .into_iter()
                .filter_map(|name| self.shape_json(name))
                .collect::<Vec<_>>(),
            "operations": operations,
        })
    }
}
