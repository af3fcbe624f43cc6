//! The `User` shape, its in-memory store and the operations serving it.

use std::sync::Arc;

use anyhow::Context as _;
use apiforge_core::{
    Entity, EntityShape, IdGenerator, Operation, RandomHexId, SchemaError, SchemaRegistry,
    TypeExpr,
};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::info;

/// Topic `addUser` publishes the new user on.
pub const USER_ADDED: &str = "USER_ADDED";

/// `User { id: ID!, name: String!, email: String!, flatInfos: String! }`
/// where `flatInfos` is `name:email:id`.
pub fn user_shape() -> EntityShape {
    EntityShape::new("User")
        .id_field("id")
        .stored("name", TypeExpr::string())
        .stored("email", TypeExpr::string())
        .computed("flatInfos", TypeExpr::string(), |user: &Entity| {
            let part = |field: &str| user.get_str(field).unwrap_or_default();
            Value::String([part("name"), part("email"), part("id")].join(":"))
        })
}

/// Users held in memory. Cheap to clone; clones share the same rows.
#[derive(Clone)]
pub struct UserStore {
    shape: Arc<EntityShape>,
    rows: Arc<RwLock<Vec<Entity>>>,
    ids: Arc<dyn IdGenerator>,
}

impl UserStore {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            shape: Arc::new(user_shape()),
            rows: Arc::default(),
            ids,
        }
    }

    pub async fn all(&self) -> Vec<Entity> {
        self.rows.read().await.clone()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.rows
            .read()
            .await
            .iter()
            .find(|user| user.get_str("name") == Some(name))
            .cloned()
    }

    /// Create and store a user, generating its id.
    pub async fn insert(&self, name: &str, email: &str) -> Result<Entity, SchemaError> {
        let mut values = Map::new();
        values.insert("name".into(), json!(name));
        values.insert("email".into(), json!(email));
        let user = self.shape.instantiate(values, self.ids.as_ref())?;
        self.rows.write().await.push(user.clone());
        Ok(user)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new(Arc::new(RandomHexId))
    }
}

/// Seed the store with `count` users named `user{n}`.
pub async fn seed(store: &UserStore, count: usize) -> Result<(), SchemaError> {
    for n in 1..=count {
        store
            .insert(&format!("user{n}"), &format!("user{n}@example.com"))
            .await?;
    }
    info!(count, total = store.len().await, "seeded users");
    Ok(())
}

/// Declare the `User` shape and its operations:
///
/// - `getAllUsers: [User!]!`
/// - `getOneUserByName(name: String!): User`
/// - `addUser(name: String!, email: String!): User!`, publishing on [`USER_ADDED`]
/// - `userAddedNotif: User!`, an identity EventSource on [`USER_ADDED`]
pub fn register(registry: &mut SchemaRegistry, store: &UserStore) -> Result<(), SchemaError> {
    registry.register_shape(user_shape())?;

    let users = store.clone();
    registry.register_operation(Operation::read(
        "getAllUsers",
        TypeExpr::list(TypeExpr::entity("User")),
        move |_| {
            let users = users.clone();
            async move { Ok(users.all().await.into()) }
        },
    ))?;

    let users = store.clone();
    registry.register_operation(
        Operation::read(
            "getOneUserByName",
            TypeExpr::optional(TypeExpr::entity("User")),
            move |args| {
                let users = users.clone();
                async move {
                    let name = args.str("name")?;
                    Ok(users.find_by_name(name).await.into())
                }
            },
        )
        .arg("name", TypeExpr::string()),
    )?;

    let users = store.clone();
    registry.register_operation(
        Operation::write(
            "addUser",
            TypeExpr::entity("User"),
            move |args, context| {
                let users = users.clone();
                async move {
                    let user = users
                        .insert(args.str("name")?, args.str("email")?)
                        .await
                        .context("failed to create user")?;
                    context.publish(USER_ADDED, user.clone());
                    Ok(user.into())
                }
            },
        )
        .arg("name", TypeExpr::string())
        .arg("email", TypeExpr::string()),
    )?;

    registry.register_operation(Operation::identity_source(
        "userAddedNotif",
        TypeExpr::entity("User"),
        [USER_ADDED],
    ))?;

    Ok(())
}
