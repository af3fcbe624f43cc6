//! End-to-end behaviour of the registry, dispatcher and broker using a small
//! user directory: a `User` shape with a computed `flatInfos` field, two Read
//! operations, an `addUser` Write that publishes `USER_ADDED`, and an
//! identity EventSource on that topic.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use apiforge_core::{
    DispatchConfig, DispatchError, Dispatcher, Entity, EntityShape, IdGenerator, Operation,
    OperationKind, RandomHexId, SchemaError, SchemaRegistry, SubscriptionState,
    TypeExpr,
};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tokio::time::timeout;

const USER_ADDED: &str = "USER_ADDED";

fn user_shape() -> EntityShape {
    EntityShape::new("User")
        .stored("name", TypeExpr::string())
        .stored("email", TypeExpr::string())
        .id_field("id")
        .computed("flatInfos", TypeExpr::string(), |user: &Entity| {
            let part = |field: &str| user.get_str(field).unwrap_or_default();
            Value::String([part("name"), part("email"), part("id")].join(":"))
        })
}

#[derive(Clone)]
struct Users {
    rows: Arc<RwLock<Vec<Entity>>>,
    ids: Arc<dyn IdGenerator>,
}

fn directory() -> (Dispatcher, Users) {
    let users = Users {
        rows: Arc::default(),
        ids: Arc::new(RandomHexId),
    };
    let mut registry = SchemaRegistry::new();
    registry.register_shape(user_shape()).unwrap();

    let store = users.clone();
    registry
        .register_operation(Operation::read(
            "getAllUsers",
            TypeExpr::list(TypeExpr::entity("User")),
            move |_| {
                let store = store.clone();
                async move { Ok(store.rows.read().await.clone().into()) }
            },
        ))
        .unwrap();

    let store = users.clone();
    registry
        .register_operation(
            Operation::read(
                "getOneUserByName",
                TypeExpr::optional(TypeExpr::entity("User")),
                move |args| {
                    let store = store.clone();
                    async move {
                        let name = args.str("name")?;
                        let rows = store.rows.read().await;
                        Ok(rows.iter().find(|u| u.get_str("name") == Some(name)).cloned().into())
                    }
                },
            )
            .arg("name", TypeExpr::string()),
        )
        .unwrap();

    let store = users.clone();
    registry
        .register_operation(
            Operation::write("addUser", TypeExpr::entity("User"), move |args, ctx| {
                let store = store.clone();
                async move {
                    let mut values = Map::new();
                    values.insert("name".into(), json!(args.str("name")?));
                    values.insert("email".into(), json!(args.str("email")?));
                    let user = user_shape().instantiate(values, store.ids.as_ref())?;
                    store.rows.write().await.push(user.clone());
                    ctx.publish(USER_ADDED, user.clone());
                    Ok(user.into())
                }
            })
            .arg("name", TypeExpr::string())
            .arg("email", TypeExpr::string()),
        )
        .unwrap();

    registry
        .register_operation(Operation::identity_source(
            "userAddedNotif",
            TypeExpr::entity("User"),
            [USER_ADDED],
        ))
        .unwrap();
    registry
        .register_operation(Operation::identity_source(
            "otherNotif",
            TypeExpr::string(),
            ["OTHER"],
        ))
        .unwrap();
    registry
        .register_operation(Operation::event_source(
            "brokenNotif",
            TypeExpr::entity("User"),
            [USER_ADDED],
            |_| async { bail!("transform exploded") },
        ))
        .unwrap();

    let schema = Arc::new(registry.build().unwrap());
    (Dispatcher::new(schema, DispatchConfig::default()), users)
}

fn args(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

async fn add_user(d: &Dispatcher, name: &str, email: &str) -> Value {
    d.invoke(
        OperationKind::Write,
        "addUser",
        args(json!({ "name": name, "email": email })),
        d.context(),
    )
    .await
    .unwrap()
}

#[test]
fn duplicate_shape_fails() {
    let mut registry = SchemaRegistry::new();
    registry.register_shape(user_shape()).unwrap();
    assert!(matches!(
        registry.register_shape(user_shape()),
        Err(SchemaError::DuplicateShape(_))
    ));
}

#[tokio::test]
async fn unknown_operation_is_rejected_for_every_kind() {
    let (d, _) = directory();
    for kind in OperationKind::ALL {
        let err = d
            .invoke(kind, "deleteUser", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownOperation { .. }), "{kind}: {err}");
    }
}

#[tokio::test]
async fn computed_field_joins_stored_fields_and_id() {
    let (d, users) = directory();
    let created = add_user(&d, "Ada", "a@x.com").await;

    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);
    assert_eq!(created["flatInfos"], json!(format!("Ada:a@x.com:{id}")));

    let stored = users.rows.read().await;
    assert_eq!(stored[0].get_str("id"), Some(id.as_str()));
    assert!(stored[0].get("flatInfos").is_none());
}

#[tokio::test]
async fn reads_return_lists_and_nullable_lookups() {
    let (d, _) = directory();
    add_user(&d, "Ada", "a@x.com").await;
    add_user(&d, "Grace", "g@x.com").await;

    let all = d
        .invoke(OperationKind::Read, "getAllUsers", Map::new(), d.context())
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let grace = d
        .invoke(
            OperationKind::Read,
            "getOneUserByName",
            args(json!({"name": "Grace", "ignored": true})),
            d.context(),
        )
        .await
        .unwrap();
    assert_eq!(grace["email"], "g@x.com");

    let nobody = d
        .invoke(
            OperationKind::Read,
            "getOneUserByName",
            args(json!({"name": "Linus"})),
            d.context(),
        )
        .await
        .unwrap();
    assert_eq!(nobody, Value::Null);
}

#[tokio::test]
async fn unsubscribe_twice_is_harmless() {
    let (d, _) = directory();
    let sub = d.subscribe("userAddedNotif", USER_ADDED).unwrap();
    assert!(d.unsubscribe(sub.handle()));
    assert!(!d.unsubscribe(sub.handle()));
    assert_eq!(d.broker().state(sub.handle()), SubscriptionState::Detached);
}

#[tokio::test]
async fn identity_source_delivers_only_on_its_topic() {
    let (d, _) = directory();
    let mut added = d.subscribe("userAddedNotif", USER_ADDED).unwrap();
    let mut other = d.subscribe("otherNotif", "OTHER").unwrap();

    let user = user_shape()
        .instantiate(args(json!({"name": "Ada", "email": "a@x.com"})), &RandomHexId)
        .unwrap();
    d.broker().publish(USER_ADDED, user.clone());

    let event = timeout(Duration::from_secs(1), added.recv()).await.unwrap().unwrap();
    assert_eq!(event["name"], "Ada");
    assert_eq!(event["id"], json!(user.get_str("id")));

    // Exactly one event on the bound topic, none on the unrelated one.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(added.try_recv().is_none());
    assert!(other.try_recv().is_none());
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (d, _) = directory();
    let mut sub = d.subscribe("userAddedNotif", USER_ADDED).unwrap();

    add_user(&d, "first", "1@x.com").await;
    add_user(&d, "second", "2@x.com").await;

    let a = timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    let b = timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    assert_eq!(a["name"], "first");
    assert_eq!(b["name"], "second");
}

#[tokio::test]
async fn failing_subscriber_does_not_affect_others() {
    let (d, _) = directory();
    let broken = d.subscribe("brokenNotif", USER_ADDED).unwrap();
    let mut healthy = d.subscribe("userAddedNotif", USER_ADDED).unwrap();

    add_user(&d, "Ada", "a@x.com").await;

    let event = timeout(Duration::from_secs(1), healthy.recv()).await.unwrap().unwrap();
    assert_eq!(event["name"], "Ada");
    // The failing subscription stays attached; only the event was dropped.
    assert_ne!(d.broker().state(broken.handle()), SubscriptionState::Detached);
}

#[tokio::test]
async fn add_user_notifies_prior_subscriber_with_shaped_entity() {
    let (d, _) = directory();
    let mut sub = d.subscribe("userAddedNotif", USER_ADDED).unwrap();

    let created = add_user(&d, "Ada", "a@x.com").await;
    let event = timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();

    assert_eq!(event, created);
    assert_eq!(sub.state(), SubscriptionState::Delivering);
}

#[tokio::test]
async fn missing_argument_is_rejected_before_the_handler() {
    let (d, users) = directory();
    let err = d
        .invoke(
            OperationKind::Write,
            "addUser",
            args(json!({"name": "Ada"})),
            d.context(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ArgumentType { argument, .. } if argument == "email"));
    assert!(users.rows.read().await.is_empty());
}
