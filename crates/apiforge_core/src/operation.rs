//! Operation declarations: Read, Write and EventSource.
//!
//! Handlers are stored as closures returning boxed futures so the dispatcher
//! can await them without knowing their concrete types. Write handlers also
//! receive the per-request [`RequestContext`]; EventSource transforms map a
//! published payload to the value delivered to subscribers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::args::Args;
use crate::context::RequestContext;
use crate::entity::Resolved;
use crate::types::TypeExpr;

/// The namespace an operation is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Side-effect free lookup.
    Read,
    /// Mutation; may publish events through the request context.
    Write,
    /// Topic-bound transform feeding subscriptions.
    EventSource,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Read,
        OperationKind::Write,
        OperationKind::EventSource,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::EventSource => "event_source",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Resolved>>;
pub type ReadHandler = Arc<dyn Fn(Args) -> HandlerFuture + Send + Sync>;
pub type WriteHandler = Arc<dyn Fn(Args, RequestContext) -> HandlerFuture + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(Resolved) -> HandlerFuture + Send + Sync>;

/// The bound behaviour of an operation.
#[derive(Clone)]
pub enum Handler {
    Read(ReadHandler),
    Write(WriteHandler),
    EventSource {
        topics: Vec<String>,
        transform: TransformFn,
    },
}

/// A declared operation argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgDef {
    pub name: String,
    pub ty: TypeExpr,
}

/// A named, typed unit of API behaviour.
#[derive(Clone)]
pub struct Operation {
    name: String,
    args: Vec<ArgDef>,
    returns: TypeExpr,
    handler: Handler,
}

impl Operation {
    /// Declare a Read operation.
    pub fn read<F, Fut>(name: impl Into<String>, returns: TypeExpr, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Resolved>> + Send + 'static,
    {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns,
            handler: Handler::Read(Arc::new(move |args| handler(args).boxed())),
        }
    }

    /// Declare a Write operation.
    pub fn write<F, Fut>(name: impl Into<String>, returns: TypeExpr, handler: F) -> Self
    where
        F: Fn(Args, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Resolved>> + Send + 'static,
    {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns,
            handler: Handler::Write(Arc::new(move |args, ctx| handler(args, ctx).boxed())),
        }
    }

    /// Declare an EventSource bound to `topics`.
    pub fn event_source<I, S, F, Fut>(
        name: impl Into<String>,
        returns: TypeExpr,
        topics: I,
        transform: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Resolved>> + Send + 'static,
    {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns,
            handler: Handler::EventSource {
                topics: topics.into_iter().map(Into::into).collect(),
                transform: Arc::new(move |payload| transform(payload).boxed()),
            },
        }
    }

    /// Declare an EventSource that delivers published payloads unchanged.
    pub fn identity_source<I, S>(name: impl Into<String>, returns: TypeExpr, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::event_source(name, returns, topics, |payload| async move { Ok(payload) })
    }

    /// Append a declared argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.args.push(ArgDef {
            name: name.into(),
            ty,
        });
        self
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self.handler {
            Handler::Read(_) => OperationKind::Read,
            Handler::Write(_) => OperationKind::Write,
            Handler::EventSource { .. } => OperationKind::EventSource,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[ArgDef] {
        &self.args
    }

    #[must_use]
    pub fn returns(&self) -> &TypeExpr {
        &self.returns
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Topics this operation is bound to (empty unless it is an EventSource).
    #[must_use]
    pub fn topics(&self) -> &[String] {
        match &self.handler {
            Handler::EventSource { topics, .. } => topics,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_bound_to(&self, topic: &str) -> bool {
        self.topics().iter().any(|t| t == topic)
    }

    /// The EventSource transform, if this is an EventSource.
    #[must_use]
    pub fn transform(&self) -> Option<&TransformFn> {
        match &self.handler {
            Handler::EventSource { transform, .. } => Some(transform),
            _ => None,
        }
    }

    /// Every type this operation mentions: argument types then the return
    /// type.
    pub fn referenced_types(&self) -> impl Iterator<Item = &TypeExpr> {
        self.args.iter().map(|a| &a.ty).chain(std::iter::once(&self.returns))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind())
            .field("name", &self.name)
            .field("args", &self.args)
            .field("returns", &self.returns)
            .field("topics", &self.topics())
            .finish()
    }
}
