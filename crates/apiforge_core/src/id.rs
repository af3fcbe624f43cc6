//! Id-generation capability.
//!
//! Shapes with an id field ask an [`IdGenerator`] for a fresh value when an
//! instance is created. The only contract is uniqueness across instances of
//! one shape with overwhelming probability.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Supplies unique identifiers for new entity instances.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh identifier.
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// 128-bit random identifiers rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomHexId;

impl IdGenerator for RandomHexId {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic `<prefix><n>` identifiers, starting at 1.
#[derive(Debug)]
pub struct SequentialId {
    prefix: String,
    next: AtomicU64,
}

impl SequentialId {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialId {
    fn default() -> Self {
        Self::new("")
    }
}

impl IdGenerator for SequentialId {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}
