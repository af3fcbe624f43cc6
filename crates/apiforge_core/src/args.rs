//! Coerced operation arguments handed to handlers.

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Arguments that have already been coerced against an operation's declared
/// argument types. Optional arguments the caller omitted are present as
/// null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map<String, Value>);

impl Args {
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a string argument.
    ///
    /// # Errors
    ///
    /// Fails if the argument is absent or not a string.
    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("argument '{name}' is not a string"))
    }

    /// Deserialize an argument into `T`.
    ///
    /// # Errors
    ///
    /// Fails if the argument is absent or does not deserialize into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .0
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("missing argument '{name}'"))?;
        serde_json::from_value(value).with_context(|| format!("argument '{name}'"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
