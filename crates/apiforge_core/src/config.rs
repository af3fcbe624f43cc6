//! Dispatcher configuration.

use std::time::Duration;

/// How the dispatcher treats arguments the operation does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgumentPolicy {
    /// Ignore unknown extra arguments (forward-compatible clients).
    #[default]
    Permissive,
    /// Reject unknown extra arguments with an argument error.
    Strict,
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Handling of undeclared arguments.
    pub argument_policy: ArgumentPolicy,
    /// Upper bound on a single Read/Write handler invocation. `None` means
    /// handlers may run indefinitely.
    pub handler_timeout: Option<Duration>,
}

impl DispatchConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail handler invocations that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Reject undeclared arguments.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.argument_policy = ArgumentPolicy::Strict;
        self
    }
}
