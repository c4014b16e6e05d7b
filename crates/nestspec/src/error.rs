//! Error types for the test engine.
//!
//! Two failure kinds never mix:
//!
//! - [`UsageError`]: the test suite itself is malformed (declaring inside a
//!   running unit or hook, nesting units, spying something that is not a method).
//!   Returned to the caller of the offending API and never caught by the engine.
//! - [`AssertionFailure`]: an expectation did not hold. Lifted into the unit
//!   body's `anyhow::Result` with `?` and recovered by [`Tester::it`](crate::Tester::it).

use thiserror::Error;

/// A mis-scoped or illegal call into the declaration API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("`{operation}` cannot be called while unit \"{unit}\" is running")]
    InsideUnit { operation: &'static str, unit: String },

    #[error("unit \"{inner}\" cannot be declared inside running unit \"{outer}\"")]
    NestedUnit { outer: String, inner: String },

    #[error("`{operation}` cannot be called from a running `{hook}` hook")]
    InsideHook {
        operation: &'static str,
        hook: &'static str,
    },

    #[error("`{method}` is not a spyable method with the requested signature")]
    NotCallable { method: String },
}

/// A failed expectation, carrying a human-readable expected-vs-actual message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AssertionFailure {
    message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        AssertionFailure {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
