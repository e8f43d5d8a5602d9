// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Field validators and the verdicts they produce.
//!
//! A [`Validator`] is consulted every time a field is staged or re-validated. It receives a
//! [`ValidationContext`] and answers with a [`ValidationFuture`]: synchronous validators return
//! an already-resolved future (see [`ready`]), asynchronous ones return whatever future they
//! need. The changeset polls the future once, so synchronous verdicts are applied before
//! [`Changeset::set`](crate::Changeset::set) returns and asynchronous ones surface as
//! [`Settle::Pending`](crate::Settle::Pending).
//!
//! # Verdicts
//!
//! A verdict is a plain [`Value`]. It accepts the field iff it is
//!
//! - `true`,
//! - `[true]`, or
//! - blank (`null`, an empty or whitespace-only string, an empty array): a validator that has
//!   nothing to say accepts.
//!
//! Every other verdict (`false`, a message, a list of messages, ...) rejects the field and is
//! stored as the error's `validation`.
//!
//! ```rust
//! use changeset::{Changeset, validation::{self, ValidationContext}};
//! use serde_json::{Value, json};
//!
//! let not_empty = |ctx: ValidationContext<'_, Value>| {
//!     validation::ready(match ctx.new_value {
//!         Value::String(s) if s.is_empty() => json!("must not be empty"),
//!         _ => json!(true),
//!     })
//! };
//! let changeset = Changeset::builder(json!({ "name": "Al" }))
//!     .validator(not_empty)
//!     .build()
//!     .unwrap();
//!
//! let _ = changeset.set("name", "");
//! assert!(changeset.is_invalid());
//! ```

use futures::future::{self, LocalBoxFuture};
use serde_json::Value;
use std::{error, fmt};

/// The raw answer of a validator for one field.
pub type Verdict = Value;

/// The (possibly already resolved) result of running a validator.
pub type ValidationFuture = LocalBoxFuture<'static, Result<Verdict, ValidatorError>>;

/// Everything a validator may look at when judging a staged value.
#[derive(Debug)]
pub struct ValidationContext<'a, C> {
    /// The dotted path of the field.
    pub key: &'a str,
    /// The value being staged.
    pub new_value: &'a Value,
    /// The content's current value at `key`, if any.
    pub old_value: Option<&'a Value>,
    /// All pending changes, inflated into a nested object.
    pub changes: &'a Value,
    /// The underlying content.
    pub content: &'a C,
}

/// Judges staged field values.
pub trait Validator<C> {
    fn validate(&self, ctx: ValidationContext<'_, C>) -> ValidationFuture;
}

impl<C, F> Validator<C> for F
where
    F: Fn(ValidationContext<'_, C>) -> ValidationFuture,
{
    fn validate(&self, ctx: ValidationContext<'_, C>) -> ValidationFuture {
        self(ctx)
    }
}

/// Wraps a synchronous verdict into an already-resolved [`ValidationFuture`].
pub fn ready(verdict: impl Into<Verdict>) -> ValidationFuture {
    Box::pin(future::ready(Ok(verdict.into())))
}

/// Returns `true` for `null`, empty or whitespace-only strings, and empty arrays.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Decides whether `verdict` accepts the field. See the [module docs](self) for the rules.
pub fn is_valid(verdict: &Verdict) -> bool {
    match verdict {
        Value::Bool(accepted) => *accepted,
        Value::Array(items) if items.len() == 1 => items[0] == Value::Bool(true),
        other => is_blank(other),
    }
}

/// Error produced when a validator's future fails instead of producing a verdict.
#[derive(Debug)]
pub struct ValidatorError {
    source: Box<dyn error::Error>,
}

impl ValidatorError {
    pub fn new(source: impl Into<Box<dyn error::Error>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl error::Error for ValidatorError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
