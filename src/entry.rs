// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The values a changeset stores per field path.

use serde_json::Value;

/// A staged value that passed validation and has not been committed yet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Change {
    value: Value,
}

impl Change {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// A staged value that was rejected, along with the reason(s) it was rejected for.
///
/// `validation` is whatever the validator produced: usually a message, or an array of messages
/// once further reasons were pushed with [`Changeset::push_errors`](crate::Changeset::push_errors).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct FieldError {
    value: Value,
    validation: Value,
}

impl FieldError {
    pub fn new(value: Value, validation: Value) -> Self {
        Self { value, validation }
    }

    /// The rejected value. It stays readable through the changeset until rolled back.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn validation(&self) -> &Value {
        &self.validation
    }

    /// Returns the validation reasons as a list.
    ///
    /// A single reason becomes a one-element list; a blank validation yields no reasons.
    pub fn reasons(&self) -> Vec<Value> {
        match &self.validation {
            Value::Array(reasons) => reasons.clone(),
            blank if crate::validation::is_blank(blank) => Vec::new(),
            reason => vec![reason.clone()],
        }
    }

    /// Renders the entry as `{ "value": .., "validation": .. }`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "value": self.value, "validation": self.validation })
    }

    pub fn into_parts(self) -> (Value, Value) {
        (self.value, self.validation)
    }
}
