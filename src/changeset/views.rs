// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Read-only projections of the pending changes and errors.
//!
//! Every view is recomputed from the underlying maps when it is read, so it always reflects the
//! latest operation.

use super::Changeset;
use crate::{Content, FieldError, PathMap, create_map, path};
use serde_json::Value;

/// One pending change, in [`Changeset::changes`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize))]
pub struct FieldChange {
    pub key: String,
    pub value: Value,
}

/// One pending error, in [`Changeset::errors`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize))]
pub struct InvalidField {
    pub key: String,
    pub value: Value,
    pub validation: Value,
}

impl<C: Content> Changeset<C> {
    /// The pending changes, in the order they were first staged.
    pub fn changes(&self) -> Vec<FieldChange> {
        self.shared
            .state
            .borrow()
            .changes
            .iter()
            .map(|(key, change)| FieldChange {
                key: key.clone(),
                value: change.value().clone(),
            })
            .collect()
    }

    /// The pending errors, in the order they were first recorded.
    pub fn errors(&self) -> Vec<InvalidField> {
        self.shared
            .state
            .borrow()
            .errors
            .iter()
            .map(|(key, error)| InvalidField {
                key: key.clone(),
                value: error.value().clone(),
                validation: error.validation().clone(),
            })
            .collect()
    }

    /// The pending changes as a nested object, e.g. `{ "user": { "name": "Bob" } }` for a change
    /// staged at `user.name`.
    pub fn change(&self) -> Value {
        path::inflate(&self.shared.state.borrow().changes, |change| {
            change.value().clone()
        })
    }

    /// The pending errors as a nested object of `{ "value": .., "validation": .. }` leaves.
    pub fn error(&self) -> Value {
        path::inflate(&self.shared.state.borrow().errors, FieldError::to_value)
    }

    /// The pending changes as a flat `{ path: value }` map.
    pub fn bare_changes(&self) -> PathMap<Value> {
        let state = self.shared.state.borrow();
        let mut bare = create_map();
        for (key, change) in &state.changes {
            bare.insert(key.clone(), change.value().clone());
        }
        bare
    }

    /// The pending error for exactly `key`, if any.
    pub fn error_for(&self, key: &str) -> Option<FieldError> {
        self.shared.state.borrow().errors.get(key).cloned()
    }

    /// `true` when there are no pending errors.
    pub fn is_valid(&self) -> bool {
        self.shared.state.borrow().errors.is_empty()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// `true` when there are no pending changes.
    pub fn is_pristine(&self) -> bool {
        self.shared.state.borrow().changes.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.is_pristine()
    }
}
