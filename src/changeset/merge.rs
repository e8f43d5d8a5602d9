// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Changeset, State};
use crate::{ChangesetError, Content, PathMap, create_map, path};
use std::rc::Rc;
use tracing::debug;

/// Copies `ours` without the keys `evicted_by` holds, then lays `theirs` over it.
fn reconcile<V: Clone, W>(
    ours: &PathMap<V>,
    evicted_by: &PathMap<W>,
    theirs: &PathMap<V>,
) -> PathMap<V> {
    let mut merged = create_map();
    for (key, value) in ours {
        if !evicted_by.contains_key(key.as_str()) {
            path::set_flat(&mut merged, key, value.clone());
        }
    }
    for (key, value) in theirs {
        path::set_flat(&mut merged, key, value.clone());
    }
    merged
}

impl<C: Content> Changeset<C> {
    /// Combines two changesets over the same content into a new one.
    ///
    /// For every key, whichever side declares an outcome wins, with `other` taking precedence:
    /// an error in `other` evicts a change in `self` for that key, and a change in `other` evicts
    /// an error in `self`. The result shares the content, validator, validation keys and options
    /// of `self`, but none of its observers.
    ///
    /// If neither changeset has pending changes, `self` is returned as is.
    ///
    /// ```rust
    /// # use changeset::Changeset;
    /// # use serde_json::json;
    /// # use std::{cell::RefCell, rc::Rc};
    /// let user = Rc::new(RefCell::new(json!({ "firstName": "Jim" })));
    /// let a = Changeset::builder_shared(Rc::clone(&user)).build().unwrap();
    /// let b = Changeset::builder_shared(Rc::clone(&user)).build().unwrap();
    /// let _ = a.set("firstName", "Jimmy");
    /// let _ = b.set("lastName", "Fallon");
    ///
    /// a.merge(&b).unwrap().execute();
    /// assert_eq!(*user.borrow(), json!({ "firstName": "Jimmy", "lastName": "Fallon" }));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::ContentMismatch`] if the two changesets do not share the very
    /// same content instance.
    pub fn merge(&self, other: &Self) -> Result<Self, ChangesetError> {
        if !Rc::ptr_eq(&self.shared.content, &other.shared.content) {
            return Err(ChangesetError::ContentMismatch);
        }
        if self.is_pristine() && other.is_pristine() {
            return Ok(self.clone());
        }

        let state = {
            let ours = self.shared.state.borrow();
            let theirs = other.shared.state.borrow();
            State {
                errors: reconcile(&ours.errors, &theirs.changes, &theirs.errors),
                changes: reconcile(&ours.changes, &theirs.errors, &theirs.changes),
                running: create_map(),
            }
        };
        debug!(
            changes = state.changes.len(),
            errors = state.errors.len(),
            "merged changesets"
        );

        Ok(Self::from_parts(
            Rc::clone(&self.shared.content),
            self.shared.validator.clone(),
            self.shared.validation_keys.clone(),
            self.shared.options,
            state,
        ))
    }
}
