// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Changeset: buffered, validated edits to nested data
//!
//! This crate lets you stage edits to a JSON-like object without touching it. Edits go to a
//! [`Changeset`] instead, which validates every one of them, keeps the accepted ones as pending
//! *changes* and the rejected ones as pending *errors*, and lets you decide later what happens to
//! them:
//!
//! - [`execute`](Changeset::execute) commits all changes into the object (only when nothing is
//!   invalid),
//! - [`save`](Changeset::save) additionally persists the object and starts over,
//! - [`rollback`](Changeset::rollback) and friends discard them,
//! - [`merge`](Changeset::merge) reconciles two changesets edited independently over the same
//!   object,
//! - [`snapshot`](Changeset::snapshot) and [`restore`](Changeset::restore) save and bring back
//!   the pending state.
//!
//! This is the model forms are built on: the user types into the changeset, sees their (possibly
//! invalid) input echoed back along with the reasons it was rejected, and nothing reaches the
//! record until the whole form is valid and submitted.
//!
//! ## Core Concepts
//!
//! - **Content**: the object being edited, anything implementing [`Content`] (for example a
//!   plain [`serde_json::Value`]). It is shared with the changeset through `Rc<RefCell<_>>` and
//!   only written to on commit.
//! - **Field path**: a dot-delimited string addressing a possibly nested field, like
//!   `"address.city"`. See [`path`].
//! - **Change**: an accepted pending value for a field path ([`Change`]).
//! - **Error**: a rejected pending value plus the validator's reasons ([`FieldError`]).
//! - **Validator**: judges each staged value, synchronously or asynchronously. See
//!   [`validation`].
//!
//! A changeset is **pristine** when it has no pending changes, and **valid** when it has no
//! pending errors.
//!
//! ## Getting Started
//!
//! ```rust
//! use changeset::{Changeset, validation::{self, ValidationContext}};
//! use serde_json::{Value, json};
//!
//! let changeset = Changeset::builder(json!({ "name": "Al", "address": { "city": "Oslo" } }))
//!     .validator(|ctx: ValidationContext<'_, Value>| {
//!         validation::ready(match ctx.new_value.as_str() {
//!             Some("") => json!("can't be blank"),
//!             _ => json!(true),
//!         })
//!     })
//!     .build()
//!     .unwrap();
//!
//! // Rejected input stays readable, and is reported.
//! let _ = changeset.set("name", "");
//! assert_eq!(changeset.get("name"), Some(json!("")));
//! assert_eq!(changeset.errors()[0].validation, json!("can't be blank"));
//!
//! // Nested fields are addressed by path.
//! let _ = changeset.set("name", "Bob");
//! let _ = changeset.set("address.city", "Bergen");
//! assert!(changeset.is_valid());
//!
//! // Nothing reached the content yet.
//! assert_eq!(changeset.data().borrow()["name"], json!("Al"));
//!
//! changeset.execute();
//! assert_eq!(
//!     *changeset.data().borrow(),
//!     json!({ "name": "Bob", "address": { "city": "Bergen" } })
//! );
//! ```
//!
//! ## Asynchronous validation
//!
//! Validators return a future. Ready futures are applied on the spot; others make
//! [`Changeset::set`] and [`Changeset::validate`] return [`Settle::Pending`], which applies its
//! outcome when driven to completion. While pending, [`Changeset::is_validating`] reports the
//! field. Overlapping validations of one field are not cancelled: whichever *settles* last wins.
//!
//! ## Observing changes
//!
//! [`Changeset::subscribe`] registers an [`Observer`] that is told about validations starting
//! and finishing, rollbacks, and every field whose resolved value may have changed. See
//! [`observer`].
//!
//! ## Features
//!
//! - `serde`: Provides `serde` support for changes, errors, options and snapshots. This feature
//!   is enabled by default.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use indexmap::IndexMap;

pub mod path;
mod entry;
pub use entry::{Change, FieldError};
pub mod content;
pub use content::{Content, SaveError, SaveFuture};
pub mod validation;
pub use validation::{ValidationContext, ValidationFuture, Validator, ValidatorError, Verdict};
pub mod observer;
pub use observer::{Event, Observer, RecordingObserver, SubscriptionId};
mod settle;
pub use settle::Settle;
mod error;
pub use error::ChangesetError;
mod changeset;
pub use changeset::{
    Changeset, ChangesetBuilder, FieldChange, FieldResult, InvalidField, Options, Outcome,
    Snapshot,
};

/// A flat map from full dotted field paths to `V`, in insertion order.
///
/// See [`path`] for the invariant these maps keep.
pub type PathMap<V> = IndexMap<String, V, RandomState>;

fn create_map<V>() -> PathMap<V> {
    IndexMap::with_hasher(RandomState::new())
}
