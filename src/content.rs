// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The object a changeset buffers edits for.
//!
//! A changeset only ever reads content through [`Content::get`], and only ever writes to it by
//! deep-setting committed changes into [`Content::root_mut`]. Content types never need to expose
//! a write method of their own.

use crate::path;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::{error, fmt};

/// The pending result of [`Content::save`].
pub type SaveFuture = LocalBoxFuture<'static, Result<Value, SaveError>>;

/// The underlying nested object of a changeset.
///
/// `serde_json::Value` implements this trait directly. Implement it for your own record type to
/// give [`Changeset::save`](crate::Changeset::save) something to persist.
pub trait Content: 'static {
    /// The root of the nested object.
    fn root(&self) -> &Value;

    /// Mutable access to the root, used when committing changes.
    fn root_mut(&mut self) -> &mut Value;

    /// Reads the value at a dotted `path`, or `None` if any segment is missing.
    fn get(&self, path: &str) -> Option<&Value> {
        path::get(self.root(), path)
    }

    /// Persists the content.
    ///
    /// Returns `None` if this content has no save operation, which is the default.
    #[expect(unused_variables)]
    fn save(&mut self, options: Option<&Value>) -> Option<SaveFuture> {
        None
    }
}

impl Content for Value {
    fn root(&self) -> &Value {
        self
    }

    fn root_mut(&mut self) -> &mut Value {
        self
    }
}

/// Error produced by a content's save operation.
#[derive(Debug)]
pub struct SaveError {
    source: Box<dyn error::Error>,
}

impl SaveError {
    pub fn new(source: impl Into<Box<dyn error::Error>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl error::Error for SaveError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_are_content_without_save() {
        let mut content = json!({ "user": { "name": "Al" } });
        assert_eq!(Content::get(&content, "user.name"), Some(&json!("Al")));
        assert!(Content::get(&content, "user.age").is_none());
        assert!(content.save(None).is_none());
    }
}
