// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Changeset;
use crate::{Change, ChangesetError, Content, FieldError, observer::Event, path};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A plain copy of a changeset's pending changes and errors.
///
/// Taken with [`Changeset::snapshot`] and applied with [`Changeset::restore`], possibly to
/// another changeset over the same content.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Snapshot {
    pub changes: IndexMap<String, Value>,
    pub errors: IndexMap<String, FieldError>,
}

impl Snapshot {
    /// Renders the snapshot as `{ "changes": {..}, "errors": { key: { "value", "validation" } } }`.
    pub fn to_value(&self) -> Value {
        let changes: Map<String, Value> = self
            .changes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let errors: Map<String, Value> = self
            .errors
            .iter()
            .map(|(key, error)| (key.clone(), error.to_value()))
            .collect();
        serde_json::json!({ "changes": changes, "errors": errors })
    }
}

impl TryFrom<Value> for Snapshot {
    type Error = ChangesetError;

    /// Reads a snapshot in the shape produced by [`Snapshot::to_value`].
    ///
    /// Error entries missing `value` or `validation` read them as `null`.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut sections = match value {
            Value::Object(sections) => sections,
            _ => return Err(ChangesetError::MalformedSnapshot { field: "changes" }),
        };
        let Some(Value::Object(changes)) = sections.remove("changes") else {
            return Err(ChangesetError::MalformedSnapshot { field: "changes" });
        };
        let Some(Value::Object(errors)) = sections.remove("errors") else {
            return Err(ChangesetError::MalformedSnapshot { field: "errors" });
        };
        let errors = errors
            .into_iter()
            .map(|(key, entry)| match entry {
                Value::Object(mut entry) => {
                    let value = entry.remove("value").unwrap_or(Value::Null);
                    let validation = entry.remove("validation").unwrap_or(Value::Null);
                    Ok((key, FieldError::new(value, validation)))
                }
                _ => Err(ChangesetError::MalformedSnapshot { field: "errors" }),
            })
            .collect::<Result<IndexMap<_, _>, ChangesetError>>()?;
        Ok(Snapshot {
            changes: changes.into_iter().collect(),
            errors,
        })
    }
}

impl<C: Content> Changeset<C> {
    /// Copies the pending changes and errors out of the changeset.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.borrow();
        Snapshot {
            changes: state
                .changes
                .iter()
                .map(|(key, change)| (key.clone(), change.value().clone()))
                .collect(),
            errors: state
                .errors
                .iter()
                .map(|(key, error)| (key.clone(), error.clone()))
                .collect(),
        }
    }

    /// Replaces the pending changes and errors with those of `snapshot`.
    ///
    /// Anything not in the snapshot is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::OverlappingKeys`] if either section holds a path along with one
    /// of its ancestors. The changeset is left untouched then.
    pub fn restore(&self, snapshot: Snapshot) -> Result<&Self, ChangesetError> {
        path::check_overlap("snapshot.changes", snapshot.changes.keys().map(String::as_str))?;
        path::check_overlap("snapshot.errors", snapshot.errors.keys().map(String::as_str))?;

        let touched = {
            let mut state = self.shared.state.borrow_mut();
            let mut touched = state.touched_keys();
            state.changes = snapshot
                .changes
                .into_iter()
                .map(|(key, value)| (key, Change::new(value)))
                .collect();
            state.errors = snapshot.errors.into_iter().collect();
            for key in state.touched_keys() {
                if !touched.contains(&key) {
                    touched.push(key);
                }
            }
            touched
        };
        let mut events: Vec<Event> = touched.into_iter().map(Event::Changed).collect();
        events.extend([Event::ChangesChanged, Event::ErrorsChanged]);
        self.emit(&events);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_form_round_trips() {
        let mut snapshot = Snapshot::default();
        snapshot.changes.insert("name".to_owned(), json!("Bob"));
        snapshot.errors.insert(
            "age".to_owned(),
            FieldError::new(json!(-1), json!("must be positive")),
        );
        let value = snapshot.to_value();
        assert_eq!(
            value,
            json!({
                "changes": { "name": "Bob" },
                "errors": { "age": { "value": -1, "validation": "must be positive" } }
            })
        );
        assert_eq!(Snapshot::try_from(value).unwrap(), snapshot);
    }

    #[test]
    fn sections_must_be_objects() {
        let err = Snapshot::try_from(json!({ "changes": [], "errors": {} })).unwrap_err();
        assert!(matches!(
            err,
            ChangesetError::MalformedSnapshot { field: "changes" }
        ));
        let err = Snapshot::try_from(json!({ "changes": {} })).unwrap_err();
        assert!(matches!(
            err,
            ChangesetError::MalformedSnapshot { field: "errors" }
        ));
        let err = Snapshot::try_from(json!({ "changes": {}, "errors": { "a": 1 } })).unwrap_err();
        assert!(matches!(
            err,
            ChangesetError::MalformedSnapshot { field: "errors" }
        ));
    }
}
