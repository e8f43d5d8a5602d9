// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The changeset engine.
//!
//! A [`Changeset`] buffers field edits against some [`Content`]. Each edit is validated, and
//! lands either in the *changes* map (accepted, pending commit) or in the *errors* map (rejected,
//! kept together with the validator's verdict). Both maps are flat: they are keyed by full dotted
//! field paths. For a given path, at most one of the two maps holds an entry.
//!
//! # Reading fields
//!
//! [`Changeset::get`] resolves a field path in this order:
//!
//! 1. a pending error for the path (rejected values stay visible, so a form keeps showing what
//!    the user typed),
//! 2. a pending change for the path,
//! 3. for dotted paths, a pending change of the base segment, resolved further with the rest of
//!    the path (or returned as-is when it is not a container),
//! 4. the content's current value.
//!
//! # Asynchronous validation
//!
//! Validators may answer asynchronously. Such validations are tracked per field until they
//! settle, and several may be in flight for the same field at once. Nothing is cancelled: the
//! validation that *settles* last decides the outcome for its field, which is not necessarily the
//! one that was *issued* last. Callers relying on last-write-wins must serialize writes per field.
//!
//! # Example
//!
//! ```rust
//! use changeset::{Changeset, validation::{self, ValidationContext}};
//! use serde_json::{Value, json};
//!
//! let changeset = Changeset::builder(json!({ "name": "Al" }))
//!     .validator(|ctx: ValidationContext<'_, Value>| {
//!         validation::ready(*ctx.new_value != "")
//!     })
//!     .build()
//!     .unwrap();
//!
//! let _ = changeset.set("name", "");
//! assert!(changeset.is_invalid());
//! assert_eq!(changeset.get("name"), Some(json!("")));
//!
//! let _ = changeset.set("name", "Bob");
//! assert!(changeset.is_valid());
//!
//! changeset.execute();
//! assert_eq!(*changeset.data().borrow(), json!({ "name": "Bob" }));
//! ```

use crate::{
    Change, ChangesetError, Content, FieldError, PathMap, Settle, create_map,
    observer::{self, Event, Observer, Observers, SubscriptionId},
    path,
    validation::{self, ValidationContext, ValidationFuture, Validator, ValidatorError, Verdict},
};
use futures::FutureExt;
use serde_json::Value;
use std::{cell::RefCell, fmt, rc::Rc};
use tracing::{debug, trace};

mod merge;
mod snapshot;
mod views;

pub use snapshot::Snapshot;
pub use views::{FieldChange, InvalidField};

/// Behaviour switches for a changeset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Options {
    /// Accept every staged value without consulting the validator.
    pub skip_validate: bool,
}

/// How a validator settled for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The value was accepted.
    Accepted(Value),
    /// The value was rejected and recorded as an error.
    Rejected(FieldError),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }
}

/// The result of staging or re-validating a field.
pub type FieldResult = Result<Outcome, ChangesetError>;

#[derive(Debug)]
struct State {
    changes: PathMap<Change>,
    errors: PathMap<FieldError>,
    running: PathMap<usize>,
}

impl State {
    fn new() -> Self {
        Self {
            changes: create_map(),
            errors: create_map(),
            running: create_map(),
        }
    }

    /// The union of keys with a pending change or error.
    fn touched_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.changes.keys().cloned().collect();
        keys.extend(
            self.errors
                .keys()
                .filter(|key| !self.changes.contains_key(key.as_str()))
                .cloned(),
        );
        keys
    }
}

struct Shared<C> {
    content: Rc<RefCell<C>>,
    state: RefCell<State>,
    validator: Option<Rc<dyn Validator<C>>>,
    validation_keys: Vec<String>,
    options: Options,
    observers: RefCell<Observers>,
}

/// A buffered, validated overlay of edits to some [`Content`].
///
/// `Changeset` is a handle: clones refer to the same changes, errors and observers. See the
/// [module documentation](self) for how fields are resolved and validated.
pub struct Changeset<C: Content = Value> {
    shared: Rc<Shared<C>>,
}

impl<C: Content> Clone for Changeset<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

/// Configures and creates a [`Changeset`].
pub struct ChangesetBuilder<C: Content> {
    content: Rc<RefCell<C>>,
    validator: Option<Rc<dyn Validator<C>>>,
    validation_keys: Vec<String>,
    options: Options,
}

impl<C: Content> ChangesetBuilder<C> {
    /// Sets the validator consulted for every staged value.
    ///
    /// Without one, every value is accepted.
    pub fn validator(mut self, validator: impl Validator<C> + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Names the fields that [`Changeset::validate`] re-validates.
    ///
    /// With no validation keys, `validate` does nothing.
    pub fn validation_keys<K: Into<String>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.validation_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Creates the changeset.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::MissingContent`] if the content's root is not an object.
    pub fn build(self) -> Result<Changeset<C>, ChangesetError> {
        if !self.content.borrow().root().is_object() {
            return Err(ChangesetError::MissingContent);
        }
        Ok(Changeset::from_parts(
            self.content,
            self.validator,
            self.validation_keys,
            self.options,
            State::new(),
        ))
    }
}

impl<C: Content> Changeset<C> {
    /// Creates a changeset over owned content, with no validator and default options.
    pub fn new(content: C) -> Result<Self, ChangesetError> {
        Self::builder(content).build()
    }

    /// Starts configuring a changeset over owned content.
    pub fn builder(content: C) -> ChangesetBuilder<C> {
        Self::builder_shared(Rc::new(RefCell::new(content)))
    }

    /// Starts configuring a changeset over content that is shared with the caller (and possibly
    /// with other changesets, which can then be [merged](Self::merge)).
    pub fn builder_shared(content: Rc<RefCell<C>>) -> ChangesetBuilder<C> {
        ChangesetBuilder {
            content,
            validator: None,
            validation_keys: Vec::new(),
            options: Options::default(),
        }
    }

    fn from_parts(
        content: Rc<RefCell<C>>,
        validator: Option<Rc<dyn Validator<C>>>,
        validation_keys: Vec<String>,
        options: Options,
        state: State,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                content,
                state: RefCell::new(state),
                validator,
                validation_keys,
                options,
                observers: RefCell::new(Observers::default()),
            }),
        }
    }

    /// The underlying content.
    ///
    /// Only [`execute`](Self::execute) and [`save`](Self::save) write to it. Do not hold a borrow
    /// of it across calls into the changeset.
    pub fn data(&self) -> &Rc<RefCell<C>> {
        &self.shared.content
    }

    pub fn options(&self) -> Options {
        self.shared.options
    }

    /// Registers an observer for the events this changeset emits.
    pub fn subscribe(&self, observer: impl Observer + 'static) -> SubscriptionId {
        self.shared
            .observers
            .borrow_mut()
            .subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.observers.borrow_mut().unsubscribe(id);
    }

    fn emit(&self, events: &[Event]) {
        observer::dispatch(&self.shared.observers, events);
    }

    /// Returns the resolved value of the field at `key`.
    ///
    /// See the [module documentation](self) for the resolution order. `None` means the field
    /// exists neither in the changeset nor in the content.
    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.shared.state.borrow();
        if let Some(error) = state.errors.get(key) {
            return Some(error.value().clone());
        }
        if let Some(change) = state.changes.get(key) {
            return Some(change.value().clone());
        }
        if let Some((base, rest)) = path::split_base(key) {
            if let Some(change) = state.changes.get(base) {
                return match change.value() {
                    container @ (Value::Object(_) | Value::Array(_)) => {
                        path::get(container, rest).cloned()
                    }
                    other => Some(other.clone()),
                };
            }
        }
        drop(state);
        Content::get(&*self.shared.content.borrow(), key).cloned()
    }

    fn content_value(&self, key: &str) -> Option<Value> {
        Content::get(&*self.shared.content.borrow(), key).cloned()
    }

    /// Stages `value` for the field at `key` and validates it.
    ///
    /// The attempt is recorded right away, replacing any change or error for exactly this key
    /// (staging the content's current value drops the change instead). The validator then decides
    /// whether the value stays in the changes or moves to the errors. With
    /// [`Options::skip_validate`] the value is accepted without consulting the validator.
    ///
    /// Returns [`Settle::Pending`] while an asynchronous validator is running.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Settle<FieldResult> {
        let value = value.into();
        trace!(key, "staging field");
        self.record_attempt(key, value.clone());
        if self.shared.options.skip_validate {
            return Settle::Ready(Ok(self.apply_verdict(key, value, Value::Bool(true))));
        }
        self.validate_key(key, value)
    }

    fn record_attempt(&self, key: &str, value: Value) {
        let unchanged = self.content_value(key).as_ref() == Some(&value);
        let mut events = vec![Event::ChangesChanged];
        {
            let mut state = self.shared.state.borrow_mut();
            if unchanged {
                state.changes.shift_remove(key);
            } else {
                path::set_flat(&mut state.changes, key, Change::new(value));
            }
            if state.errors.shift_remove(key).is_some() {
                events.push(Event::ErrorsChanged);
            }
        }
        events.push(Event::Changed(key.to_owned()));
        self.emit(&events);
    }

    /// Re-runs validation.
    ///
    /// Does nothing unless [validation keys](ChangesetBuilder::validation_keys) were configured.
    /// With a `key`, only that field is re-validated (using its resolved value); without one,
    /// every validation key is, concurrently, and the result settles once all of them have.
    pub fn validate(&self, key: Option<&str>) -> Settle<Result<Vec<Outcome>, ChangesetError>> {
        if self.shared.validation_keys.is_empty() {
            return Settle::Ready(Ok(Vec::new()));
        }
        let runs: Vec<Settle<FieldResult>> = match key {
            Some(key) => vec![self.validate_key(key, self.get(key).unwrap_or(Value::Null))],
            None => self
                .shared
                .validation_keys
                .iter()
                .map(|key| self.validate_key(key, self.get(key).unwrap_or(Value::Null)))
                .collect(),
        };
        Settle::all(runs).map(|results| results.into_iter().collect())
    }

    fn run_validator(&self, key: &str, value: &Value) -> ValidationFuture {
        let Some(validator) = &self.shared.validator else {
            return validation::ready(true);
        };
        let changes = self.change();
        let content = self.shared.content.borrow();
        validator.validate(ValidationContext {
            key,
            new_value: value,
            old_value: Content::get(&*content, key),
            changes: &changes,
            content: &content,
        })
    }

    fn validate_key(&self, key: &str, value: Value) -> Settle<FieldResult> {
        let mut verdict = self.run_validator(key, &value);
        self.emit(&[Event::BeforeValidation(key.to_owned())]);

        if let Some(result) = (&mut verdict).now_or_never() {
            let outcome = self.settle(key, value, result);
            self.emit(&[Event::AfterValidation(key.to_owned())]);
            return Settle::Ready(outcome);
        }

        self.track_running(key, true);
        let running = Running {
            changeset: self.clone(),
            key: key.to_owned(),
        };
        Settle::Pending(
            async move {
                let result = verdict.await;
                let (this, key) = (running.changeset.clone(), running.key.clone());
                drop(running);
                this.settle(&key, value, result)
            }
            .boxed_local(),
        )
    }

    fn settle(
        &self,
        key: &str,
        value: Value,
        result: Result<Verdict, ValidatorError>,
    ) -> FieldResult {
        match result {
            Ok(verdict) => Ok(self.apply_verdict(key, value, verdict)),
            Err(source) => {
                debug!(key, error = %source, "validator failed");
                Err(ChangesetError::Validator {
                    key: key.to_owned(),
                    source,
                })
            }
        }
    }

    fn apply_verdict(&self, key: &str, value: Value, verdict: Verdict) -> Outcome {
        if !validation::is_valid(&verdict) {
            debug!(key, %verdict, "field rejected");
            let error = FieldError::new(value, verdict);
            self.write_error(key, error.clone());
            return Outcome::Rejected(error);
        }

        debug!(key, "field accepted");
        let differs = self.content_value(key).as_ref() != Some(&value);
        let mut events = Vec::new();
        {
            let mut state = self.shared.state.borrow_mut();
            let rescued = state.errors.shift_remove(key).is_some();
            if rescued {
                events.push(Event::ErrorsChanged);
            }
            // only a value staged for exactly this key goes back into the changes
            if rescued || state.changes.contains_key(key) {
                if differs {
                    path::set_flat(&mut state.changes, key, Change::new(value.clone()));
                } else {
                    state.changes.shift_remove(key);
                }
                events.push(Event::ChangesChanged);
            }
        }
        if !events.is_empty() {
            events.push(Event::Changed(key.to_owned()));
        }
        self.emit(&events);
        Outcome::Accepted(value)
    }

    fn track_running(&self, key: &str, started: bool) {
        let mut state = self.shared.state.borrow_mut();
        if started {
            *state.running.entry(key.to_owned()).or_default() += 1;
            return;
        }
        if let Some(count) = state.running.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                state.running.shift_remove(key);
            }
        }
    }

    /// Returns `true` while an asynchronous validation is in flight, for `key` or for any field.
    pub fn is_validating(&self, key: Option<&str>) -> bool {
        let state = self.shared.state.borrow();
        match key {
            Some(key) => state.running.contains_key(key),
            None => !state.running.is_empty(),
        }
    }

    fn write_error(&self, key: &str, error: FieldError) {
        let mut events = vec![Event::ErrorsChanged];
        {
            let mut state = self.shared.state.borrow_mut();
            path::set_flat(&mut state.errors, key, error);
            if state.changes.shift_remove(key).is_some() {
                events.push(Event::ChangesChanged);
            }
        }
        events.push(Event::Changed(key.to_owned()));
        self.emit(&events);
    }

    /// Records an error for the field at `key` by hand, replacing any change or error for it.
    ///
    /// `error` is either an object `{ "value": .., "validation": .. }`, or a bare validation
    /// reason, which is then paired with the field's currently resolved value. Returns `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::MalformedError`] if `error` is an object lacking `value` or
    /// `validation`.
    pub fn add_error(&self, key: &str, error: impl Into<Value>) -> Result<Value, ChangesetError> {
        let error = error.into();
        let entry = match &error {
            Value::Object(fields) => {
                let value = fields
                    .get("value")
                    .ok_or(ChangesetError::MalformedError { missing: "value" })?;
                let validation = fields
                    .get("validation")
                    .ok_or(ChangesetError::MalformedError {
                        missing: "validation",
                    })?;
                FieldError::new(value.clone(), validation.clone())
            }
            reason => FieldError::new(self.get(key).unwrap_or(Value::Null), reason.clone()),
        };
        self.write_error(key, entry);
        Ok(error)
    }

    /// Appends validation reasons to the error for `key`, creating the error if there is none.
    ///
    /// A single existing reason is turned into a list first. The error's value is the field's
    /// currently resolved value.
    pub fn push_errors<R: Into<Value>>(
        &self,
        key: &str,
        reasons: impl IntoIterator<Item = R>,
    ) -> FieldError {
        let value = self.get(key).unwrap_or(Value::Null);
        let mut validation = self
            .shared
            .state
            .borrow()
            .errors
            .get(key)
            .map(FieldError::reasons)
            .unwrap_or_default();
        validation.extend(reasons.into_iter().map(Into::into));
        let error = FieldError::new(value, Value::Array(validation));
        self.write_error(key, error.clone());
        error
    }

    /// Replaces the pending changes with what `prepare` makes of them.
    ///
    /// `prepare` receives the flat `{ path: value }` map of pending changes. Errors are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::OverlappingKeys`] if the prepared map holds a path along with one
    /// of its ancestors.
    pub fn prepare<F>(&self, prepare: F) -> Result<&Self, ChangesetError>
    where
        F: FnOnce(PathMap<Value>) -> PathMap<Value>,
    {
        let prepared = prepare(self.bare_changes());
        path::check_overlap("preparedChanges", prepared.keys().map(String::as_str))?;
        let mut changes = create_map();
        for (key, value) in prepared {
            changes.insert(key, Change::new(value));
        }
        self.shared.state.borrow_mut().changes = changes;
        self.emit(&[Event::ChangesChanged]);
        Ok(self)
    }

    /// Commits every pending change into the content.
    ///
    /// Only happens when there are no errors and at least one change; otherwise this does
    /// nothing. Pending changes and errors are kept either way.
    pub fn execute(&self) -> &Self {
        let commits: Vec<(String, Value)> = {
            let state = self.shared.state.borrow();
            if !state.errors.is_empty() || state.changes.is_empty() {
                debug!(
                    errors = state.errors.len(),
                    changes = state.changes.len(),
                    "nothing to execute"
                );
                return self;
            }
            state
                .changes
                .iter()
                .map(|(key, change)| (key.clone(), change.value().clone()))
                .collect()
        };
        debug!(changes = commits.len(), "committing changes into content");
        let mut content = self.shared.content.borrow_mut();
        for (key, value) in commits {
            path::set(content.root_mut(), &key, value);
        }
        self
    }

    /// Executes the changeset, saves the content, and rolls the changeset back.
    ///
    /// Returns the result of the content's save operation, or `None` if the content has none.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesetError::Save`] if saving fails; the changeset is not rolled back then.
    pub async fn save(&self, options: Option<Value>) -> Result<Option<Value>, ChangesetError> {
        self.execute();
        let pending = self.shared.content.borrow_mut().save(options.as_ref());
        let saved = match pending {
            Some(pending) => Some(pending.await?),
            None => None,
        };
        debug!(saved = saved.is_some(), "content saved");
        self.rollback();
        Ok(saved)
    }

    /// Discards all pending changes and errors.
    pub fn rollback(&self) -> &Self {
        let keys = {
            let mut state = self.shared.state.borrow_mut();
            let keys = state.touched_keys();
            state.changes.clear();
            state.errors.clear();
            keys
        };
        debug!(keys = keys.len(), "rolled back");
        let mut events: Vec<Event> = keys.into_iter().map(Event::Changed).collect();
        events.extend([
            Event::ChangesChanged,
            Event::ErrorsChanged,
            Event::AfterRollback,
        ]);
        self.emit(&events);
        self
    }

    /// Discards errors, keeping valid changes.
    ///
    /// With a `key`, only that field's error is discarded (along with its change, should it have
    /// both). Without one, every error is discarded, and so is the change of every errored key.
    pub fn rollback_invalid(&self, key: Option<&str>) -> &Self {
        let touched = {
            let mut state = self.shared.state.borrow_mut();
            match key {
                Some(key) => {
                    if state.errors.shift_remove(key).is_some() {
                        state.changes.shift_remove(key);
                    }
                    vec![key.to_owned()]
                }
                None => {
                    let touched = state.touched_keys();
                    let errored: Vec<String> = state.errors.drain(..).map(|(k, _)| k).collect();
                    for key in errored {
                        state.changes.shift_remove(&key);
                    }
                    touched
                }
            }
        };
        let mut events: Vec<Event> = touched.into_iter().map(Event::Changed).collect();
        events.extend([Event::ChangesChanged, Event::ErrorsChanged]);
        self.emit(&events);
        self
    }

    /// Discards the change and the error of exactly the field at `key`.
    pub fn rollback_property(&self, key: &str) -> &Self {
        {
            let mut state = self.shared.state.borrow_mut();
            state.changes.shift_remove(key);
            state.errors.shift_remove(key);
        }
        self.emit(&[
            Event::ChangesChanged,
            Event::ErrorsChanged,
            Event::Changed(key.to_owned()),
        ]);
        self
    }

    /// Keeps only the pending changes whose key is in `allowed`.
    ///
    /// An empty `allowed` list keeps everything: it means "no restriction", not "allow nothing".
    pub fn cast<S: AsRef<str>>(&self, allowed: &[S]) -> &Self {
        if allowed.is_empty() {
            return self;
        }
        let mut dropped = Vec::new();
        self.shared.state.borrow_mut().changes.retain(|key, _| {
            let keep = allowed.iter().any(|allowed| allowed.as_ref() == key.as_str());
            if !keep {
                dropped.push(key.clone());
            }
            keep
        });
        let mut events: Vec<Event> = dropped.into_iter().map(Event::Changed).collect();
        events.push(Event::ChangesChanged);
        self.emit(&events);
        self
    }
}

/// Marks one asynchronous validation of `key` as in flight.
///
/// Dropping it ends the validation, whether its future completed or was abandoned.
struct Running<C: Content> {
    changeset: Changeset<C>,
    key: String,
}

impl<C: Content> Drop for Running<C> {
    fn drop(&mut self) {
        self.changeset.track_running(&self.key, false);
        self.changeset
            .emit(&[Event::AfterValidation(std::mem::take(&mut self.key))]);
    }
}

impl<C: Content> fmt::Display for Changeset<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "changeset:{}", self.shared.content.borrow().root())
    }
}

impl<C: Content> fmt::Debug for Changeset<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Changeset")
            .field("changes", &state.changes)
            .field("errors", &state.errors)
            .field("running", &state.running)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}
