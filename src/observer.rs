// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Observe what a changeset does.
//!
//! Observers are registered with [`Changeset::subscribe`](crate::Changeset::subscribe) and are
//! invoked synchronously, in registration order, for every [`Event`] an operation produces. A
//! binding layer typically listens for [`Event::Changed`] and re-reads the field through
//! [`Changeset::get`](crate::Changeset::get). Events are dispatched once the changeset has
//! released its internal state, so reading back from inside an observer is fine. Changes an
//! observer makes are announced once the events being delivered have reached every observer.
//!
//! For a testing-oriented observer, see [`RecordingObserver`].

use std::{cell::RefCell, rc::Rc};

/// Something a changeset announces to its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A validator is about to judge the field at this path.
    BeforeValidation(String),
    /// The validator for the field at this path has settled.
    AfterValidation(String),
    /// [`Changeset::rollback`](crate::Changeset::rollback) discarded everything.
    AfterRollback,
    /// The resolved value of the field at this path may have changed.
    Changed(String),
    /// The set of pending changes was modified.
    ChangesChanged,
    /// The set of pending errors was modified.
    ErrorsChanged,
}

/// Receives the events a changeset emits.
pub trait Observer {
    fn notify(&mut self, event: &Event);
}

/// An [`Observer`] backed by a closure. Create one with [`from_fn`].
pub struct FnObserver<F>(F);

impl<F: FnMut(&Event)> Observer for FnObserver<F> {
    fn notify(&mut self, event: &Event) {
        (self.0)(event)
    }
}

/// Turns a closure into an [`Observer`].
pub fn from_fn<F: FnMut(&Event)>(f: F) -> FnObserver<F> {
    FnObserver(f)
}

/// Identifies a registered observer, for [`Changeset::unsubscribe`](crate::Changeset::unsubscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// An observer that records every event it sees.
///
/// Clones share the same log, so keep one clone around to inspect the events after handing the
/// other to [`Changeset::subscribe`](crate::Changeset::subscribe).
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The events seen so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Returns the events seen so far and clears the log.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl Observer for RecordingObserver {
    fn notify(&mut self, event: &Event) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// The observers registered on one changeset.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn Observer>)>,
    dispatching: bool,
    // ids unsubscribed while their observer was out for dispatch
    detached: Vec<SubscriptionId>,
    // events emitted by observers during dispatch
    queued: Vec<Event>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        if self.entries.len() == before && self.dispatching {
            self.detached.push(id);
        }
    }
}

/// Delivers `events` to every observer in `observers`.
///
/// The observers are moved out of the cell for the duration of the dispatch, so that an observer
/// may subscribe, unsubscribe, read or modify the changeset without hitting an outstanding
/// borrow. Events emitted from within an observer are queued and delivered, in order, once the
/// current batch has reached every observer.
pub(crate) fn dispatch(observers: &RefCell<Observers>, events: &[Event]) {
    if events.is_empty() {
        return;
    }
    let mut active = {
        let mut state = observers.borrow_mut();
        if state.dispatching {
            state.queued.extend_from_slice(events);
            return;
        }
        if state.entries.is_empty() {
            return;
        }
        state.dispatching = true;
        std::mem::take(&mut state.entries)
    };
    let mut batch = events.to_vec();
    loop {
        for event in &batch {
            for (_, observer) in active.iter_mut() {
                observer.notify(event);
            }
        }
        let mut state = observers.borrow_mut();
        let detached = std::mem::take(&mut state.detached);
        active.retain(|(id, _)| !detached.contains(id));
        active.append(&mut state.entries);
        batch = std::mem::take(&mut state.queued);
        if batch.is_empty() {
            state.entries = active;
            state.dispatching = false;
            return;
        }
    }
}
