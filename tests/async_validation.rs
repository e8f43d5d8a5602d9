//! Tests for validators that answer asynchronously.
//!
//! Every validation issued by [`gated`] waits on a oneshot channel, so each test decides when,
//! and in which order, validations settle.

use changeset::{
    Changeset, ChangesetError, Event, Outcome, RecordingObserver, ValidationContext,
    ValidationFuture, ValidatorError,
};
use futures::{FutureExt, channel::oneshot, executor::block_on};
use serde_json::{Value, json};
use std::{cell::RefCell, error::Error, future::IntoFuture, rc::Rc};
use tracing_subscriber::EnvFilter;

type Gate = oneshot::Sender<Result<Value, ValidatorError>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A changeset whose validator blocks until its gate is opened.
fn gated(content: Value) -> (Changeset, Rc<RefCell<Vec<Gate>>>) {
    let gates = Rc::new(RefCell::new(Vec::new()));
    let issued = Rc::clone(&gates);
    let cs = Changeset::builder(content)
        .validator(move |_: ValidationContext<'_, Value>| -> ValidationFuture {
            let (gate, verdict) = oneshot::channel();
            issued.borrow_mut().push(gate);
            async move {
                verdict
                    .await
                    .unwrap_or_else(|_| Err(ValidatorError::new("validation abandoned")))
            }
            .boxed_local()
        })
        .validation_keys(["name", "email"])
        .build()
        .unwrap();
    (cs, gates)
}

fn open(gate: Gate, verdict: Value) {
    gate.send(Ok(verdict)).unwrap();
}

#[test]
fn pending_validations_are_tracked_per_field() {
    init_tracing();
    let (cs, gates) = gated(json!({ "name": "Al", "email": "al@example.com" }));

    let pending = cs.set("name", "");
    assert!(pending.is_pending());
    assert!(cs.is_validating(Some("name")));
    assert!(!cs.is_validating(Some("email")));
    assert!(cs.is_validating(None));

    // the attempt is visible before the verdict is in
    assert_eq!(cs.get("name"), Some(json!("")));
    assert!(cs.is_valid());

    open(gates.borrow_mut().remove(0), json!("can't be blank"));
    let outcome = block_on(pending.into_future()).unwrap();
    assert!(!outcome.is_accepted());
    assert!(!cs.is_validating(None));
    assert!(cs.is_invalid());
    assert_eq!(cs.get("name"), Some(json!("")));
}

#[test]
fn validations_of_different_fields_settle_independently() {
    let (cs, gates) = gated(json!({ "name": "Al", "email": "al@example.com" }));
    let name = cs.set("name", "Bob");
    let email = cs.set("email", "bob");
    let mut gates = gates.take();

    open(gates.remove(1), json!("must be an address"));
    block_on(email.into_future()).unwrap();
    assert!(cs.is_validating(Some("name")));
    assert!(!cs.is_validating(Some("email")));
    assert!(cs.error_for("email").is_some());

    open(gates.remove(0), json!(true));
    block_on(name.into_future()).unwrap();
    assert_eq!(cs.change(), json!({ "name": "Bob" }));
}

// Overlapping validations are not cancelled: the one that settles last decides, even if it was
// issued first.
#[test]
fn the_last_validation_to_settle_wins() {
    let (cs, gates) = gated(json!({ "name": "Al" }));
    let first = cs.set("name", "Bob");
    let second = cs.set("name", "");
    let mut gates = gates.take();
    let second_gate = gates.pop().unwrap();
    let first_gate = gates.pop().unwrap();

    open(second_gate, json!("can't be blank"));
    block_on(second.into_future()).unwrap();
    assert!(cs.is_invalid());
    assert!(cs.is_validating(Some("name")));

    open(first_gate, json!(true));
    block_on(first.into_future()).unwrap();
    assert!(!cs.is_validating(Some("name")));
    assert!(cs.is_valid());
    assert_eq!(cs.get("name"), Some(json!("Bob")));
}

#[test]
fn validate_without_a_key_waits_for_every_field() {
    let (cs, gates) = gated(json!({ "name": "", "email": "al@example.com" }));
    let all = cs.validate(None);
    assert!(all.is_pending());
    assert_eq!(gates.borrow().len(), 2);

    let mut gates = gates.take();
    open(gates.remove(1), json!(true));
    open(gates.remove(0), json!(["can't be blank"]));

    let outcomes = block_on(all.into_future()).unwrap();
    assert!(!outcomes[0].is_accepted());
    assert_eq!(outcomes[1], Outcome::Accepted(json!("al@example.com")));
    assert!(!cs.is_validating(None));
    assert_eq!(
        cs.error_for("name").map(|error| error.reasons()),
        Some(vec![json!("can't be blank")])
    );
    assert!(cs.is_pristine());
}

#[test]
fn a_failing_validator_is_reported_and_leaves_the_field_alone() {
    let (cs, gates) = gated(json!({ "name": "Al" }));
    let recorder = RecordingObserver::new();
    cs.subscribe(recorder.clone());

    let pending = cs.set("name", "Bob");
    gates
        .borrow_mut()
        .remove(0)
        .send(Err(ValidatorError::new("service unavailable")))
        .unwrap();

    let err = block_on(pending.into_future()).unwrap_err();
    assert!(matches!(&err, ChangesetError::Validator { key, .. } if key == "name"));
    assert_eq!(err.to_string(), "validator failed for key name");
    assert_eq!(
        err.source().map(ToString::to_string),
        Some("service unavailable".to_owned())
    );

    assert!(!cs.is_validating(None));
    assert!(cs.is_valid());
    assert_eq!(cs.get("name"), Some(json!("Bob")));
    assert_eq!(
        recorder.events().last(),
        Some(&Event::AfterValidation("name".to_owned()))
    );
}

#[test]
fn dropped_gates_fail_the_validation() {
    let (cs, gates) = gated(json!({ "name": "Al" }));
    let pending = cs.set("name", "Bob");
    gates.borrow_mut().clear();
    assert!(matches!(
        block_on(pending.into_future()),
        Err(ChangesetError::Validator { .. })
    ));
    assert!(!cs.is_validating(Some("name")));
}

#[test]
fn observers_see_validation_open_and_close() {
    let (cs, gates) = gated(json!({ "name": "Al" }));
    let recorder = RecordingObserver::new();
    cs.subscribe(recorder.clone());

    let pending = cs.set("name", "Bob");
    let before = recorder.take();
    assert!(before.contains(&Event::BeforeValidation("name".to_owned())));
    assert!(!before.contains(&Event::AfterValidation("name".to_owned())));

    open(gates.borrow_mut().remove(0), json!(true));
    block_on(pending.into_future()).unwrap();
    assert!(recorder
        .take()
        .contains(&Event::AfterValidation("name".to_owned())));
}

#[test]
fn dropped_validations_stop_counting_as_running() {
    let (cs, gates) = gated(json!({ "name": "Al" }));
    let recorder = RecordingObserver::new();
    cs.subscribe(recorder.clone());

    let _ = cs.set("name", "Bob");
    assert!(!cs.is_validating(None));
    assert_eq!(
        recorder.events().last(),
        Some(&Event::AfterValidation("name".to_owned()))
    );
    for gate in gates.take() {
        let _ = gate.send(Ok(json!(true)));
    }
    assert!(!cs.is_validating(None));
    assert_eq!(cs.get("name"), Some(json!("Bob")));

    let kept = cs.set("name", "Bobby");
    drop(cs.set("name", "Rob"));
    assert!(cs.is_validating(Some("name")));

    let mut gates = gates.take();
    let _ = gates.pop().unwrap().send(Ok(json!(true)));
    open(gates.pop().unwrap(), json!(true));
    assert!(block_on(kept.into_future()).unwrap().is_accepted());
    assert!(!cs.is_validating(None));
    assert_eq!(cs.get("name"), Some(json!("Bobby")));
}
