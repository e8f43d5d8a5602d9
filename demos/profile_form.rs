// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A profile form backed by a changeset.
//!
//! Field checks run synchronously, except for the username, which is looked up in a (simulated)
//! remote directory. Run with `RUST_LOG=changeset=debug` to follow what the changeset does.

use changeset::{
    Changeset, Event, ValidationContext, ValidationFuture, ValidatorError, observer, validation,
};
use futures::{FutureExt, channel::oneshot, executor::block_on};
use serde_json::{Value, json};
use std::{cell::RefCell, collections::VecDeque, future::IntoFuture, rc::Rc};
use tracing_subscriber::EnvFilter;

type Lookup = (String, oneshot::Sender<Result<Value, ValidatorError>>);

/// Usernames that are already in use.
const TAKEN: &[&str] = &["admin", "root"];

fn profile_validator(
    directory: Rc<RefCell<VecDeque<Lookup>>>,
) -> impl Fn(ValidationContext<'_, Value>) -> ValidationFuture {
    move |ctx| match (ctx.key, ctx.new_value) {
        ("username", Value::String(name)) => {
            let (respond, answer) = oneshot::channel();
            directory.borrow_mut().push_back((name.clone(), respond));
            async move {
                answer
                    .await
                    .unwrap_or_else(|_| Err(ValidatorError::new("directory went away")))
            }
            .boxed_local()
        }
        ("email", Value::String(email)) if !email.contains('@') => {
            validation::ready("must be an email address")
        }
        ("age", age) if age.as_u64().is_none() => validation::ready("must be a whole number"),
        (_, value) if validation::is_blank(value) => validation::ready("can't be blank"),
        _ => validation::ready(true),
    }
}

/// Answers every queued username lookup.
fn serve_directory(directory: &RefCell<VecDeque<Lookup>>) {
    while let Some((name, respond)) = directory.borrow_mut().pop_front() {
        let verdict = if TAKEN.contains(&name.as_str()) {
            json!(format!("{name} is taken"))
        } else {
            json!(true)
        };
        let _ = respond.send(Ok(verdict));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let profile = Rc::new(RefCell::new(json!({
        "username": "al",
        "email": "al@example.com",
        "age": 41,
        "address": { "city": "Oslo" }
    })));
    let directory = Rc::new(RefCell::new(VecDeque::new()));
    let form = Changeset::builder_shared(Rc::clone(&profile))
        .validator(profile_validator(Rc::clone(&directory)))
        .validation_keys(["username", "email", "age"])
        .build()
        .expect("the profile is an object");

    let reader = form.clone();
    form.subscribe(observer::from_fn(move |event| {
        if let Event::Changed(key) = event {
            println!("  {key} now reads {:?}", reader.get(key));
        }
    }));

    println!("typing an invalid email and age");
    let _ = form.set("email", "al-at-example.com");
    let _ = form.set("age", "forty");
    let _ = form.set("address.city", "Bergen");
    for error in form.errors() {
        println!("  {}: {} ({})", error.key, error.value, error.validation);
    }

    println!("picking a username that is taken");
    let pending = form.set("username", "admin");
    println!("  validating username: {}", form.is_validating(Some("username")));
    serve_directory(&directory);
    let outcome = block_on(pending.into_future());
    println!("  settled: {outcome:?}");

    println!("fixing every field");
    let _ = form.set("email", "al@example.org");
    let _ = form.set("age", 42);
    let pending = form.set("username", "al42");
    serve_directory(&directory);
    let _ = block_on(pending.into_future());

    let revalidation = form.validate(None);
    serve_directory(&directory);
    let outcomes = block_on(revalidation.into_future()).expect("the directory answers every lookup");
    println!(
        "  revalidated {} fields, valid: {}",
        outcomes.len(),
        form.is_valid()
    );

    println!("committing");
    println!("  pending: {}", form.change());
    form.execute();
    println!("  {form}");

    form.rollback();
    println!("  pristine again: {}", form.is_pristine());
}
