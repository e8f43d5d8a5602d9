// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use futures::{
    FutureExt,
    future::{self, LocalBoxFuture},
};
use std::{fmt, future::IntoFuture};

/// The result of an operation that may have to wait for an asynchronous validator.
///
/// Operations driven only by synchronous validators come back [`Ready`](Settle::Ready). When a
/// validator has not resolved yet, the operation comes back [`Pending`](Settle::Pending), and its
/// effect on the changeset is applied when the contained future completes. Pending results must
/// therefore be driven to completion (awaited, or spawned on a local executor); dropping one
/// abandons the validation, whose verdict is then never applied.
///
/// `Settle` implements [`IntoFuture`], so both cases can simply be `.await`ed.
#[must_use = "pending validations are only applied when driven to completion"]
pub enum Settle<T> {
    Ready(T),
    Pending(LocalBoxFuture<'static, T>),
}

impl<T: 'static> Settle<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Settle::Pending(_))
    }

    /// Returns the value if the operation completed synchronously.
    pub fn into_ready(self) -> Option<T> {
        match self {
            Settle::Ready(value) => Some(value),
            Settle::Pending(_) => None,
        }
    }

    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Settle<U> {
        match self {
            Settle::Ready(value) => Settle::Ready(f(value)),
            Settle::Pending(pending) => Settle::Pending(pending.map(f).boxed_local()),
        }
    }

    /// Joins several results, staying ready only if every one of them is ready.
    pub fn all(items: impl IntoIterator<Item = Settle<T>>) -> Settle<Vec<T>> {
        let items: Vec<_> = items.into_iter().collect();
        if items.iter().any(Settle::is_pending) {
            let pending = items.into_iter().map(IntoFuture::into_future);
            Settle::Pending(future::join_all(pending).boxed_local())
        } else {
            Settle::Ready(items.into_iter().filter_map(Settle::into_ready).collect())
        }
    }
}

impl<T: 'static> IntoFuture for Settle<T> {
    type Output = T;
    type IntoFuture = LocalBoxFuture<'static, T>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Settle::Ready(value) => future::ready(value).boxed_local(),
            Settle::Pending(pending) => pending,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settle::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Settle::Pending(_) => f.write_str("Pending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{channel::oneshot, executor::block_on};

    #[test]
    fn all_ready_stays_ready() {
        let joined = Settle::all([Settle::Ready(1), Settle::Ready(2)]);
        assert_eq!(joined.into_ready(), Some(vec![1, 2]));
    }

    #[test]
    fn all_waits_for_pending_parts() {
        let (tx, rx) = oneshot::channel();
        let pending = Settle::Pending(rx.map(|r| r.unwrap_or(0)).boxed_local());
        let joined = Settle::all([Settle::Ready(1), pending]).map(|v| v.iter().sum::<i32>());
        assert!(joined.is_pending());
        tx.send(41).unwrap();
        assert_eq!(block_on(joined.into_future()), 42);
    }
}
