//! Continuation combinators.
//!
//! An asynchronous operation is any future resolving to an [`Outcome`]. The
//! combinators here attach the next step to such an operation while keeping
//! its terminal state intact:
//!
//! - a canceled antecedent always yields a canceled result and the next step
//!   is never run;
//! - a faulted antecedent yields a fault carrying the *same* error value,
//!   never a wrapper around it (unless the `*_with_errors` form was used, in
//!   which case the next step receives the error and decides).
//!
//! Every call built on this crate is a chain of such steps (resolve URL,
//! send, decode), so a downstream caller can still match on the original
//! error kind.
//!
//! ```
//! use stratus_core::continuation::{chain, select, Outcome};
//!
//! # tokio_test::block_on(async {
//! let op = async { Outcome::<u32, String>::Completed(20) };
//! let doubled = select(op, |v| v * 2);
//! let text = chain(doubled, |v| async move { Outcome::Completed(v.to_string()) });
//! assert_eq!(text.await, Outcome::Completed("40".to_string()));
//! # });
//! ```

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Terminal state of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T, E = Error> {
    /// The operation produced a value.
    Completed(T),
    /// The operation failed with an error.
    Faulted(E),
    /// The operation stopped because cancellation was requested.
    Canceled,
}

impl<T, E> Outcome<T, E> {
    /// Run `operation` unless `token` has already been canceled.
    ///
    /// The check happens once, before the operation is first polled. A future
    /// that has started (a request in flight) is never pre-empted.
    pub async fn guard<F>(token: &CancellationToken, operation: F) -> Self
    where
        F: Future<Output = Result<T, E>>,
    {
        if token.is_cancelled() {
            return Self::Canceled;
        }
        operation.await.into()
    }

    /// True for [`Outcome::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// True for [`Outcome::Faulted`].
    #[must_use]
    pub const fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    /// True for [`Outcome::Canceled`].
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Map the completed value, leaving faults and cancellation untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Faulted(err) => Outcome::Faulted(err),
            Self::Canceled => Outcome::Canceled,
        }
    }

    /// Convert into a `Result`, or `None` when the operation was canceled.
    #[must_use]
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Self::Completed(value) => Some(Ok(value)),
            Self::Faulted(err) => Some(Err(err)),
            Self::Canceled => None,
        }
    }

    /// The completed value, if any.
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// The fault, if any.
    #[must_use]
    pub fn fault(self) -> Option<E> {
        match self {
            Self::Faulted(err) => Some(err),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(err) => Self::Faulted(err),
        }
    }
}

/// Apply `transform` to the value of a completed operation.
pub async fn select<T, U, E, Op, F>(operation: Op, transform: F) -> Outcome<U, E>
where
    Op: Future<Output = Outcome<T, E>>,
    F: FnOnce(T) -> U,
{
    operation.await.map(transform)
}

/// Like [`select`], but `transform` may itself fail.
pub async fn try_select<T, U, E, Op, F>(operation: Op, transform: F) -> Outcome<U, E>
where
    Op: Future<Output = Outcome<T, E>>,
    F: FnOnce(T) -> Result<U, E>,
{
    match operation.await {
        Outcome::Completed(value) => transform(value).into(),
        Outcome::Faulted(err) => Outcome::Faulted(err),
        Outcome::Canceled => Outcome::Canceled,
    }
}

/// Apply `transform` to a completed *or* faulted operation.
///
/// `transform` receives the antecedent as a `Result` and handles the failure
/// itself. A canceled antecedent still short-circuits.
pub async fn select_with_errors<T, U, E, Op, F>(operation: Op, transform: F) -> Outcome<U, E>
where
    Op: Future<Output = Outcome<T, E>>,
    F: FnOnce(Result<T, E>) -> Result<U, E>,
{
    match operation.await.into_result() {
        Some(antecedent) => transform(antecedent).into(),
        None => Outcome::Canceled,
    }
}

/// Start the asynchronous step returned by `transform` once the operation
/// completes, and resolve to that step's outcome.
pub async fn chain<T, U, E, Op, F, Next>(operation: Op, transform: F) -> Outcome<U, E>
where
    Op: Future<Output = Outcome<T, E>>,
    F: FnOnce(T) -> Next,
    Next: Future<Output = Outcome<U, E>>,
{
    match operation.await {
        Outcome::Completed(value) => transform(value).await,
        Outcome::Faulted(err) => Outcome::Faulted(err),
        Outcome::Canceled => Outcome::Canceled,
    }
}

/// Like [`chain`], but `transform` also runs for a faulted antecedent.
pub async fn chain_with_errors<T, U, E, Op, F, Next>(operation: Op, transform: F) -> Outcome<U, E>
where
    Op: Future<Output = Outcome<T, E>>,
    F: FnOnce(Result<T, E>) -> Next,
    Next: Future<Output = Outcome<U, E>>,
{
    match operation.await.into_result() {
        Some(antecedent) => transform(antecedent).await,
        None => Outcome::Canceled,
    }
}
