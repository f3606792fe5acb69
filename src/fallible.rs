//! Tagged success-or-failure value.
//!
//! [`Fallible`] is the value a future completes with: either a success
//! carrying `T` or a failure carrying an [`Error`]. User thunks are captured
//! through [`Fallible::from_thunk`], which converts both `Err` returns and
//! panics into failures so nothing ever unwinds across an executor boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{Error, Result};

/// A value that is either a success or a failure.
#[derive(Debug, Clone)]
pub enum Fallible<T> {
    /// The computation produced a value.
    Success(T),
    /// The computation failed.
    Failure(Error),
}

impl<T> Fallible<T> {
    /// Captures a thunk, converting any raised condition into a failure.
    ///
    /// Both `Err` returns and panics become `Failure`; a panic is recorded
    /// as `ErrorKind::Panicked` with the payload text preserved.
    pub fn from_thunk<F>(thunk: F) -> Self
    where
        F: FnOnce() -> Result<T>,
    {
        match catch_unwind(AssertUnwindSafe(thunk)) {
            Ok(Ok(value)) => Self::Success(value),
            Ok(Err(err)) => Self::Failure(err),
            Err(payload) => Self::Failure(Error::panicked(payload.as_ref())),
        }
    }

    /// Returns true if this is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if this is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the error of a failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }

    /// Unwraps the success value, returning the error otherwise.
    pub fn lift_success(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(err) => Err(err),
        }
    }

    /// Applies `f` to the success value, passing failures through.
    pub fn map<U, F>(self, f: F) -> Fallible<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => Fallible::Success(f(value)),
            Self::Failure(err) => Fallible::Failure(err),
        }
    }

    /// Applies a fallible `f` to the success value, passing failures through.
    pub fn flat_map<U, F>(self, f: F) -> Fallible<U>
    where
        F: FnOnce(T) -> Fallible<U>,
    {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(err) => Fallible::Failure(err),
        }
    }
}

impl<T> From<Result<T>> for Fallible<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err),
        }
    }
}

impl<T> From<Fallible<T>> for Result<T> {
    fn from(fallible: Fallible<T>) -> Self {
        fallible.lift_success()
    }
}
