//! Error types and error handling strategy for pactum.
//!
//! This module defines the error type carried inside every failed
//! [`Fallible`](crate::fallible::Fallible). Error handling follows these
//! principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors are `Clone`: a completed future delivers its value to every
//!   registered handler
//! - Panics are isolated at executor boundaries and converted to
//!   `ErrorKind::Panicked`; nothing unwinds across a submitted block

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation was cancelled, either explicitly or through a fired
    /// cancellation token.
    Cancelled,
    /// The owning execution context was gone before the operation ran or
    /// completed.
    ContextDeallocated,
    /// A user-supplied thunk panicked.
    Panicked,
    /// User-provided error, carried verbatim as the source.
    User,
}

/// The main error type for pactum operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// Creates an error marking the loss of the owning execution context.
    #[must_use]
    pub const fn context_deallocated() -> Self {
        Self::new(ErrorKind::ContextDeallocated)
    }

    /// Creates a user error wrapping an arbitrary error value.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates an error from a caught panic payload.
    ///
    /// The payload text is preserved as context when it is a string.
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let text = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(ErrorKind::Panicked).with_context(text)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error was produced by a deallocated context.
    #[must_use]
    pub const fn is_context_deallocated(&self) -> bool {
        matches!(self.kind, ErrorKind::ContextDeallocated)
    }

    /// Adds deterministic context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for pactum operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "Cancelled");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::Panicked).with_context("thunk exploded");
        assert_eq!(err.to_string(), "Panicked: thunk exploded");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::user(Underlying).with_context("outer");
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[test]
    fn predicates_match_kind() {
        assert!(Error::cancelled().is_cancelled());
        assert!(!Error::cancelled().is_context_deallocated());
        assert!(Error::context_deallocated().is_context_deallocated());
        assert!(!Error::context_deallocated().is_cancelled());
    }

    #[test]
    fn panic_payload_text_is_kept() {
        let err = Error::panicked(&"boom");
        assert_eq!(err.kind(), ErrorKind::Panicked);
        assert_eq!(err.to_string(), "Panicked: boom");

        let err = Error::panicked(&String::from("owned boom"));
        assert_eq!(err.to_string(), "Panicked: owned boom");
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), Error> = Err(Error::cancelled());
        let err = res.context("while waiting").expect_err("expected err");
        assert_eq!(err.to_string(), "Cancelled: while waiting");
    }
}
