//! Step outcomes
//!
//! An [`Outcome`] is what every stage of a pipeline produces: either a typed
//! success value or an [`ErrorPayload`]. The error side is deliberately not a
//! type parameter. Each stage picks its own error type when it fails, and
//! stages that don't know that type only get to ask about it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result of running a stage (or a whole pipeline)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    /// Stage succeeded
    Ok(V),
    /// Stage failed with an opaque payload
    Error(ErrorPayload),
}

impl<V> Outcome<V> {
    /// Build the success variant
    pub fn ok(value: V) -> Self {
        Outcome::Ok(value)
    }

    /// Build the failure variant with an error of any shape
    pub fn error<E: ErrorValue>(error: E) -> Self {
        Outcome::Error(ErrorPayload::new(error))
    }

    /// The distinguished cancellation outcome
    pub fn cancelled() -> Self {
        Outcome::Error(ErrorPayload::new(Cancelled))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// True only for the cancellation outcome, never for domain errors
    pub fn is_cancelled(&self) -> bool {
        match self {
            Outcome::Error(payload) => payload.is_cancelled(),
            Outcome::Ok(_) => false,
        }
    }

    /// Success value, if any
    pub fn ok_value(self) -> Option<V> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Error payload, if any
    pub fn error_payload(&self) -> Option<&ErrorPayload> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Error(payload) => Some(payload),
        }
    }

    pub fn as_ref(&self) -> Outcome<&V> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(value),
            Outcome::Error(payload) => Outcome::Error(payload.clone()),
        }
    }

    /// Hand the outcome to code that works with `std::result::Result`
    pub fn into_result(self) -> Result<V, ErrorPayload> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Error(payload) => Err(payload),
        }
    }
}

/// Anything that can travel as an error payload.
///
/// Blanket-implemented; payloads need equality so outcomes keep value
/// semantics, and `Debug` so they can be logged without knowing their type.
pub trait ErrorValue: Any + PartialEq + fmt::Debug + Send + Sync {}

impl<E> ErrorValue for E where E: Any + PartialEq + fmt::Debug + Send + Sync {}

trait ErasedError: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn ErasedError) -> bool;
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn type_name(&self) -> &'static str;
}

impl<E: ErrorValue> ErasedError for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ErasedError) -> bool {
        other
            .as_any()
            .downcast_ref::<E>()
            .map_or(false, |other| self == other)
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }
}

/// Type-erased error carried by [`Outcome::Error`]
///
/// Cheap to clone. Two payloads are equal when they hold the same concrete
/// type with equal values.
#[derive(Clone)]
pub struct ErrorPayload {
    inner: Arc<dyn ErasedError>,
}

impl ErrorPayload {
    pub fn new<E: ErrorValue>(error: E) -> Self {
        // Re-raising a payload must not nest it
        if let Some(payload) = (&error as &dyn Any).downcast_ref::<ErrorPayload>() {
            return payload.clone();
        }
        Self {
            inner: Arc::new(error),
        }
    }

    fn erased(&self) -> &dyn ErasedError {
        &*self.inner
    }

    /// Capability check: does this payload hold an `E`?
    pub fn is<E: ErrorValue>(&self) -> bool {
        self.erased().as_any().is::<E>()
    }

    /// Borrow the payload as `E` if that's what it holds
    pub fn downcast_ref<E: ErrorValue>(&self) -> Option<&E> {
        self.erased().as_any().downcast_ref::<E>()
    }

    /// True when this is the cancellation marker rather than a domain error
    pub fn is_cancelled(&self) -> bool {
        self.is::<Cancelled>()
    }

    /// Name of the concrete payload type, for diagnostics only
    pub fn type_name(&self) -> &'static str {
        self.erased().type_name()
    }
}

impl PartialEq for ErrorPayload {
    fn eq(&self, other: &Self) -> bool {
        self.erased().dyn_eq(other.erased())
    }
}

impl fmt::Debug for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.erased().dyn_fmt(f)
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.erased().dyn_fmt(f)
    }
}

/// Payload of the cancellation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pipeline run was cancelled")]
pub struct Cancelled;
