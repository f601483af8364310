//! Error taxonomy for the effect runtime.
//!
//! The runtime distinguishes three kinds of trouble:
//!
//! 1. **Typed failure** — an expected, domain-declared error value carried in
//!    the failure channel ([`EffectError::Failure`]). It composes and matches
//!    like any other value.
//! 2. **Runtime fault** — a panic raised by a lifted function. Faults
//!    propagate as panics through intermediate combinators and are converted
//!    into [`EffectError::Fault`] only at an invocation boundary
//!    (`IO::run` / `IO::run_async`) or by an explicit `IO::attempt`.
//! 3. **Bottom** — invoking an `IO` that was never constructed
//!    (`IO::default()`). That is a programming error and panics; it is never
//!    converted into an [`EffectError`].
//!
//! Cancellation and fork timeouts also surface through the failure channel,
//! as [`EffectError::Cancelled`] and [`EffectError::TimedOut`].

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// A captured runtime fault (panic payload).
///
/// Only the textual payload is preserved; `&str` and `String` payloads keep
/// their message, anything else becomes a fixed placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    /// Creates a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a fault from a panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "unknown panic".to_string()
        };
        Self { message }
    }

    /// The fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "runtime fault: {}", self.message)
    }
}

impl Error for Fault {}

/// The failure channel of an invocation.
///
/// `E` is the caller's typed failure; the remaining variants are produced by
/// the runtime itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectError<E> {
    /// An expected, domain-declared failure value.
    Failure(E),

    /// A runtime fault captured at an invocation boundary or by `attempt`.
    Fault(Fault),

    /// The cancellation token was observed set.
    Cancelled,

    /// A deadline elapsed before the computation finished.
    TimedOut(Duration),
}

impl<E> EffectError<E> {
    /// Returns `true` for [`EffectError::Failure`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns `true` for [`EffectError::Fault`].
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Returns `true` for [`EffectError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Extracts the typed failure, if any.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Maps the typed failure, leaving runtime-produced variants untouched.
    pub fn map_failure<E2>(self, function: impl FnOnce(E) -> E2) -> EffectError<E2> {
        match self {
            Self::Failure(error) => EffectError::Failure(function(error)),
            Self::Fault(fault) => EffectError::Fault(fault),
            Self::Cancelled => EffectError::Cancelled,
            Self::TimedOut(duration) => EffectError::TimedOut(duration),
        }
    }
}

impl<E: fmt::Display> fmt::Display for EffectError<E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(error) => write!(formatter, "failure: {error}"),
            Self::Fault(fault) => fault.fmt(formatter),
            Self::Cancelled => write!(formatter, "cancelled"),
            Self::TimedOut(duration) => {
                write!(formatter, "timed out after {duration:?}")
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> Error for EffectError<E> {}

/// The terminal outcome of one invocation.
pub type Outcome<A, E> = Result<A, EffectError<E>>;
