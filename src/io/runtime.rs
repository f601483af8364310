//! Shared tokio runtime for synchronous invocation and forking.
//!
//! The execution engine offers both a synchronous (`IO::run`) and an
//! awaitable (`IO::run_async`) invocation path, and `fork` must be able to
//! spawn background work from either. This module provides:
//!
//! 1. **A global runtime**: a lazily-initialized multi-thread runtime shared
//!    across all invocations, sized to the number of CPU cores. It has static
//!    lifetime and is never dropped.
//! 2. **Handle resolution**: [`handle`] prefers the current runtime's handle
//!    when called from inside one (preserving the caller's runtime context)
//!    and falls back to the global runtime otherwise.
//! 3. **Blocking execution**: [`try_run_blocking`] runs a future to
//!    completion from synchronous code, using `block_in_place` inside a
//!    multi-thread runtime to avoid nested-runtime panics, and erroring
//!    inside a current-thread runtime where that is not supported.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

static GLOBAL_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .expect("failed to create global tokio runtime")
});

/// Returns the global runtime, initializing it on first use.
#[inline]
#[must_use]
pub fn global() -> &'static Runtime {
    &GLOBAL_RUNTIME
}

/// Returns a handle to the current runtime if inside one, otherwise to the
/// global runtime.
#[inline]
#[must_use]
pub fn handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| global().handle().clone())
}

/// Error type for blocking execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingError {
    /// `block_in_place` is only supported in multi-thread runtimes, so a
    /// blocking invocation from within a current-thread runtime is refused.
    CurrentThreadRuntime,

    /// The runtime flavor is unknown; refused for forward compatibility
    /// rather than guessed at.
    UnsupportedRuntimeFlavor,
}

impl fmt::Display for BlockingError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentThreadRuntime => write!(
                formatter,
                "cannot execute blocking operation in current-thread runtime: \
                 block_in_place is only supported in multi-thread runtimes"
            ),
            Self::UnsupportedRuntimeFlavor => write!(
                formatter,
                "cannot execute blocking operation: the runtime flavor is not \
                 supported for blocking execution"
            ),
        }
    }
}

impl Error for BlockingError {}

/// Attempts to run a future to completion, blocking the current thread.
///
/// - Inside a multi-thread runtime: uses `block_in_place` with the current
///   handle, preserving the caller's runtime context.
/// - Inside a current-thread runtime: returns
///   [`BlockingError::CurrentThreadRuntime`].
/// - Outside any runtime: uses the global runtime's `block_on`.
///
/// # Errors
///
/// Returns a [`BlockingError`] when blocking execution is not possible in
/// the current context.
#[inline]
pub fn try_run_blocking<F, T>(future: F) -> Result<T, BlockingError>
where
    F: Future<Output = T>,
{
    if let Ok(current) = Handle::try_current() {
        match current.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| current.block_on(future)))
            }
            RuntimeFlavor::CurrentThread => Err(BlockingError::CurrentThreadRuntime),
            _ => Err(BlockingError::UnsupportedRuntimeFlavor),
        }
    } else {
        Ok(global().block_on(future))
    }
}

/// Runs a future to completion, blocking the current thread.
///
/// Convenience wrapper around [`try_run_blocking`].
///
/// # Panics
///
/// Panics when called from within a current-thread runtime.
#[inline]
pub fn run_blocking<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    try_run_blocking(future).expect("run_blocking failed")
}
