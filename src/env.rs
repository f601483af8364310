//! Invocation environment and cooperative cancellation.
//!
//! Every invocation in this crate (`IO::run`, `Process::reduce`,
//! `Effect::run`) threads an [`Env`] through the computation. The environment
//! carries the [`CancelToken`] that lifted effects, reduction loops, and
//! forked computations check before each step. Passing the environment
//! explicitly — rather than through ambient global state — lets the same
//! runtime serve multiple independent callers without cross-talk.
//!
//! Cancellation is cooperative: requesting cancellation flips a flag, and the
//! computation terminates with a cancellation failure at its next checkpoint.
//! A computation that never checks the token can outlive its cancellation
//! request.
//!
//! # Examples
//!
//! ```rust
//! use ravel::env::Env;
//!
//! let env = Env::new();
//! assert!(!env.token().is_cancelled());
//!
//! env.token().cancel();
//! assert!(env.token().is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cooperative cancellation signal.
///
/// The token is a cheap, cloneable handle to a shared flag. Cloned tokens
/// observe the same flag; [`CancelToken::child`] derives a new token that is
/// considered cancelled whenever either its own flag or any ancestor's flag
/// is set, while cancelling the child leaves the parent untouched. Forked
/// computations run under a child token so that cancelling the fork does not
/// disturb the caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token with no parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// This only flips the shared flag; running computations stop at their
    /// next checkpoint. Cancelling is idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if this token or any of its ancestors was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// Derives a child token.
    ///
    /// The child is cancelled when either the child itself or this token is
    /// cancelled; cancelling the child does not cancel this token.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }
}

/// The environment threaded through every invocation.
///
/// Currently the environment carries only the cancellation token. Host
/// capabilities (console, clock, tracing, ...) are expected to be functions
/// from `&Env` to an `IO` value and stay outside this crate.
#[derive(Clone, Debug, Default)]
pub struct Env {
    token: CancelToken,
}

impl Env {
    /// Creates a root environment with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an environment around an existing token.
    #[must_use]
    pub fn with_token(token: CancelToken) -> Self {
        Self { token }
    }

    /// The cancellation token for this invocation.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Derives an environment with a child token, suitable for handing to a
    /// forked computation.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn child_sees_parent_cancellation() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn parent_does_not_see_child_cancellation() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn env_child_derives_child_token() {
        let env = Env::new();
        let forked = env.child();
        env.token().cancel();
        assert!(forked.token().is_cancelled());
    }
}
