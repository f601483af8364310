//! Fork handles for background execution.
//!
//! `IO::fork` spawns a computation onto the shared runtime and immediately
//! yields a [`Fork`] handle. The handle owns two derived executions:
//! [`Fork::cancel`], which requests cooperative termination of the background
//! work, and [`Fork::join`], which awaits its outcome. The handle's lifetime
//! is independent of the original `IO` value — the two communicate only
//! through the completion channel.
//!
//! Cancellation is cooperative: the forked computation runs under a child
//! cancellation token and stops at its next checkpoint after `cancel` flips
//! it. A fork timeout is likewise advisory — at the deadline the child token
//! is cancelled and `join` resolves to a timeout failure, but a computation
//! that never checks the token can outlive its deadline.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::sync::oneshot;

use crate::env::{CancelToken, Env};
use crate::error::{EffectError, Fault, Outcome};

use super::{Eval, IO, runtime};

struct ForkInner<A, E> {
    token: CancelToken,
    receiver: Mutex<Option<oneshot::Receiver<Outcome<A, E>>>>,
    settled: OnceCell<Outcome<A, E>>,
}

/// A handle to one forked computation.
///
/// Cloning the handle shares the same background computation; the first
/// joined outcome is cached so every observer sees the same result.
pub struct Fork<A, E> {
    inner: Arc<ForkInner<A, E>>,
}

impl<A, E> Clone for Fork<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, E> Fork<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(token: CancelToken, receiver: oneshot::Receiver<Outcome<A, E>>) -> Self {
        Self {
            inner: Arc::new(ForkInner {
                token,
                receiver: Mutex::new(Some(receiver)),
                settled: OnceCell::new(),
            }),
        }
    }

    /// An execution that requests cancellation of the background work.
    ///
    /// Running it flips the fork's cancellation token and returns
    /// immediately; the background computation terminates at its next
    /// checkpoint.
    #[must_use]
    pub fn cancel(&self) -> IO<(), E> {
        let token = self.inner.token.clone();
        IO::from_env_outcome(move |_| {
            token.cancel();
            Ok(())
        })
    }

    /// An execution that awaits the background outcome.
    ///
    /// The first join receives the outcome from the completion channel and
    /// caches it; later joins (from this or any cloned handle) observe the
    /// cached outcome.
    #[must_use]
    pub fn join(&self) -> IO<A, E> {
        let inner = Arc::clone(&self.inner);
        IO {
            node: Arc::new(JoinNode { inner }),
        }
    }
}

struct JoinNode<A, E> {
    inner: Arc<ForkInner<A, E>>,
}

impl<A, E> JoinNode<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn settle(&self) -> Outcome<A, E> {
        self.inner
            .settled
            .get_or_init(|| async {
                let receiver = self.inner.receiver.lock().take();
                match receiver {
                    Some(receiver) => receiver.await.unwrap_or_else(|_| {
                        Err(EffectError::Fault(Fault::new(
                            "background computation terminated without reporting an outcome",
                        )))
                    }),
                    None => Err(EffectError::Fault(Fault::new(
                        "fork completion channel already consumed",
                    ))),
                }
            })
            .await
            .clone()
    }
}

impl<A, E> Eval<A, E> for JoinNode<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if let Some(outcome) = self.inner.settled.get() {
            return outcome.clone();
        }
        runtime::run_blocking(self.eval_async(env))
    }

    fn eval_async<'a>(&'a self, _env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(self.settle())
    }
}

pub(crate) struct ForkNode<A, E> {
    pub(crate) inner: IO<A, E>,
    pub(crate) timeout: Option<std::time::Duration>,
}

impl<A, E> Eval<Fork<A, E>, E> for ForkNode<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<Fork<A, E>, E> {
        let child_env = env.child();
        let token = child_env.token().clone();
        let (sender, receiver) = oneshot::channel();
        let inner = self.inner.clone();
        let timeout = self.timeout;

        runtime::handle().spawn(async move {
            let outcome = match timeout {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, inner.eval_future(&child_env)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            child_env.token().cancel();
                            Err(EffectError::TimedOut(deadline))
                        }
                    }
                }
                None => inner.eval_future(&child_env).await,
            };
            // The receiver may already be gone; the outcome is then dropped.
            let _ = sender.send(outcome);
        });

        Ok(Fork::new(token, receiver))
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<Fork<A, E>, E>> {
        Box::pin(async move { self.eval(env) })
    }
}
