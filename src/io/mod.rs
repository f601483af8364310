//! IO execution engine — deferred, composable units of work.
//!
//! An [`IO<A, E>`] is an immutable description of a computation that, when
//! invoked, produces exactly one terminal outcome: a success value `A`, a
//! typed failure `E`, or a runtime-produced failure (captured fault,
//! cancellation, timeout). Side effects happen only at invocation time —
//! never at construction or composition time.
//!
//! # Lifecycle
//!
//! A value is *constructed* ([`IO::pure`], [`IO::fail`], [`IO::lift`],
//! [`IO::lift_async`], ...), optionally *combined* ([`IO::fmap`],
//! [`IO::flat_map`], [`IO::or_else`], [`IO::memo`], [`IO::retry`], ...), and
//! finally *invoked* ([`IO::run`] or [`IO::run_async`]) against an
//! environment carrying the cancellation token. Descriptions are cheaply
//! cloneable and re-runnable; every invocation evaluates the effects afresh
//! unless [`IO::memo`] caches the first terminal outcome.
//!
//! # Faults vs failures
//!
//! A panic raised by a lifted function is **not** caught by intermediate
//! combinators: it propagates as a panic until it reaches the invocation
//! boundary (`run`/`run_async`), where it is converted into
//! [`EffectError::Fault`] — or until an explicit [`IO::attempt`], which
//! performs that conversion earlier at an opt-in cost. This keeps the common
//! path free of per-step unwinding.
//!
//! Invoking a default-constructed `IO` (`IO::default()`) is a programming
//! error, not a domain failure: it panics, and the panic is deliberately not
//! converted into a fault at the boundary.
//!
//! # Examples
//!
//! ```rust
//! use ravel::env::Env;
//! use ravel::io::IO;
//!
//! let env = Env::new();
//! let io = IO::<i32, String>::pure(10)
//!     .fmap(|x| x * 2)
//!     .flat_map(|x| IO::pure(x + 1));
//! assert_eq!(io.run(&env), Ok(21));
//! ```
//!
//! Side effects are deferred:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use ravel::env::Env;
//! use ravel::io::IO;
//!
//! let executed = Arc::new(AtomicBool::new(false));
//! let probe = executed.clone();
//! let io = IO::<i32, String>::lift(move || {
//!     probe.store(true, Ordering::SeqCst);
//!     42
//! });
//!
//! assert!(!executed.load(Ordering::SeqCst));
//! assert_eq!(io.run(&Env::new()), Ok(42));
//! assert!(executed.load(Ordering::SeqCst));
//! ```

pub mod runtime;

mod fork;

pub use fork::Fork;

use std::fmt;
use std::future::Future;
use std::ops::{BitOr, ControlFlow};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::env::Env;
use crate::error::{EffectError, Fault, Outcome};
use crate::schedule::Schedule;

// =============================================================================
// Evaluation Contract
// =============================================================================

/// Internal evaluation contract shared by the synchronous and awaitable
/// invocation paths. Node evaluation never captures panics; the conversion
/// to [`EffectError::Fault`] happens at the `run`/`run_async` boundary or in
/// an explicit attempt node.
pub(crate) trait Eval<A, E>: Send + Sync {
    fn eval(&self, env: &Env) -> Outcome<A, E>;

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>>;
}

/// Panic payload used to mark invocation of a never-constructed IO. The run
/// boundary re-raises it instead of converting it into a fault.
struct BottomInvoked;

// =============================================================================
// IO
// =============================================================================

/// A deferred, composable unit of work.
///
/// See the [module documentation](self) for the execution model.
pub struct IO<A, E> {
    pub(crate) node: Arc<dyn Eval<A, E>>,
}

impl<A, E> Clone for IO<A, E> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A, E> fmt::Debug for IO<A, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("IO").finish_non_exhaustive()
    }
}

/// Invoking a defaulted IO panics; the default exists so that containers of
/// IO values can be initialized before being filled in.
impl<A: Send + 'static, E: Send + 'static> Default for IO<A, E> {
    fn default() -> Self {
        Self {
            node: Arc::new(BottomNode),
        }
    }
}

impl<A, E> IO<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Wraps an already-computed value. No side effects.
    pub fn pure(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self {
            node: Arc::new(PureNode(value)),
        }
    }

    /// A computation that terminally fails with the given typed error.
    pub fn fail(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Self {
            node: Arc::new(FailNode(error)),
        }
    }

    /// Wraps a synchronous side-effecting function.
    ///
    /// The function runs once per invocation, never at construction time.
    pub fn lift<F>(function: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(LiftNode(function)),
        }
    }

    /// Wraps a synchronous function that may fail with a typed error.
    pub fn lift_result<F>(function: F) -> Self
    where
        F: Fn() -> Result<A, E> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(LiftResultNode(function)),
        }
    }

    /// Wraps an asynchronous side-effecting function.
    ///
    /// On the synchronous invocation path the future is driven by the shared
    /// runtime (see [`runtime`]).
    pub fn lift_async<F, Fut>(function: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = A> + Send + 'static,
    {
        Self {
            node: Arc::new(LiftAsyncNode(function)),
        }
    }

    /// Wraps an asynchronous function that may fail with a typed error.
    pub fn lift_async_result<F, Fut>(function: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        Self {
            node: Arc::new(LiftAsyncResultNode(function)),
        }
    }

    /// Wraps a capability-style function from the environment.
    ///
    /// This is the adapter shape host capabilities take: a pure description
    /// `&Env -> Result` that is only consulted at invocation time.
    pub fn lift_env<F>(function: F) -> Self
    where
        F: Fn(&Env) -> Result<A, E> + Send + Sync + 'static,
    {
        Self::from_env_outcome(move |env| function(env).map_err(EffectError::Failure))
    }

    pub(crate) fn from_env_outcome<F>(function: F) -> Self
    where
        F: Fn(&Env) -> Outcome<A, E> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(EnvNode(function)),
        }
    }

    // =========================================================================
    // Combinators
    // =========================================================================

    /// Transforms the success value with a pure function.
    pub fn fmap<B, F>(self, function: F) -> IO<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        IO {
            node: Arc::new(MapNode {
                source: self,
                function,
            }),
        }
    }

    /// Sequential composition: feeds the success value to a continuation.
    ///
    /// Typed failures short-circuit the chain. Satisfies the monad laws.
    pub fn flat_map<B, F>(self, continuation: F) -> IO<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> IO<B, E> + Send + Sync + 'static,
    {
        IO {
            node: Arc::new(BindNode {
                source: self,
                continuation,
            }),
        }
    }

    /// Alias for [`IO::flat_map`].
    pub fn and_then<B, F>(self, continuation: F) -> IO<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> IO<B, E> + Send + Sync + 'static,
    {
        self.flat_map(continuation)
    }

    /// Sequences two computations, discarding the first result.
    pub fn then<B>(self, next: IO<B, E>) -> IO<B, E>
    where
        B: Send + 'static,
    {
        self.flat_map(move |_| next.clone())
    }

    /// Combines two computations with a function, running them in order.
    pub fn map2<B, C, F>(self, other: IO<B, E>, function: F) -> IO<C, E>
    where
        A: Clone + Sync,
        B: Send + 'static,
        C: Send + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        self.flat_map(move |a| {
            let function = Arc::clone(&function);
            other.clone().fmap(move |b| function(a.clone(), b))
        })
    }

    /// Combines two computations into a pair, running them in order.
    pub fn product<B>(self, other: IO<B, E>) -> IO<(A, B), E>
    where
        A: Clone + Sync,
        B: Send + 'static,
    {
        self.map2(other, |a, b| (a, b))
    }

    /// Turns a success that fails the predicate into a typed failure.
    pub fn filter_or_else<P, G>(self, predicate: P, to_error: G) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
        G: Fn(&A) -> E + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(FilterNode {
                inner: self,
                predicate,
                to_error,
            }),
        }
    }

    /// Converts a downstream runtime fault into a typed failure value.
    ///
    /// Without `attempt`, panics raised by lifted functions propagate until
    /// the invocation boundary. Wrapping adds unwinding overhead to this
    /// step, so it is opt-in.
    #[must_use]
    pub fn attempt(self) -> Self {
        Self {
            node: Arc::new(AttemptNode { inner: self }),
        }
    }

    /// Fallback: if this computation fails, run `alternative`.
    ///
    /// Evaluation is strictly sequential — this is not a race. The
    /// alternative runs on a typed failure, a fault already converted into
    /// the failure channel, or a timeout; a success returns without
    /// evaluating the alternative, and cancellation propagates unhandled.
    ///
    /// Also available as the `|` operator.
    #[must_use]
    pub fn or_else(self, alternative: Self) -> Self {
        Self {
            node: Arc::new(OrElseNode {
                first: self,
                second: alternative,
            }),
        }
    }

    /// Fallback through a handler that inspects the failure.
    ///
    /// Like [`IO::or_else`], cancellation is not handed to the handler.
    pub fn or_else_with<F>(self, handler: F) -> Self
    where
        F: Fn(EffectError<E>) -> IO<A, E> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(OrElseWithNode {
                first: self,
                handler,
            }),
        }
    }

    /// Caches the first terminal outcome.
    ///
    /// The first invocation runs the underlying effects and stores the
    /// outcome; every later invocation returns the cached outcome without
    /// re-running anything. Under concurrent first invocations exactly one
    /// caller pays for the side effect and all callers observe the same
    /// outcome.
    #[must_use]
    pub fn memo(self) -> Self
    where
        A: Clone + Sync,
        E: Clone + Sync,
    {
        Self {
            node: Arc::new(MemoNode {
                inner: self,
                cell: OnceCell::new(),
            }),
        }
    }

    /// Fails with [`EffectError::TimedOut`] if the computation does not
    /// finish within `duration`.
    ///
    /// The deadline is enforced cooperatively on the awaitable path; a
    /// synchronous step that never yields can overrun it.
    #[must_use]
    pub fn timeout(self, duration: Duration) -> Self {
        Self {
            node: Arc::new(TimeoutNode {
                inner: self,
                duration,
            }),
        }
    }

    /// Schedules the computation on background execution.
    ///
    /// Invoking the returned `IO` spawns the work onto the shared runtime
    /// and immediately yields a [`Fork`] handle without blocking. The
    /// optional timeout cancels the background work at the deadline and
    /// resolves the handle's join to a timeout failure.
    pub fn fork(self, timeout: Option<Duration>) -> IO<Fork<A, E>, E>
    where
        A: Clone + Sync,
        E: Clone + Sync,
    {
        IO {
            node: Arc::new(fork::ForkNode {
                inner: self,
                timeout,
            }),
        }
    }

    /// Stack-safe monadic recursion.
    ///
    /// Drives `step` in an explicit loop: `Continue(state)` feeds the next
    /// iteration, `Break(value)` finishes. Intermediate continuations are
    /// not retained, so arbitrarily deep recursive chains run in constant
    /// stack space.
    pub fn tail_rec<S, F>(initial: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> IO<ControlFlow<A, S>, E> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(TailRecNode { initial, step }),
        }
    }

    /// Re-runs the computation on success, as driven by the schedule.
    ///
    /// After each success the next delay is taken from the schedule: if one
    /// is present the driver sleeps and runs again, otherwise the last
    /// success is returned. `Schedule::recurs(n)` therefore produces `n + 1`
    /// executions. A failure mid-stream returns that failure.
    #[must_use]
    pub fn repeat(self, schedule: Schedule) -> Self {
        Self {
            node: Arc::new(RepeatNode {
                inner: self,
                schedule,
            }),
        }
    }

    /// Re-runs the computation on failure, as driven by the schedule.
    ///
    /// Dual of [`IO::repeat`]: after each failure the next delay is taken
    /// from the schedule; on exhaustion the last failure is returned.
    /// `Schedule::recurs(n)` allows `n + 1` attempts in total. Cancellation
    /// stops retrying immediately.
    #[must_use]
    pub fn retry(self, schedule: Schedule) -> Self {
        Self {
            node: Arc::new(RetryNode {
                inner: self,
                schedule,
            }),
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Invokes the computation synchronously.
    ///
    /// Uncaught panics from lifted functions are captured here into
    /// [`EffectError::Fault`]. Invoking a defaulted IO panics instead.
    pub fn run(&self, env: &Env) -> Outcome<A, E> {
        match catch_unwind(AssertUnwindSafe(|| self.node.eval(env))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                if payload.is::<BottomInvoked>() {
                    resume_unwind(payload);
                }
                Err(EffectError::Fault(Fault::from_panic(payload.as_ref())))
            }
        }
    }

    /// Invokes the computation on the awaitable path.
    ///
    /// Shares the fault-capture contract of [`IO::run`].
    pub async fn run_async(&self, env: &Env) -> Outcome<A, E> {
        match AssertUnwindSafe(self.node.eval_async(env)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                if payload.is::<BottomInvoked>() {
                    resume_unwind(payload);
                }
                Err(EffectError::Fault(Fault::from_panic(payload.as_ref())))
            }
        }
    }

    pub(crate) fn eval(&self, env: &Env) -> Outcome<A, E> {
        self.node.eval(env)
    }

    pub(crate) fn eval_future<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        self.node.eval_async(env)
    }
}

// =============================================================================
// Convenience Constructors
// =============================================================================

impl<E: Send + 'static> IO<(), E> {
    /// A computation that prints a line to standard output when invoked.
    pub fn print_line<S: fmt::Display + Send + Sync + 'static>(message: S) -> Self {
        Self::lift(move || println!("{message}"))
    }

    /// A computation that sleeps for the given duration when invoked.
    ///
    /// Checks the cancellation token before sleeping.
    #[must_use]
    pub fn delay(duration: Duration) -> Self {
        Self {
            node: Arc::new(DelayNode(duration)),
        }
    }
}

impl<A, E> BitOr for IO<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    type Output = Self;

    /// `first | second` — see [`IO::or_else`].
    fn bitor(self, rhs: Self) -> Self {
        self.or_else(rhs)
    }
}

// =============================================================================
// Nodes
// =============================================================================

struct PureNode<A>(A);

impl<A, E> Eval<A, E> for PureNode<A>
where
    A: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    fn eval(&self, _env: &Env) -> Outcome<A, E> {
        Ok(self.0.clone())
    }

    fn eval_async<'a>(&'a self, _env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        let value = self.0.clone();
        Box::pin(async move { Ok(value) })
    }
}

struct FailNode<E>(E);

impl<A, E> Eval<A, E> for FailNode<E>
where
    A: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn eval(&self, _env: &Env) -> Outcome<A, E> {
        Err(EffectError::Failure(self.0.clone()))
    }

    fn eval_async<'a>(&'a self, _env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        let error = self.0.clone();
        Box::pin(async move { Err(EffectError::Failure(error)) })
    }
}

struct BottomNode;

impl<A, E> Eval<A, E> for BottomNode
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, _env: &Env) -> Outcome<A, E> {
        std::panic::panic_any(BottomInvoked);
    }

    fn eval_async<'a>(&'a self, _env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        std::panic::panic_any(BottomInvoked);
    }
}

struct LiftNode<F>(F);

impl<A, E, F> Eval<A, E> for LiftNode<F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn() -> A + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        Ok((self.0)())
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move { self.eval(env) })
    }
}

struct LiftResultNode<F>(F);

impl<A, E, F> Eval<A, E> for LiftResultNode<F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Result<A, E> + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        (self.0)().map_err(EffectError::Failure)
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move { self.eval(env) })
    }
}

struct LiftAsyncNode<F>(F);

impl<A, E, F, Fut> Eval<A, E> for LiftAsyncNode<F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = A> + Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        Ok(runtime::run_blocking((self.0)()))
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            Ok((self.0)().await)
        })
    }
}

struct LiftAsyncResultNode<F>(F);

impl<A, E, F, Fut> Eval<A, E> for LiftAsyncResultNode<F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, E>> + Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        runtime::run_blocking((self.0)()).map_err(EffectError::Failure)
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            (self.0)().await.map_err(EffectError::Failure)
        })
    }
}

struct EnvNode<F>(F);

impl<A, E, F> Eval<A, E> for EnvNode<F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn(&Env) -> Outcome<A, E> + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        (self.0)(env)
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move { self.eval(env) })
    }
}

struct MapNode<X, E, F> {
    source: IO<X, E>,
    function: F,
}

impl<X, A, E, F> Eval<A, E> for MapNode<X, E, F>
where
    X: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
    F: Fn(X) -> A + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        let value = self.source.eval(env)?;
        Ok((self.function)(value))
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            let value = self.source.eval_future(env).await?;
            Ok((self.function)(value))
        })
    }
}

struct BindNode<X, E, F> {
    source: IO<X, E>,
    continuation: F,
}

impl<X, A, E, F> Eval<A, E> for BindNode<X, E, F>
where
    X: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
    F: Fn(X) -> IO<A, E> + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        let value = self.source.eval(env)?;
        (self.continuation)(value).eval(env)
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            let value = self.source.eval_future(env).await?;
            let next = (self.continuation)(value);
            next.eval_future(env).await
        })
    }
}

struct FilterNode<X, E, P, G> {
    inner: IO<X, E>,
    predicate: P,
    to_error: G,
}

impl<A, E, P, G> Eval<A, E> for FilterNode<A, E, P, G>
where
    A: Send + 'static,
    E: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync + 'static,
    G: Fn(&A) -> E + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        let value = self.inner.eval(env)?;
        if (self.predicate)(&value) {
            Ok(value)
        } else {
            Err(EffectError::Failure((self.to_error)(&value)))
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            let value = self.inner.eval_future(env).await?;
            if (self.predicate)(&value) {
                Ok(value)
            } else {
                Err(EffectError::Failure((self.to_error)(&value)))
            }
        })
    }
}

struct AttemptNode<A, E> {
    inner: IO<A, E>,
}

impl<A, E> Eval<A, E> for AttemptNode<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        match catch_unwind(AssertUnwindSafe(|| self.inner.eval(env))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                if payload.is::<BottomInvoked>() {
                    resume_unwind(payload);
                }
                Err(EffectError::Fault(Fault::from_panic(payload.as_ref())))
            }
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            match AssertUnwindSafe(self.inner.eval_future(env))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    if payload.is::<BottomInvoked>() {
                        resume_unwind(payload);
                    }
                    Err(EffectError::Fault(Fault::from_panic(payload.as_ref())))
                }
            }
        })
    }
}

struct OrElseNode<A, E> {
    first: IO<A, E>,
    second: IO<A, E>,
}

impl<A, E> Eval<A, E> for OrElseNode<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        match self.first.eval(env) {
            Ok(value) => Ok(value),
            Err(EffectError::Cancelled) => Err(EffectError::Cancelled),
            Err(_) => self.second.eval(env),
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            match self.first.eval_future(env).await {
                Ok(value) => Ok(value),
                Err(EffectError::Cancelled) => Err(EffectError::Cancelled),
                Err(_) => self.second.eval_future(env).await,
            }
        })
    }
}

struct OrElseWithNode<A, E, F> {
    first: IO<A, E>,
    handler: F,
}

impl<A, E, F> Eval<A, E> for OrElseWithNode<A, E, F>
where
    A: Send + 'static,
    E: Send + 'static,
    F: Fn(EffectError<E>) -> IO<A, E> + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        match self.first.eval(env) {
            Ok(value) => Ok(value),
            Err(EffectError::Cancelled) => Err(EffectError::Cancelled),
            Err(error) => (self.handler)(error).eval(env),
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            match self.first.eval_future(env).await {
                Ok(value) => Ok(value),
                Err(EffectError::Cancelled) => Err(EffectError::Cancelled),
                Err(error) => {
                    let next = (self.handler)(error);
                    next.eval_future(env).await
                }
            }
        })
    }
}

struct MemoNode<A, E> {
    inner: IO<A, E>,
    cell: OnceCell<Outcome<A, E>>,
}

impl<A, E> Eval<A, E> for MemoNode<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        if let Some(outcome) = self.cell.get() {
            return outcome.clone();
        }
        runtime::run_blocking(self.eval_async(env))
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            self.cell
                .get_or_init(|| async { self.inner.eval_future(env).await })
                .await
                .clone()
        })
    }
}

struct TimeoutNode<A, E> {
    inner: IO<A, E>,
    duration: Duration,
}

impl<A, E> Eval<A, E> for TimeoutNode<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        runtime::run_blocking(self.eval_async(env))
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            match tokio::time::timeout(self.duration, self.inner.eval_future(env)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(EffectError::TimedOut(self.duration)),
            }
        })
    }
}

struct DelayNode(Duration);

impl<E> Eval<(), E> for DelayNode
where
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<(), E> {
        if env.token().is_cancelled() {
            return Err(EffectError::Cancelled);
        }
        std::thread::sleep(self.0);
        Ok(())
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<(), E>> {
        Box::pin(async move {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            tokio::time::sleep(self.0).await;
            Ok(())
        })
    }
}

struct TailRecNode<S, F> {
    initial: S,
    step: F,
}

impl<S, A, E, F> Eval<A, E> for TailRecNode<S, F>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
    E: Send + 'static,
    F: Fn(S) -> IO<ControlFlow<A, S>, E> + Send + Sync + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        let mut state = self.initial.clone();
        loop {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            match (self.step)(state).eval(env)? {
                ControlFlow::Continue(next) => state = next,
                ControlFlow::Break(value) => return Ok(value),
            }
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            let mut state = self.initial.clone();
            loop {
                if env.token().is_cancelled() {
                    return Err(EffectError::Cancelled);
                }
                let next = (self.step)(state);
                match next.eval_future(env).await? {
                    ControlFlow::Continue(value) => state = value,
                    ControlFlow::Break(value) => return Ok(value),
                }
            }
        })
    }
}

struct RepeatNode<A, E> {
    inner: IO<A, E>,
    schedule: Schedule,
}

impl<A, E> Eval<A, E> for RepeatNode<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        let mut delays = self.schedule.delays();
        let mut last = self.inner.eval(env)?;
        for delay in delays.by_ref() {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            last = self.inner.eval(env)?;
        }
        Ok(last)
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            let mut delays = self.schedule.delays();
            let mut last = self.inner.eval_future(env).await?;
            for delay in delays.by_ref() {
                if env.token().is_cancelled() {
                    return Err(EffectError::Cancelled);
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                last = self.inner.eval_future(env).await?;
            }
            Ok(last)
        })
    }
}

struct RetryNode<A, E> {
    inner: IO<A, E>,
    schedule: Schedule,
}

impl<A, E> Eval<A, E> for RetryNode<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn eval(&self, env: &Env) -> Outcome<A, E> {
        let mut delays = self.schedule.delays();
        loop {
            match self.inner.eval(env) {
                Ok(value) => return Ok(value),
                Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
                Err(error) => match delays.next() {
                    Some(delay) => {
                        if env.token().is_cancelled() {
                            return Err(EffectError::Cancelled);
                        }
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    None => return Err(error),
                },
            }
        }
    }

    fn eval_async<'a>(&'a self, env: &'a Env) -> BoxFuture<'a, Outcome<A, E>> {
        Box::pin(async move {
            let mut delays = self.schedule.delays();
            loop {
                match self.inner.eval_future(env).await {
                    Ok(value) => return Ok(value),
                    Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
                    Err(error) => match delays.next() {
                        Some(delay) => {
                            if env.token().is_cancelled() {
                                return Err(EffectError::Cancelled);
                            }
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        None => return Err(error),
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pure_and_run() {
        let env = Env::new();
        let io = IO::<i32, String>::pure(42);
        assert_eq!(io.run(&env), Ok(42));
    }

    #[test]
    fn lift_defers_side_effects() {
        let env = Env::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let probe = counter.clone();
        let io = IO::<usize, String>::lift(move || probe.fetch_add(1, Ordering::SeqCst) + 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(io.run(&env), Ok(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // Descriptions are re-runnable; a second invocation runs the effect again.
        assert_eq!(io.run(&env), Ok(2));
    }

    #[test]
    fn cancellation_short_circuits_lift() {
        let env = Env::new();
        env.token().cancel();
        let io = IO::<i32, String>::lift(|| 1);
        assert_eq!(io.run(&env), Err(EffectError::Cancelled));
    }

    #[test]
    #[should_panic]
    fn default_io_panics_when_invoked_even_under_attempt() {
        // The bottom marker carries no message; the boundary re-raises it
        // instead of converting it into a fault, so attempt cannot mask it.
        let env = Env::new();
        let io: IO<i32, String> = IO::default();
        let _ = io.attempt().run(&env);
    }
}
