//! Process engine — composable step functions reduced against a cancellation
//! signal.
//!
//! A [`Process<I, O, E>`] is a pure, immutable description of a step-wise
//! transformation: it consumes inputs of type `I`, produces zero or more
//! outputs of type `O` per input, and may fail with `E`. Nothing runs until
//! the process is reduced.
//!
//! # Per-run state
//!
//! A process is internally a *factory* of step functions: every reduction
//! begins a fresh step state, so the description itself is never mutated and
//! may be shared freely across threads and concurrent reductions.
//!
//! # Reduction
//!
//! [`Process::reduce`] feeds an input source through the process and applies
//! a reducer `(state, output) -> Reduced` to every produced output. The loop
//! checks the environment's cancellation token before each input and
//! terminates with a cancellation failure when it is set. Reduction
//! short-circuits on the first failing output.
//!
//! [`Process::run_many`] and [`Process::collect`] defer the same reduction
//! into an [`IO`] value, and [`Process::fork`] offloads it onto background
//! execution.
//!
//! # Examples
//!
//! ```rust
//! use ravel::env::Env;
//! use ravel::process::{Process, Reduced};
//!
//! let doubled = Process::<i32, i32, String>::lift(|x| x * 2).filter(|x| *x > 2);
//! let sum = doubled.reduce(
//!     vec![1, 2, 3],
//!     0,
//!     |acc, x| Reduced::Continue(acc + x),
//!     &Env::new(),
//! );
//! assert_eq!(sum, Ok(10)); // 4 + 6; the doubled 1 is filtered out
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::env::Env;
use crate::error::{EffectError, Outcome};
use crate::io::{Fork, IO};

/// Verdict returned by a step (or a sink) after handling one value.
///
/// This is the wire protocol between a process step and whatever consumes
/// its outputs: keep going, stop successfully, or stop with a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<E> {
    /// Keep feeding values.
    Continue,
    /// Stop; the reduction is complete.
    Complete,
    /// Stop; the reduction failed.
    Fail(E),
}

/// Tri-state outcome of one reducer application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduced<S, E> {
    /// Continue reducing with the new state.
    Continue(S),
    /// Stop reducing; keep the final state.
    Complete(S),
    /// Abort the reduction with a failure.
    Fail(E),
}

/// A per-run step function: feed one input, forward outputs to the sink,
/// propagate the sink's verdict.
pub type Step<I, O, E> =
    Box<dyn FnMut(I, &mut dyn FnMut(O) -> Verdict<E>) -> Verdict<E> + Send>;

/// An immutable, composable description of a step-wise computation.
///
/// See the [module documentation](self) for the execution model.
pub struct Process<I, O, E> {
    begin: Arc<dyn Fn() -> Step<I, O, E> + Send + Sync>,
}

impl<I, O, E> Clone for Process<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            begin: Arc::clone(&self.begin),
        }
    }
}

impl<I, O, E> Process<I, O, E>
where
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    /// Creates a process from a step-function factory.
    ///
    /// The factory runs once per reduction and must return an independent
    /// step state each time.
    pub fn new<F>(begin: F) -> Self
    where
        F: Fn() -> Step<I, O, E> + Send + Sync + 'static,
    {
        Self {
            begin: Arc::new(begin),
        }
    }

    /// Lifts a pure function into a one-in, one-out process.
    pub fn lift<F>(function: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Self::new(move || {
            let function = Arc::clone(&function);
            Box::new(move |input, sink| sink(function(input)))
        })
    }

    /// Drops outputs that do not satisfy the predicate.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Self::new(move || {
            let mut step = (self.begin)();
            let predicate = Arc::clone(&predicate);
            Box::new(move |input, sink| {
                step(input, &mut |output| {
                    if predicate(&output) {
                        sink(output)
                    } else {
                        Verdict::Continue
                    }
                })
            })
        })
    }

    /// Transforms every output with a pure function.
    pub fn map<O2, F>(self, function: F) -> Process<I, O2, E>
    where
        O2: Send + 'static,
        F: Fn(O) -> O2 + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Process::new(move || {
            let mut step = (self.begin)();
            let function = Arc::clone(&function);
            Box::new(move |input, sink| step(input, &mut |output| sink(function(output))))
        })
    }

    /// Sequences a continuation process after every output.
    ///
    /// For each output of `self`, the factory builds a follow-up process
    /// which is fed the *same* input; its outputs become the outputs of the
    /// combined process. This is monadic bind over streaming stages.
    pub fn bind<O2, F>(self, factory: F) -> Process<I, O2, E>
    where
        I: Clone,
        O2: Send + 'static,
        F: Fn(O) -> Process<I, O2, E> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        Process::new(move || {
            let mut step = (self.begin)();
            let factory = Arc::clone(&factory);
            Box::new(move |input: I, sink| {
                let current = input.clone();
                step(input, &mut |output| {
                    let next = factory(output);
                    let mut next_step = (next.begin)();
                    next_step(current.clone(), &mut *sink)
                })
            })
        })
    }

    /// Folds outputs into an accumulator, emitting the running accumulation
    /// once per processed input.
    ///
    /// The final emission is the fold result; reduce with a "keep last"
    /// reducer to extract it.
    pub fn fold<S, F>(self, initial: S, folder: F) -> Process<I, S, E>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S, O) -> S + Send + Sync + 'static,
    {
        let folder = Arc::new(folder);
        Process::new(move || {
            let mut step = (self.begin)();
            let folder = Arc::clone(&folder);
            let mut accumulator = Some(initial.clone());
            Box::new(move |input, sink| {
                let verdict = step(input, &mut |output| {
                    let state = accumulator
                        .take()
                        .expect("process internal error: fold accumulator missing");
                    accumulator = Some(folder(state, output));
                    Verdict::Continue
                });
                let current = accumulator
                    .clone()
                    .expect("process internal error: fold accumulator missing");
                match verdict {
                    Verdict::Continue => sink(current),
                    Verdict::Complete => match sink(current) {
                        Verdict::Fail(error) => Verdict::Fail(error),
                        _ => Verdict::Complete,
                    },
                    Verdict::Fail(error) => Verdict::Fail(error),
                }
            })
        })
    }

    /// Sequential pipeline: feeds this process's outputs into `next`.
    pub fn compose<O2>(self, next: Process<O, O2, E>) -> Process<I, O2, E>
    where
        O2: Send + 'static,
    {
        Process::new(move || {
            let mut first = (self.begin)();
            let mut second = (next.begin)();
            Box::new(move |input, sink| first(input, &mut |middle| second(middle, &mut *sink)))
        })
    }

    /// Caches the first completed output burst per distinct input value.
    ///
    /// When the same input is fed again — in this reduction or any later one
    /// sharing this process value — the recorded outputs are replayed
    /// without re-running the underlying step. Only inputs whose step
    /// finished with a plain continue verdict are recorded.
    #[must_use]
    pub fn memo(self) -> Self
    where
        I: Clone + Eq + Hash,
        O: Clone,
    {
        let cache: Arc<Mutex<HashMap<I, Vec<O>>>> = Arc::new(Mutex::new(HashMap::new()));
        Self::new(move || {
            let mut step = (self.begin)();
            let cache = Arc::clone(&cache);
            Box::new(move |input: I, sink| {
                let cached = cache.lock().get(&input).cloned();
                if let Some(outputs) = cached {
                    for output in outputs {
                        match sink(output) {
                            Verdict::Continue => {}
                            verdict => return verdict,
                        }
                    }
                    return Verdict::Continue;
                }
                let mut recorded = Vec::new();
                let verdict = step(input.clone(), &mut |output: O| {
                    recorded.push(output.clone());
                    sink(output)
                });
                if matches!(verdict, Verdict::Continue) {
                    cache.lock().insert(input, recorded);
                }
                verdict
            })
        })
    }

    /// Marks the end of a recursive composition chain.
    ///
    /// The engine creates step state per reduction and drops per-value
    /// sub-steps eagerly, so no continuation frames accumulate *across*
    /// inputs; this marker exists to make the tail position explicit in deep
    /// pipelines. It does not flatten the pipeline itself: each `compose`
    /// layer adds one nested sink call while a single value traverses the
    /// chain, so per-element stack depth still grows with pipeline depth.
    /// For unbounded recursion *inside* an effect, use `IO::tail_rec`, which
    /// loops instead of recursing.
    #[must_use]
    pub fn tail(self) -> Self {
        self
    }

    /// Reduces an input source through this process.
    ///
    /// The reducer is applied to every produced output, threading `initial`
    /// through. The cancellation token in `env` is checked before each input;
    /// when set, the reduction terminates with [`EffectError::Cancelled`].
    /// The first [`Reduced::Fail`] short-circuits the whole reduction.
    ///
    /// # Errors
    ///
    /// Returns [`EffectError::Cancelled`] on cancellation and
    /// [`EffectError::Failure`] when the reducer (or the process itself)
    /// fails.
    pub fn reduce<S, F>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        initial: S,
        mut reducer: F,
        env: &Env,
    ) -> Outcome<S, E>
    where
        F: FnMut(S, O) -> Reduced<S, E>,
    {
        let mut step = (self.begin)();
        let mut state = Some(initial);
        for input in inputs {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            let verdict = step(input, &mut |output| {
                let current = state
                    .take()
                    .expect("process internal error: reduction state missing");
                match reducer(current, output) {
                    Reduced::Continue(next) => {
                        state = Some(next);
                        Verdict::Continue
                    }
                    Reduced::Complete(next) => {
                        state = Some(next);
                        Verdict::Complete
                    }
                    Reduced::Fail(error) => Verdict::Fail(error),
                }
            });
            match verdict {
                Verdict::Continue => {}
                Verdict::Complete => break,
                Verdict::Fail(error) => return Err(EffectError::Failure(error)),
            }
        }
        Ok(state.expect("process internal error: reduction state missing"))
    }

    /// Awaitable reduction path.
    ///
    /// Shares the exact reduction contract (and loop) with
    /// [`Process::reduce`]; a process is agnostic to which path drives it.
    ///
    /// # Errors
    ///
    /// Same as [`Process::reduce`].
    pub async fn reduce_async<S, F>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        initial: S,
        reducer: F,
        env: &Env,
    ) -> Outcome<S, E>
    where
        F: FnMut(S, O) -> Reduced<S, E>,
    {
        self.reduce(inputs, initial, reducer, env)
    }

    /// Defers a reduction into an [`IO`] value.
    ///
    /// Nothing runs until the returned `IO` is invoked; each invocation
    /// performs a fresh reduction over a copy of `inputs`.
    pub fn run_many<S, F>(&self, inputs: Vec<I>, initial: S, reducer: F) -> IO<S, E>
    where
        I: Clone + Sync,
        S: Clone + Send + Sync + 'static,
        E: Sync,
        F: Fn(S, O) -> Reduced<S, E> + Send + Sync + 'static,
    {
        let process = self.clone();
        IO::from_env_outcome(move |env| {
            process.reduce(
                inputs.clone(),
                initial.clone(),
                |state, output| reducer(state, output),
                env,
            )
        })
    }

    /// Defers a reduction that gathers every output into a `Vec`.
    pub fn collect(&self, inputs: Vec<I>) -> IO<Vec<O>, E>
    where
        I: Clone + Sync,
        O: Clone + Sync,
        E: Sync,
    {
        self.run_many(inputs, Vec::new(), |mut accumulator, output| {
            accumulator.push(output);
            Reduced::Continue(accumulator)
        })
    }

    /// Offloads a collecting reduction onto background execution.
    ///
    /// Equivalent to `self.collect(inputs).fork(timeout)`: invoking the
    /// returned `IO` spawns the reduction and immediately yields a
    /// [`Fork`] handle.
    pub fn fork(&self, inputs: Vec<I>, timeout: Option<Duration>) -> IO<Fork<Vec<O>, E>, E>
    where
        I: Clone + Sync,
        O: Clone + Sync,
        E: Clone + Sync,
    {
        self.collect(inputs).fork(timeout)
    }
}
