//! Four-ported protocol algebra — producers, consumers, pipes, effects.
//!
//! A [`Proxy`] is a suspended bidirectional exchange with four ports: it can
//! send a query upstream and resume with the response ([`Proxy::request`]),
//! send a value downstream and resume with the next request
//! ([`Proxy::respond`]), run a lifted [`IO`] step ([`Proxy::lift`]), or
//! finish with a result ([`Proxy::pure`]). The type parameters pin the port
//! protocol:
//!
//! | parameter | role |
//! |-----------|------|
//! | `UO` | query sent upstream by `request` |
//! | `UI` | response received from upstream |
//! | `DO` | value sent downstream by `respond` |
//! | `DI` | request received from downstream |
//!
//! [`Proxy::pipe`] pairs one stage's `respond` with its neighbor's `request`,
//! yielding a stage whose visible ports are the left operand's upstream ports
//! and the right operand's downstream ports. Composition is associative, and
//! [`Proxy::reflect`] (port duality) is an involution.
//!
//! Closing a port means pinning its outgoing side to the empty type
//! ([`Infallible`]) and its incoming side to unit. The aliases [`Producer`],
//! [`Consumer`], [`Pipe`], and [`Effect`] name the four useful closures of
//! the generic type; an [`Effect`] has no open ports left and can only be
//! [run](Effect::run).
//!
//! # Examples
//!
//! ```rust
//! use ravel::pipes::{Consumer, Producer, Proxy};
//!
//! fn naturals(up_to: u32) -> Producer<u32, (), String> {
//!     let mut stage = Proxy::pure(());
//!     for value in (0..up_to).rev() {
//!         stage = Proxy::respond(value).flat_map(move |()| stage);
//!     }
//!     stage
//! }
//!
//! fn sum_into(total: std::sync::Arc<std::sync::Mutex<u32>>) -> Consumer<u32, (), String> {
//!     Proxy::request(()).flat_map(move |value: u32| {
//!         *total.lock().unwrap() += value;
//!         sum_into(total)
//!     })
//! }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use crate::env::Env;
use crate::error::{EffectError, Outcome};
use crate::io::IO;

// =============================================================================
// Type Aliases
// =============================================================================

/// A suspended continuation awaiting one port value.
type Continuation<I, P> = Box<dyn FnOnce(I) -> P + Send>;

/// One erased effect step: evaluates against the environment and yields the
/// rest of the exchange (or a terminal failure).
type EffectStep<P, E> = Box<dyn FnOnce(&Env) -> Outcome<P, E> + Send>;

/// A stage that only sends values downstream.
pub type Producer<O, A, E> = Proxy<Infallible, (), O, (), A, E>;

/// A stage that only receives values from upstream.
pub type Consumer<I, A, E> = Proxy<(), I, Infallible, (), A, E>;

/// A stage that receives from upstream and sends downstream.
pub type Pipe<I, O, A, E> = Proxy<(), I, O, (), A, E>;

/// A fully closed exchange: neither requests upstream nor responds
/// downstream, so it can only be run.
pub type Effect<A, E> = Proxy<Infallible, (), Infallible, (), A, E>;

// =============================================================================
// Proxy
// =============================================================================

/// A four-ported bidirectional exchange. See the
/// [module documentation](self) for the port protocol.
pub enum Proxy<UO, UI, DO, DI, A, E> {
    /// Finished with a result.
    Pure(A),

    /// Suspended on a query sent upstream; resumes with the response.
    Request(UO, Continuation<UI, Proxy<UO, UI, DO, DI, A, E>>),

    /// Suspended on a value sent downstream; resumes with the next request.
    Respond(DO, Continuation<DI, Proxy<UO, UI, DO, DI, A, E>>),

    /// Suspended on a lifted effect step.
    Lift(EffectStep<Proxy<UO, UI, DO, DI, A, E>, E>),
}

impl<UO, UI, DO, DI, A, E> Proxy<UO, UI, DO, DI, A, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    DO: Send + 'static,
    DI: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    /// An exchange that immediately finishes with `result`.
    pub fn pure(result: A) -> Self {
        Self::Pure(result)
    }

    /// Embeds one effectful step. The computation is evaluated when the
    /// surrounding exchange is run, never at construction time.
    pub fn lift(computation: IO<A, E>) -> Self {
        Self::Lift(Box::new(move |env| {
            computation.eval(env).map(Proxy::Pure)
        }))
    }

    /// Sequential composition on the result channel.
    ///
    /// Replaces the terminal `Pure` with the continuation's exchange.
    /// Together with [`Proxy::pure`] this satisfies the monad laws.
    pub fn flat_map<B, F>(self, continuation: F) -> Proxy<UO, UI, DO, DI, B, E>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Proxy<UO, UI, DO, DI, B, E> + Send + 'static,
    {
        match self {
            Self::Pure(result) => continuation(result),
            Self::Request(query, resume) => Proxy::Request(
                query,
                Box::new(move |response| resume(response).flat_map(continuation)),
            ),
            Self::Respond(value, resume) => Proxy::Respond(
                value,
                Box::new(move |next| resume(next).flat_map(continuation)),
            ),
            Self::Lift(step) => Proxy::Lift(Box::new(move |env| {
                step(env).map(|rest| rest.flat_map(continuation))
            })),
        }
    }

    /// Transforms the result with a pure function.
    pub fn fmap<B, F>(self, function: F) -> Proxy<UO, UI, DO, DI, B, E>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        self.flat_map(move |result| Proxy::Pure(function(result)))
    }

    /// Port duality: swaps the upstream and downstream roles.
    ///
    /// Every `request` becomes a `respond` and vice versa. Applying
    /// `reflect` twice restores the original exchange.
    pub fn reflect(self) -> Proxy<DO, DI, UO, UI, A, E> {
        match self {
            Self::Pure(result) => Proxy::Pure(result),
            Self::Request(query, resume) => Proxy::Respond(
                query,
                Box::new(move |response| resume(response).reflect()),
            ),
            Self::Respond(value, resume) => Proxy::Request(
                value,
                Box::new(move |next| resume(next).reflect()),
            ),
            Self::Lift(step) => {
                Proxy::Lift(Box::new(move |env| step(env).map(Proxy::reflect)))
            }
        }
    }

    /// Loop fusion: replaces every downstream `respond` with `body`.
    ///
    /// Each responded value is fed to `body`, whose result becomes the reply
    /// the original stage resumes with. This implements `map`/`bind` over a
    /// streaming stage without materializing an intermediate collection.
    pub fn for_each<DO2, DI2, F>(self, body: F) -> Proxy<UO, UI, DO2, DI2, A, E>
    where
        DO2: Send + 'static,
        DI2: Send + 'static,
        F: Fn(DO) -> Proxy<UO, UI, DO2, DI2, DI, E> + Send + Sync + 'static,
    {
        self.for_each_shared(&Arc::new(body))
    }

    fn for_each_shared<DO2, DI2, F>(self, body: &Arc<F>) -> Proxy<UO, UI, DO2, DI2, A, E>
    where
        DO2: Send + 'static,
        DI2: Send + 'static,
        F: Fn(DO) -> Proxy<UO, UI, DO2, DI2, DI, E> + Send + Sync + 'static,
    {
        match self {
            Self::Pure(result) => Proxy::Pure(result),
            Self::Request(query, resume) => {
                let body = Arc::clone(body);
                Proxy::Request(
                    query,
                    Box::new(move |response| resume(response).for_each_shared(&body)),
                )
            }
            Self::Respond(value, resume) => {
                let body = Arc::clone(body);
                body(value).flat_map(move |reply| resume(reply).for_each_shared(&body))
            }
            Self::Lift(step) => {
                let body = Arc::clone(body);
                Proxy::Lift(Box::new(move |env| {
                    step(env).map(|rest| rest.for_each_shared(&body))
                }))
            }
        }
    }
}

impl<UO, UI, DO, DI, E> Proxy<UO, UI, DO, DI, UI, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    DO: Send + 'static,
    DI: Send + 'static,
    E: Send + 'static,
{
    /// Sends `query` upstream; the exchange's result is the response.
    pub fn request(query: UO) -> Self {
        Self::Request(query, Box::new(Proxy::Pure))
    }
}

impl<UO, UI, DO, DI, E> Proxy<UO, UI, DO, DI, DI, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    DO: Send + 'static,
    DI: Send + 'static,
    E: Send + 'static,
{
    /// Sends `value` downstream; the exchange's result is the next request.
    pub fn respond(value: DO) -> Self {
        Self::Respond(value, Box::new(Proxy::Pure))
    }
}

// =============================================================================
// Composition
// =============================================================================

impl<UO, UI, B, BB, A, E> Proxy<UO, UI, B, BB, A, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    B: Send + 'static,
    BB: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    /// Composes this stage with a downstream neighbor.
    ///
    /// The downstream stage drives: it runs until it requests, at which
    /// point this stage runs until it responds, the two port values are
    /// exchanged, and control returns downstream. The composed stage's
    /// visible ports are this stage's upstream ports and the neighbor's
    /// downstream ports. Either side finishing with `Pure` finishes the
    /// whole composition.
    pub fn pipe<DO, DI>(
        self,
        downstream: Proxy<BB, B, DO, DI, A, E>,
    ) -> Proxy<UO, UI, DO, DI, A, E>
    where
        DO: Send + 'static,
        DI: Send + 'static,
    {
        pull(self, downstream)
    }
}

/// Runs the downstream stage until it requests (or finishes).
fn pull<UO, UI, B, BB, DO, DI, A, E>(
    upstream: Proxy<UO, UI, B, BB, A, E>,
    downstream: Proxy<BB, B, DO, DI, A, E>,
) -> Proxy<UO, UI, DO, DI, A, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    B: Send + 'static,
    BB: Send + 'static,
    DO: Send + 'static,
    DI: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    match downstream {
        Proxy::Pure(result) => Proxy::Pure(result),
        Proxy::Respond(value, resume) => Proxy::Respond(
            value,
            Box::new(move |next| pull(upstream, resume(next))),
        ),
        Proxy::Lift(step) => Proxy::Lift(Box::new(move |env| {
            step(env).map(|rest| pull(upstream, rest))
        })),
        Proxy::Request(query, resume) => feed(upstream, query, resume),
    }
}

/// Runs the upstream stage until it responds (or finishes), delivering the
/// pending downstream query to its resume point.
fn feed<UO, UI, B, BB, DO, DI, A, E>(
    upstream: Proxy<UO, UI, B, BB, A, E>,
    query: BB,
    resume: Continuation<B, Proxy<BB, B, DO, DI, A, E>>,
) -> Proxy<UO, UI, DO, DI, A, E>
where
    UO: Send + 'static,
    UI: Send + 'static,
    B: Send + 'static,
    BB: Send + 'static,
    DO: Send + 'static,
    DI: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    match upstream {
        Proxy::Pure(result) => Proxy::Pure(result),
        Proxy::Request(outer_query, outer_resume) => Proxy::Request(
            outer_query,
            Box::new(move |response| feed(outer_resume(response), query, resume)),
        ),
        Proxy::Lift(step) => Proxy::Lift(Box::new(move |env| {
            step(env).map(|rest| feed(rest, query, resume))
        })),
        Proxy::Respond(value, upstream_resume) => {
            pull(upstream_resume(query), resume(value))
        }
    }
}

// =============================================================================
// Effect Interpretation
// =============================================================================

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    /// Runs a fully closed exchange to its terminal outcome.
    ///
    /// Only `Pure` and `Lift` steps can occur — the port variants carry the
    /// empty type and are statically unreachable. The cancellation token is
    /// checked before every step; cancellation terminates the run with
    /// [`EffectError::Cancelled`].
    ///
    /// This is not an invocation boundary for faults: a panic raised by a
    /// lifted step unwinds out of `run` as a panic, it is not converted into
    /// [`EffectError::Fault`](crate::error::EffectError::Fault). Callers who
    /// want capture should wrap the lifted computation in `IO::attempt`
    /// before embedding it.
    pub fn run(self, env: &Env) -> Outcome<A, E> {
        let mut current = self;
        loop {
            if env.token().is_cancelled() {
                return Err(EffectError::Cancelled);
            }
            current = match current {
                Self::Pure(result) => return Ok(result),
                Self::Lift(step) => step(env)?,
                Self::Request(query, _) => match query {},
                Self::Respond(value, _) => match value {},
            };
        }
    }
}

impl<UO, UI, DO, DI, A, E> fmt::Debug for Proxy<UO, UI, DO, DI, A, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Pure(_) => "Pure",
            Self::Request(..) => "Request",
            Self::Respond(..) => "Respond",
            Self::Lift(_) => "Lift",
        };
        formatter.debug_tuple(variant).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn env() -> Env {
        Env::new()
    }

    #[test]
    fn pure_effect_runs_to_result() {
        let effect: Effect<i32, String> = Proxy::pure(42);
        assert_eq!(effect.run(&env()), Ok(42));
    }

    #[test]
    fn lift_defers_and_propagates_failure() {
        let effect: Effect<i32, String> = Proxy::lift(IO::fail("boom".to_string()));
        assert_eq!(
            effect.run(&env()),
            Err(EffectError::Failure("boom".to_string()))
        );
    }

    #[test]
    fn producer_pipes_into_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut producer: Producer<u32, (), String> = Proxy::pure(());
        for value in (1..=3).rev() {
            producer = Proxy::respond(value).flat_map(move |()| producer);
        }

        fn consume(log: Arc<Mutex<Vec<u32>>>) -> Consumer<u32, (), String> {
            Proxy::request(()).flat_map(move |value: u32| {
                log.lock().unwrap().push(value);
                consume(log)
            })
        }

        let effect = producer.pipe(consume(seen.clone()));
        assert_eq!(effect.run(&env()), Ok(()));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn cancellation_stops_the_interpreter() {
        let environment = env();
        environment.token().cancel();
        let effect: Effect<i32, String> = Proxy::pure(1);
        assert_eq!(effect.run(&environment), Err(EffectError::Cancelled));
    }
}
