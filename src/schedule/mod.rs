//! Schedule algebra — composable retry/repeat delay sequences.
//!
//! A [`Schedule`] is a purely descriptive, lazily-iterated sequence of delay
//! durations. It carries no behavior of its own; the drivers `IO::repeat` and
//! `IO::retry` interpret it. Schedules are immutable values: every combinator
//! returns a new schedule without mutating its inputs, and a schedule can be
//! iterated any number of times.
//!
//! # Counting policy
//!
//! [`Schedule::recurs`] yields exactly `n` delays. Driven by `IO::repeat`
//! this means one initial execution plus `n` repeats (`n + 1` total); driven
//! by `IO::retry` it means at most `n + 1` attempts. This off-by-one policy
//! is fixed here and pinned by the schedule tests.
//!
//! # Combinators
//!
//! - [`Schedule::then`] — sequential concatenation: run out the first
//!   schedule's delays, then continue with the second's.
//! - [`Schedule::intersect`] (operator `&`) — pairwise combination taking the
//!   **longer** delay of each pair, stopping as soon as either side is
//!   exhausted. A finite schedule therefore bounds any `&` composition:
//!   `spaced(interval) & recurs(2)` yields exactly two delays.
//! - [`Schedule::union`] (operator `|`) — pairwise combination taking the
//!   **shorter** delay of each pair, stopping as soon as either side is
//!   exhausted (fallback semantics: whichever policy fires sooner wins).
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use ravel::schedule::Schedule;
//!
//! let bounded = Schedule::spaced(Duration::from_millis(100)) & Schedule::recurs(2);
//! let delays: Vec<_> = bounded.delays().collect();
//! assert_eq!(delays, vec![Duration::from_millis(100); 2]);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;
use std::time::Duration;

/// A lazy, possibly-infinite sequence of delay durations.
///
/// Internally a schedule is a factory of iterators, so iterating it never
/// consumes the schedule and infinite schedules (such as
/// [`Schedule::spaced`]) cost nothing until driven.
#[derive(Clone)]
pub struct Schedule {
    make: Arc<dyn Fn() -> Box<dyn Iterator<Item = Duration> + Send> + Send + Sync>,
}

impl Schedule {
    /// Creates a schedule from an iterator factory.
    ///
    /// The factory is invoked once per drive of the schedule, so it must
    /// produce an equivalent fresh iterator each time.
    pub fn new<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Iterator<Item = Duration> + Send + 'static,
    {
        Self {
            make: Arc::new(move || Box::new(factory())),
        }
    }

    /// The empty schedule: no delays, so drivers never repeat or retry.
    #[must_use]
    pub fn never() -> Self {
        Self::new(std::iter::empty)
    }

    /// An infinite schedule of a constant interval.
    #[must_use]
    pub fn spaced(interval: Duration) -> Self {
        Self::new(move || std::iter::repeat(interval))
    }

    /// Exactly `times` zero-length delays.
    ///
    /// Under `IO::repeat` this yields `times` repeats after the initial
    /// execution; under `IO::retry`, `times` retries after the initial
    /// attempt.
    #[must_use]
    pub fn recurs(times: usize) -> Self {
        Self::new(move || std::iter::repeat(Duration::ZERO).take(times))
    }

    /// A schedule that replays a fixed list of delays.
    #[must_use]
    pub fn from_delays(delays: Vec<Duration>) -> Self {
        Self::new(move || delays.clone().into_iter())
    }

    /// Begins iterating this schedule's delays.
    #[must_use]
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        (self.make)()
    }

    /// Sequential combination: all of `self`'s delays, then all of `next`'s.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        Self {
            make: Arc::new(move || Box::new((self.make)().chain((next.make)()))),
        }
    }

    /// Pairwise intersection: the longer delay of each pair, stopping when
    /// either schedule is exhausted.
    ///
    /// Because the combined schedule is bounded by the shorter operand, a
    /// finite schedule such as [`Schedule::recurs`] caps any `&` composition.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            make: Arc::new(move || {
                Box::new(
                    (self.make)()
                        .zip((other.make)())
                        .map(|(left, right)| left.max(right)),
                )
            }),
        }
    }

    /// Pairwise union: the shorter delay of each pair, stopping when either
    /// schedule is exhausted.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            make: Arc::new(move || {
                Box::new(
                    (self.make)()
                        .zip((other.make)())
                        .map(|(left, right)| left.min(right)),
                )
            }),
        }
    }
}

impl BitAnd for Schedule {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersect(rhs)
    }
}

impl BitOr for Schedule {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Schedule").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_yields_no_delays() {
        assert_eq!(Schedule::never().delays().count(), 0);
    }

    #[test]
    fn recurs_yields_exact_count() {
        let delays: Vec<_> = Schedule::recurs(3).delays().collect();
        assert_eq!(delays, vec![Duration::ZERO; 3]);
    }

    #[test]
    fn spaced_is_constant() {
        let delays: Vec<_> = Schedule::spaced(Duration::from_millis(10))
            .delays()
            .take(4)
            .collect();
        assert_eq!(delays, vec![Duration::from_millis(10); 4]);
    }

    #[test]
    fn schedules_iterate_repeatedly() {
        let schedule = Schedule::recurs(2);
        assert_eq!(schedule.delays().count(), 2);
        assert_eq!(schedule.delays().count(), 2);
    }

    #[test]
    fn then_concatenates() {
        let first = Schedule::from_delays(vec![Duration::from_millis(1)]);
        let second = Schedule::from_delays(vec![Duration::from_millis(2)]);
        let delays: Vec<_> = first.then(second).delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(1), Duration::from_millis(2)]
        );
    }

    #[test]
    fn intersect_takes_longer_delay_and_shorter_length() {
        let bounded =
            Schedule::spaced(Duration::from_millis(100)).intersect(Schedule::recurs(2));
        let delays: Vec<_> = bounded.delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(100); 2]);
    }

    #[test]
    fn union_takes_shorter_delay() {
        let fast = Schedule::spaced(Duration::from_millis(5));
        let slow = Schedule::from_delays(vec![
            Duration::from_millis(50),
            Duration::from_millis(50),
        ]);
        let delays: Vec<_> = (fast | slow).delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(5); 2]);
    }
}
