//! # ravel
//!
//! A composable effect and streaming runtime.
//!
//! The crate is built from four components, leaves first:
//!
//! - [`process`] — the transducer engine: composable step functions reduced
//!   against a cancellation signal.
//! - [`io`] — the execution engine: deferred computations invoked
//!   synchronously or asynchronously, with forking, memoization, retry, and
//!   fault capture at the invocation boundary.
//! - [`pipes`] — the four-ported protocol algebra generalizing producers,
//!   consumers, and pipes; a fully closed exchange becomes an [`pipes::Effect`]
//!   that can only be run.
//! - [`schedule`] — the delay-sequence algebra driving [`io::IO::repeat`]
//!   and [`io::IO::retry`].
//!
//! Supporting modules: [`env`] carries the environment and cooperative
//! cancellation token threaded through every invocation; [`error`] defines
//! the typed-failure / runtime-fault split.
//!
//! ## Example
//!
//! ```rust
//! use ravel::env::Env;
//! use ravel::io::IO;
//! use ravel::schedule::Schedule;
//!
//! let env = Env::new();
//! let greeting = IO::<String, String>::lift(|| "hello".to_string())
//!     .fmap(|s| format!("{s}, world"))
//!     .retry(Schedule::recurs(2));
//! assert_eq!(greeting.run(&env), Ok("hello, world".to_string()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod env;
pub mod error;
pub mod io;
pub mod pipes;
pub mod process;
pub mod schedule;

/// Commonly used items, re-exported for glob import.
pub mod prelude {
    pub use crate::env::{CancelToken, Env};
    pub use crate::error::{EffectError, Fault, Outcome};
    pub use crate::io::{Fork, IO};
    pub use crate::pipes::{Consumer, Effect, Pipe, Producer, Proxy};
    pub use crate::process::{Process, Reduced, Verdict};
    pub use crate::schedule::Schedule;
}
