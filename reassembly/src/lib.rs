//! Reassemble keyed fragments from many [Source]s and dispatch solved messages to many [Sink]s.
//!
//! Every [Fragment] carries the [GroupKey] of the message it belongs to in its high-order bits
//! (see [group_key]). The pipeline runs three pools of threads:
//!
//! ```txt
//!   Source ─► ingest-{i} ─┐                         ┌─► dispatch-{k} ─► Sink
//!   Source ─► ingest-{i} ─┼─► inbound ─► worker-{j} ┼─► dispatch-{k} ─► Sink
//!   submit() ─────────────┘        │               └─► ...
//!                                  ▼
//!                               store ◄── drain (incomplete groups, at shutdown)
//! ```
//!
//! Workers append each fragment to its group and ask the [Solver] whether the group is now
//! sufficient. The first sufficient solve wins: its value is queued for exactly one dispatcher
//! and the group is erased. Once every worker has exited, dispatchers race to drain the groups
//! that never became sufficient, reporting each one exactly once via [Sink::incomplete].
//!
//! # Example
//!
//! ```rust
//! use sentinel_reassembly::{mocks, Config, Engine};
//!
//! let (sink, log) = mocks::Recorder::new();
//! let mut engine = Engine::new(Config { workers: 2 }, mocks::Quorum::new(2));
//! engine.add_source(mocks::Replay::new([1 << 37, (1 << 37) | 1, 2 << 37]));
//! engine.add_sink(sink);
//!
//! let summary = engine.start().unwrap().stop().unwrap();
//! assert_eq!(summary.sent, 1);
//! assert_eq!(summary.incomplete, 1);
//! assert_eq!(log.sent().len(), 1);
//! ```

use num_bigint::BigUint;
use thiserror::Error;

mod dispatch;
mod engine;
pub use engine::{Config, Engine, Phase, Running, Submitter, Summary};
mod ingest;
mod metrics;
pub mod mocks;
mod queue;
mod store;
mod worker;

/// A single unit of input: a [GroupKey] in the high-order bits and solver payload below it.
pub type Fragment = u64;

/// Identifies the message a [Fragment] belongs to.
pub type GroupKey = u32;

/// Number of low-order payload bits below the [GroupKey] in a [Fragment].
pub const KEY_SHIFT: u32 = 37;

/// Extract the [GroupKey] of a [Fragment].
///
/// This is a fixed bit projection, so it cannot fail on malformed input.
#[inline]
pub fn group_key(fragment: Fragment) -> GroupKey {
    (fragment >> KEY_SHIFT) as GroupKey
}

/// Errors that can occur when operating the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("at least one sink is required")]
    NoSinks,
    #[error("pipeline is no longer accepting fragments")]
    Closed,
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("thread {thread} panicked: {message}")]
    Panicked { thread: String, message: String },
}

/// A blocking pull source of [Fragment]s.
pub trait Source: Send + 'static {
    /// Block until the next [Fragment] is available.
    ///
    /// Returning `None` permanently signals exhaustion: the source is never pulled again.
    fn pull(&mut self) -> Option<Fragment>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn pull(&mut self) -> Option<Fragment> {
        (**self).pull()
    }
}

/// An output channel for the outcome of each group.
///
/// Each [Sink] is driven by its own dispatch thread, so it never observes concurrent calls.
pub trait Sink: Send + 'static {
    /// Deliver the best-scoring `value` of the group identified by `key`.
    fn send(&mut self, key: GroupKey, value: BigUint);

    /// Report that the group identified by `key` never became solvable.
    fn incomplete(&mut self, key: GroupKey);
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn send(&mut self, key: GroupKey, value: BigUint) {
        (**self).send(key, value)
    }

    fn incomplete(&mut self, key: GroupKey) {
        (**self).incomplete(key)
    }
}

/// Computes the best-scoring value of a group from the fragments received so far.
///
/// Implementations must be pure and deterministic: the pipeline calls [Solver::solve]
/// repeatedly (and concurrently, for different groups) with a growing sequence of fragments.
/// The order of `fragments` reflects processing order and must not affect the outcome.
pub trait Solver: Send + Sync + 'static {
    /// Returns the best-scoring value, or `None` if the group is not yet solvable.
    fn solve(&self, fragments: &[Fragment]) -> Option<BigUint>;
}

impl<F> Solver for F
where
    F: Fn(&[Fragment]) -> Option<BigUint> + Send + Sync + 'static,
{
    fn solve(&self, fragments: &[Fragment]) -> Option<BigUint> {
        self(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x0000_0000_0000, 0; "zero")]
    #[test_case(0x0223_0000_000c, 0x11; "low key")]
    #[test_case(0x071e_124d_abef, 0x38; "payload ignored")]
    #[test_case((1 << 37) - 1, 0; "payload only")]
    #[test_case(u64::MAX, (1 << 27) - 1; "all bits")]
    fn test_group_key(fragment: Fragment, expected: GroupKey) {
        assert_eq!(group_key(fragment), expected);
    }

    #[test]
    fn test_closure_solver() {
        let solver = |fragments: &[Fragment]| {
            (fragments.len() >= 2).then(|| BigUint::from(fragments.len()))
        };
        assert_eq!(solver.solve(&[1]), None);
        assert_eq!(solver.solve(&[1, 2]), Some(BigUint::from(2u32)));
    }

    #[test]
    fn test_error_display() {
        let err = Error::Panicked {
            thread: "dispatch-0".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "thread dispatch-0 panicked: boom");
        assert_eq!(Error::NoSinks.to_string(), "at least one sink is required");
    }
}
