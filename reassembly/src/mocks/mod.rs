//! Mock implementations of [crate::Source], [crate::Sink], and [crate::Solver].

mod sink;
pub use sink::{Event, Log, Recorder};
mod solver;
pub use solver::Quorum;
mod source;
pub use source::{channel, Channel, Replay};
