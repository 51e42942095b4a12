//! Beam pipeline: the reformatting shift register and the output
//! multiplexer that together sit between a transport adapter and the
//! downstream beam queue.
//!
//! The register holds exactly two beams. A beam's end-of-tilt and
//! end-of-volume flags are only knowable once the *next* beam has been
//! decoded, so every beam is buffered for one cycle and published with a
//! one-beam lag. The multiplexer then decides what content each published
//! beam carries and enforces the output throttles.

pub mod output;
pub mod queue;
pub mod shift;

pub use output::{OutputConfig, OutputMux};
pub use queue::{BeamQueue, ContentMask, Marker, MemoryQueue, QueueError, QueueWrite};
pub use shift::{ChangeFlags, ShiftRegister};
