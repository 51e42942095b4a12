//! Common types shared across the radar-relay crates.

pub mod beam;
pub mod error;
pub mod message;
pub mod status;

pub use beam::{BeamFlags, FieldParam, RadarBeamState, RadarParams};
pub use error::{RelayError, RelayResult};
pub use message::{MessageKind, RawMessage};
pub use status::TransportStatus;
