//! Transport adapters for the radar-relay pipeline.
//!
//! Three independent implementations of one capability: turn bytes from a
//! medium into discrete Level II messages. The variant set is fixed and
//! known at compile time, dispatched through the [`Transport`] trait:
//!
//! - [`LdmTransport`]: file-drop/LDM directory feed (archive or realtime)
//! - [`TcpTransport`]: raw socket stream with header resynchronization
//! - [`TapeTransport`]: local or remote magnetic tape device
//!
//! Adapters never panic on recoverable conditions. Prolonged unavailability
//! surfaces as `TransportStatus::BadInputStream` on the socket and tape
//! paths; the realtime file feed instead resets its search window and keeps
//! looking, since a quiet feed usually means the radar is between volumes.

pub mod ldm;
pub mod paths;
pub mod tape;
pub mod tcpip;

use level2_wire::VolumeContext;
use radar_common::{RawMessage, TransportStatus};

pub use ldm::{LdmConfig, LdmMode, LdmTransport};
pub use paths::{DirTemplate, NameTemplate, ParsedName, SeqToken};
pub use tape::{TapeConfig, TapeDevice, TapeFraming, TapeTransport};
pub use tcpip::{TcpConfig, TcpFraming, TcpTransport};

/// The one capability every transport provides.
///
/// `next_message` may consume many bytes from the medium, silently skipping
/// records of uninteresting type. It must be safe to call repeatedly after
/// `BadData` or `EndOfFile`: the adapter internally advances past the bad
/// record or opens the next medium. The returned message borrows the
/// adapter's reuse buffer and is valid only until the next call.
pub trait Transport {
    fn next_message(&mut self) -> (TransportStatus, Option<RawMessage<'_>>);

    /// Volume/segment bookkeeping for the active medium.
    fn context(&self) -> &VolumeContext;
}
