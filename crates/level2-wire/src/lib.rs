//! NEXRAD Level II (Archive II) wire format.
//!
//! This crate provides the protocol logic shared by all three transport
//! adapters: fixed-size logical record extraction from physical blocks,
//! message-type filtering, volume-title recognition with segment
//! bookkeeping, and per-block decompression.
//!
//! All multi-byte header fields are big-endian on the wire; every read is
//! bounds-checked and a short or garbled buffer surfaces as a [`WireError`],
//! never as an out-of-bounds access.

pub mod decompress;
pub mod error;
pub mod framing;
pub mod records;

pub use decompress::Compression;
pub use error::{WireError, WireResult};
pub use framing::{Framer, VolumeContext};
pub use records::{
    MessageHeader, RadialHeader, RadialStatus, TitleFormat, VolumeTitle, CTM_SIZE,
    MESSAGE_HEADER_SIZE, PACKET_SIZE, PACKETS_PER_LDM_BLOCK, VOLUME_TITLE_SIZE,
};
