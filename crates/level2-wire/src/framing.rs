//! Logical-record framing and volume bookkeeping.
//!
//! Shared by all three transport adapters: each adapter owns one [`Framer`],
//! feeds it physical blocks as the medium delivers them, and pulls out
//! logical records of the wanted message type. Volume titles and segment
//! sequence numbers are tracked in the [`VolumeContext`] so the adapter's
//! caller can ask whether the active volume arrived complete.

use std::ops::Range;

use tracing::debug;

use radar_common::MessageKind;

use crate::decompress::{decompress_block, Compression};
use crate::error::WireResult;
use crate::records::{MessageHeader, VolumeTitle, PACKET_SIZE};

/// Per-adapter volume state. Single writer: only the owning adapter mutates
/// it, on volume and segment boundaries.
#[derive(Debug, Clone)]
pub struct VolumeContext {
    /// Identity of the active medium (file path, host:port, device).
    pub source: String,
    pub compression: Compression,
    /// True once a volume-title boundary has been seen for this volume.
    pub title_seen: bool,
    pub volume_num: Option<u32>,
    /// First segment sequence number observed for the active volume.
    pub first_segment: Option<u32>,
    /// Highest segment sequence number observed.
    pub last_segment: Option<u32>,
    /// Final segment number, once the end-of-volume marker identifies it.
    pub final_segment: Option<u32>,
    contiguous: bool,
}

impl Default for VolumeContext {
    fn default() -> Self {
        Self {
            source: String::new(),
            compression: Compression::default(),
            title_seen: false,
            volume_num: None,
            first_segment: None,
            last_segment: None,
            final_segment: None,
            contiguous: true,
        }
    }
}

impl VolumeContext {
    pub fn new(source: impl Into<String>, compression: Compression) -> Self {
        Self {
            source: source.into(),
            compression,
            ..Default::default()
        }
    }

    /// Reset expected-segment bounds at a volume-title boundary.
    pub fn begin_volume(&mut self, title: &VolumeTitle) {
        self.title_seen = true;
        self.volume_num = title.volume_num;
        self.first_segment = None;
        self.last_segment = None;
        self.final_segment = None;
        self.contiguous = true;
    }

    /// Record one observed segment sequence number.
    pub fn note_segment(&mut self, seq: u32) {
        if self.first_segment.is_none() {
            self.first_segment = Some(seq);
        }
        if let Some(prev) = self.last_segment {
            if seq != prev + 1 {
                self.contiguous = false;
            }
        }
        self.last_segment = Some(seq);
    }

    /// Record that `seq` closes the active volume.
    pub fn note_final_segment(&mut self, seq: u32) {
        self.final_segment = Some(seq);
    }

    /// Whether every segment of the active volume has been seen, from the
    /// expected start through the known final segment, with no gaps.
    pub fn volume_complete(&self) -> bool {
        match (self.first_segment, self.last_segment, self.final_segment) {
            (Some(first), Some(last), Some(end)) => {
                self.contiguous && first == 0 && last == end
            }
            _ => false,
        }
    }
}

/// Reference to one extracted logical record inside the framer's block
/// buffer. Resolve to bytes with [`Framer::record_bytes`]; valid until the
/// next `load_block` call.
#[derive(Debug, Clone)]
pub struct RecordRef {
    pub range: Range<usize>,
    pub header: MessageHeader,
    /// A volume-title boundary was seen since the previous extracted record.
    pub title_seen: bool,
}

/// Slices physical blocks into fixed-size logical records and filters to the
/// one message type of interest.
#[derive(Debug)]
pub struct Framer {
    wanted: MessageKind,
    context: VolumeContext,
    block: Vec<u8>,
    offset: usize,
    title_pending: bool,
}

impl Framer {
    pub fn new(wanted: MessageKind) -> Self {
        Self {
            wanted,
            context: VolumeContext::default(),
            block: Vec::new(),
            offset: 0,
            title_pending: false,
        }
    }

    pub fn context(&self) -> &VolumeContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut VolumeContext {
        &mut self.context
    }

    /// Reset for a new medium. Pending block data from the previous medium
    /// is dropped; volume bookkeeping survives only if the volume spans
    /// media (the caller decides by not calling `begin_volume`).
    pub fn begin_source(&mut self, source: &str, compression: Compression) {
        self.context.source = source.to_string();
        self.context.compression = compression;
        self.block.clear();
        self.offset = 0;
    }

    /// Record a volume-title boundary.
    pub fn note_title(&mut self, title: &VolumeTitle) {
        debug!(
            source = %self.context.source,
            volume = ?title.volume_num,
            "Volume title boundary"
        );
        self.context.begin_volume(title);
        self.title_pending = true;
    }

    /// Decompress (per the context's mode) and install one physical block.
    /// Any unconsumed remainder of the previous block is discarded; callers
    /// drain records before loading the next block.
    pub fn load_block(&mut self, data: &[u8]) -> WireResult<()> {
        self.block = decompress_block(data, self.context.compression)?;
        self.offset = 0;
        Ok(())
    }

    /// Bytes still unconsumed in the current block.
    pub fn remaining(&self) -> usize {
        self.block.len().saturating_sub(self.offset)
    }

    /// Extract the next record of the wanted type from the current block,
    /// silently skipping records of other types. Returns `None` when the
    /// block is drained (a trailing partial record is dropped).
    pub fn next_record(&mut self) -> WireResult<Option<RecordRef>> {
        while self.offset + PACKET_SIZE <= self.block.len() {
            let range = self.offset..self.offset + PACKET_SIZE;
            self.offset += PACKET_SIZE;

            let header = MessageHeader::parse(&self.block[range.clone()])?;
            if header.kind != self.wanted {
                debug!(
                    source = %self.context.source,
                    msg_type = header.kind.type_code(),
                    "Skipping record of uninteresting type"
                );
                continue;
            }

            let title_seen = self.title_pending;
            self.title_pending = false;
            return Ok(Some(RecordRef {
                range,
                header,
                title_seen,
            }));
        }
        Ok(None)
    }

    /// Resolve a [`RecordRef`] to its bytes.
    pub fn record_bytes(&self, rec: &RecordRef) -> &[u8] {
        &self.block[rec.range.clone()]
    }
}
