//! Output queue abstraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use radar_common::RadarBeamState;

/// Which content categories a queue write carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentMask(u32);

impl ContentMask {
    pub const FLAGS: Self = Self(1);
    pub const SAMPLES: Self = Self(1 << 1);
    pub const PARAMS: Self = Self(1 << 2);
    pub const FIELD_PARAMS: Self = Self(1 << 3);

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Standalone control messages, written apart from beam content when the
/// consumer wants boundary flags as separate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    StartOfVolume,
    EndOfVolume,
    StartOfTilt,
    EndOfTilt,
    NewScanType,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode beam: {0}")]
    Encode(String),
}

/// The one interface the multiplexer writes through. A failed write is
/// fatal to the pipeline; implementations own their durability.
pub trait BeamQueue {
    fn write_beam(&mut self, beam: &RadarBeamState, mask: ContentMask) -> Result<(), QueueError>;
    fn write_marker(&mut self, marker: Marker, beam: &RadarBeamState) -> Result<(), QueueError>;
}

/// One recorded write, as kept by [`MemoryQueue`].
#[derive(Debug, Clone)]
pub enum QueueWrite {
    Beam {
        mask: ContentMask,
        beam: Box<RadarBeamState>,
    },
    Marker(Marker),
}

/// In-memory queue recording every write in order. Test instrumentation.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    pub writes: Vec<QueueWrite>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The (mask, beam) pairs of beam writes only, in write order.
    pub fn beams(&self) -> Vec<(&ContentMask, &RadarBeamState)> {
        self.writes
            .iter()
            .filter_map(|w| match w {
                QueueWrite::Beam { mask, beam } => Some((mask, beam.as_ref())),
                QueueWrite::Marker(_) => None,
            })
            .collect()
    }
}

impl BeamQueue for MemoryQueue {
    fn write_beam(&mut self, beam: &RadarBeamState, mask: ContentMask) -> Result<(), QueueError> {
        self.writes.push(QueueWrite::Beam {
            mask,
            beam: Box::new(beam.clone()),
        });
        Ok(())
    }

    fn write_marker(&mut self, marker: Marker, _beam: &RadarBeamState) -> Result<(), QueueError> {
        self.writes.push(QueueWrite::Marker(marker));
        Ok(())
    }
}
