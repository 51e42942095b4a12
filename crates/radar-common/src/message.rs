//! Raw message hand-off between transports and the reformat step.

/// NEXRAD Level II message types (Archive II message header, halfword 8.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Message type 1: digital radar data. The only kind the pipeline
    /// republishes.
    DigitalRadarData,
    /// Any other message type, carried with its raw type code so skips can
    /// be logged meaningfully.
    Other(u8),
}

impl MessageKind {
    pub fn from_type_code(code: u8) -> Self {
        match code {
            1 => Self::DigitalRadarData,
            other => Self::Other(other),
        }
    }

    pub fn type_code(self) -> u8 {
        match self {
            Self::DigitalRadarData => 1,
            Self::Other(code) => code,
        }
    }
}

/// One vendor message as extracted from transport framing.
///
/// Borrows the owning adapter's reuse buffer: the data is valid only until
/// the next `next_message()` call, and callers must not retain it across
/// calls.
#[derive(Debug)]
pub struct RawMessage<'a> {
    /// The logical record, CTM block included.
    pub data: &'a [u8],
    pub kind: MessageKind,
    /// True when a volume-title boundary was seen since the previous
    /// extracted message.
    pub volume_title_seen: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(
            MessageKind::from_type_code(1),
            MessageKind::DigitalRadarData
        );
        assert_eq!(MessageKind::from_type_code(2), MessageKind::Other(2));
        assert_eq!(MessageKind::Other(31).type_code(), 31);
    }
}
