//! Transport status codes.

/// Outcome of one transport read. Every adapter operation returns one of
/// these instead of failing through an error path, so the driver can apply a
/// uniform skip/advance/stop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// A message of the wanted kind was extracted.
    Ok,
    /// Malformed or unusable record; skip it and call again.
    BadData,
    /// Current medium exhausted; the adapter advances to the next one.
    EndOfFile,
    /// No more media. Clean terminal condition, not an error.
    EndOfData,
    /// Retry budget exhausted or sync permanently lost. Fatal.
    BadInputStream,
}

impl TransportStatus {
    /// True for conditions the driver recovers from by calling again.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Ok | Self::BadData | Self::EndOfFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_statuses() {
        assert!(TransportStatus::Ok.is_recoverable());
        assert!(TransportStatus::BadData.is_recoverable());
        assert!(TransportStatus::EndOfFile.is_recoverable());
        assert!(!TransportStatus::EndOfData.is_recoverable());
        assert!(!TransportStatus::BadInputStream.is_recoverable());
    }
}
