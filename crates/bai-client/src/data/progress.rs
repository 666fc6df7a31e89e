use std::fmt;

/// Phases of a transfer.
///
/// Connecting → Transferring → Completed, with Retrying interleaved when an
/// upload chunk fails and the offset is being resynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPhase {
    #[default]
    Connecting,
    Transferring,
    Retrying,
    /// Unpacking a downloaded archive part.
    Expanding,
    Completed,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Connecting => write!(f, "Connecting"),
            TransferPhase::Transferring => write!(f, "Transferring"),
            TransferPhase::Retrying => write!(f, "Retrying"),
            TransferPhase::Expanding => write!(f, "Expanding"),
            TransferPhase::Completed => write!(f, "Completed"),
        }
    }
}

/// Snapshot passed to progress callbacks.
///
/// `delta` is the number of bytes added since the previous report, so the
/// deltas of one transfer sum to `bytes_transferred` of the last report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferProgress {
    pub phase: TransferPhase,

    /// Cumulative bytes written (download) or acknowledged by the server (upload).
    pub bytes_transferred: u64,

    pub delta: u64,

    /// Declared total, if the server or local file size provides one.
    pub total_bytes: Option<u64>,

    pub retry_count: u32,

    /// Name of the multipart part currently being written.
    pub part: Option<String>,
}

impl TransferProgress {
    /// Percentage of completion, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_transferred as f64 / total as f64) * 100.0
            }
        })
    }

    pub fn is_completed(&self) -> bool {
        self.phase == TransferPhase::Completed
    }

    pub fn is_retrying(&self) -> bool {
        self.phase == TransferPhase::Retrying
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = TransferProgress {
            bytes_transferred: 25,
            total_bytes: Some(100),
            ..Default::default()
        };
        assert_eq!(progress.percentage(), Some(25.0));

        let unknown = TransferProgress { bytes_transferred: 25, ..Default::default() };
        assert_eq!(unknown.percentage(), None);

        let empty = TransferProgress { total_bytes: Some(0), ..Default::default() };
        assert_eq!(empty.percentage(), Some(100.0));
    }

    #[test]
    fn test_phase_predicates() {
        let retrying = TransferProgress {
            phase: TransferPhase::Retrying,
            retry_count: 1,
            ..Default::default()
        };
        assert!(retrying.is_retrying());
        assert!(!retrying.is_completed());
        assert_eq!(TransferPhase::Expanding.to_string(), "Expanding");
    }
}
