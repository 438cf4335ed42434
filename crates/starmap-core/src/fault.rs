//! Fault types for navigation errors.
//!
//! Faults are recoverable: the navigator is always left in a consistent
//! idle state and the fault is surfaced to the user as a notice.

use thiserror::Error;

/// Navigation fault - a recoverable error while handling a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavFault {
    /// Empty or whitespace-only title.
    #[error("Invalid title: {0:?}")]
    InvalidTitle(String),

    /// Relative travel requested before any center exists.
    #[error("No current center: start a search first")]
    NoCenter,

    /// Breadcrumb index past the end of history.
    #[error("History index {index} out of range (len {len})")]
    HistoryIndexOutOfRange { index: usize, len: usize },

    /// A dispatched back/forward step with no entry in that direction.
    #[error("No history entry in that direction")]
    NoHistoryEntry,

    /// Command that cannot be queued arrived during a travel.
    #[error("A travel is already in progress")]
    Busy,

    /// A fetch result arrived for a travel that is no longer in flight.
    #[error("Stale travel result {0}")]
    StaleTravel(u64),

    /// The neighbor provider failed.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl NavFault {
    /// Faults the user can resolve by trying a different action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NavFault::InvalidTitle(_)
                | NavFault::NoCenter
                | NavFault::NoHistoryEntry
                | NavFault::Busy
                | NavFault::Provider(_)
        )
    }

    /// Faults that indicate a driver or programming error.
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            NavFault::StaleTravel(_) | NavFault::HistoryIndexOutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classification() {
        assert!(NavFault::NoHistoryEntry.is_recoverable());
        assert!(NavFault::Busy.is_recoverable());
        assert!(!NavFault::StaleTravel(3).is_recoverable());
        assert!(NavFault::StaleTravel(3).is_bug());
        assert!(!NavFault::NoCenter.is_bug());
    }

    #[test]
    fn fault_display() {
        let fault = NavFault::HistoryIndexOutOfRange { index: 7, len: 3 };
        assert!(fault.to_string().contains('7'));
        assert!(NavFault::Provider("timeout".into())
            .to_string()
            .contains("timeout"));
    }
}
