use serde::{Deserialize, Serialize};

/// The highest ledger event id an account's derived values were built from.
///
/// Comparing it with the source's latest id answers "did anything happen?"
/// without fetching the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_event_id: Option<i64>,
}

impl SyncCursor {
    pub fn new(last_event_id: Option<i64>) -> Self {
        Self { last_event_id }
    }

    /// True when the source reports an id beyond the stored one.
    pub fn has_changes(&self, latest: Option<i64>) -> bool {
        match (latest, self.last_event_id) {
            (Some(latest), Some(stored)) => latest > stored,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Moves the cursor to the highest id that was actually replayed.
    /// Never moves backwards; returns whether it advanced.
    pub fn commit(&mut self, replayed_max: Option<i64>) -> bool {
        if self.has_changes(replayed_max) {
            self.last_event_id = replayed_max;
            true
        } else {
            false
        }
    }
}
