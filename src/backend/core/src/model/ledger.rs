//! The attendance ledger: immutable records of accepted transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ActivityId, EntryId, EventId, ParticipantId};
use super::participant::Location;

/// Orders transitions: by timestamp, then by the event-scoped sequence number
/// the store assigned at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionStamp {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl TransitionStamp {
    pub fn new(timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self { timestamp, sequence }
    }
}

/// One accepted transition. A checkout has no activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLogEntry {
    pub id: EntryId,
    pub event_id: EventId,
    pub participant_id: ParticipantId,
    pub activity_id: Option<ActivityId>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl AttendanceLogEntry {
    pub fn stamp(&self) -> TransitionStamp {
        TransitionStamp::new(self.timestamp, self.sequence)
    }

    pub fn location(&self) -> Location {
        Location::from(self.activity_id)
    }

    pub fn is_checkout(&self) -> bool {
        self.activity_id.is_none()
    }
}

/// Classification of an accepted transition relative to the location the
/// participant held when it was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    CheckIn,
    CheckOut,
    /// Target equals the location already held; still logged.
    ReConfirm,
}

impl TransitionKind {
    pub fn classify(previous: Location, target: Location) -> Self {
        if previous == target {
            Self::ReConfirm
        } else if target.is_unassigned() {
            Self::CheckOut
        } else {
            Self::CheckIn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::CheckOut => "check_out",
            Self::ReConfirm => "re_confirm",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stamp_orders_by_timestamp_then_sequence() {
        let t = Utc::now();
        assert!(TransitionStamp::new(t, 9) < TransitionStamp::new(t + Duration::milliseconds(1), 1));
        assert!(TransitionStamp::new(t, 1) < TransitionStamp::new(t, 2));
    }

    #[test]
    fn test_classify() {
        let a = Location::Activity(ActivityId::new());
        let b = Location::Activity(ActivityId::new());
        assert_eq!(TransitionKind::classify(Location::Unassigned, a), TransitionKind::CheckIn);
        assert_eq!(TransitionKind::classify(a, b), TransitionKind::CheckIn);
        assert_eq!(TransitionKind::classify(a, Location::Unassigned), TransitionKind::CheckOut);
        assert_eq!(TransitionKind::classify(a, a), TransitionKind::ReConfirm);
        assert_eq!(
            TransitionKind::classify(Location::Unassigned, Location::Unassigned),
            TransitionKind::ReConfirm
        );
    }
}
