//! Participants and their current location.
//!
//! The location field behaves as a last-writer-wins register keyed by the
//! `(timestamp, sequence)` stamp of the transition that wrote it: a write
//! carrying an older stamp never overwrites a newer one, whatever order the
//! writes arrive in.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ActivityId, EventId, ParticipantId};
use super::ledger::TransitionStamp;

/// Role of a participant at the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantCategory {
    Student,
    Leader,
}

impl ParticipantCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Leader => "leader",
        }
    }
}

impl fmt::Display for ParticipantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a participant currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Not in any activity.
    #[default]
    Unassigned,
    /// Checked into the given activity.
    Activity(ActivityId),
}

impl Location {
    pub fn activity(&self) -> Option<ActivityId> {
        match self {
            Self::Unassigned => None,
            Self::Activity(id) => Some(*id),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Self::Unassigned)
    }
}

impl From<Option<ActivityId>> for Location {
    fn from(activity: Option<ActivityId>) -> Self {
        match activity {
            Some(id) => Self::Activity(id),
            None => Self::Unassigned,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unassigned => f.write_str("unassigned"),
            Self::Activity(id) => write!(f, "activity:{}", id),
        }
    }
}

/// A participant on the event roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub event_id: EventId,
    pub name: String,
    /// Affiliation group (church, school, organization).
    pub group: String,
    pub category: ParticipantCategory,
    /// Scannable code, unique within the event.
    pub code: String,
    #[serde(default)]
    pub location: Location,
    /// Stamp of the transition that last wrote `location`.
    #[serde(default)]
    pub location_stamp: Option<TransitionStamp>,
}

impl Participant {
    pub fn new(
        event_id: EventId,
        name: impl Into<String>,
        group: impl Into<String>,
        category: ParticipantCategory,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: ParticipantId::new(),
            event_id,
            name: name.into(),
            group: group.into(),
            category,
            code: code.into(),
            location: Location::Unassigned,
            location_stamp: None,
        }
    }

    /// Apply a location write if its stamp is newer than the one held.
    ///
    /// Returns whether the write won.
    pub fn apply_location(&mut self, location: Location, stamp: TransitionStamp) -> bool {
        if self.should_accept(stamp) {
            self.location = location;
            self.location_stamp = Some(stamp);
            true
        } else {
            false
        }
    }

    /// Overwrite the location regardless of stamps (ledger repair).
    pub fn force_location(&mut self, location: Location, stamp: Option<TransitionStamp>) {
        self.location = location;
        self.location_stamp = stamp;
    }

    fn should_accept(&self, stamp: TransitionStamp) -> bool {
        match self.location_stamp {
            None => true,
            Some(current) => stamp > current,
        }
    }
}
