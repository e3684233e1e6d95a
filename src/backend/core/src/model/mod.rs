//! Domain model: events, activities, participants and the attendance ledger.
//!
//! Every entity carries the id of the event that owns it; aggregation is
//! always scoped to exactly one event.

pub mod activity;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod participant;

pub use activity::{Activity, ActivityDraft};
pub use event::{select_current_event, Event};
pub use ids::{ActivityId, EntryId, EventId, ParticipantId};
pub use ledger::{AttendanceLogEntry, TransitionKind, TransitionStamp};
pub use participant::{Location, Participant, ParticipantCategory};

/// Case-insensitive, whitespace-trimmed form used for name comparisons and
/// free-text matching.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
