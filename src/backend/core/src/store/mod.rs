//! Persistence collaborators for the roster and the ledger.
//!
//! The engine talks to storage only through [`AttendanceStore`]. Two
//! backends are provided:
//! - **InMemoryStore**: one lock over each event partition; used by single
//!   stations, the CLI and the test suite
//! - **PgStore**: PostgreSQL via sqlx, shared by many scanning stations

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryStore, SeedData};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::live::compute_live_occupancy;
use crate::engine::reconcile::Divergence;
use crate::error::Result;
use crate::model::{
    Activity, ActivityId, AttendanceLogEntry, Event, EventId, Location, Participant,
    ParticipantId, TransitionKind,
};

/// A validated request to move one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub event_id: EventId,
    pub participant_id: ParticipantId,
    pub target: Location,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of [`AttendanceStore::commit_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransition {
    /// The ledger entry that was appended.
    pub entry: AttendanceLogEntry,
    /// Roster location immediately before the commit.
    pub previous: Location,
    /// Roster location immediately after the commit.
    pub current: Location,
    /// Whether the entry's stamp won the roster location.
    pub applied: bool,
}

impl CommittedTransition {
    pub fn kind(&self) -> TransitionKind {
        TransitionKind::classify(self.previous, self.entry.location())
    }
}

/// One event's roster, activities and ledger read at a single point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub event: Event,
    pub participants: Vec<Participant>,
    pub activities: Vec<Activity>,
    /// In append (sequence) order.
    pub ledger: Vec<AttendanceLogEntry>,
}

/// Roster and ledger storage for any number of events.
///
/// Implementations must make [`commit_transition`](Self::commit_transition)
/// indivisible: no reader may observe the ledger entry without the roster
/// update, or the reverse, and a failed commit must leave both untouched.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshot reads
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch_events(&self) -> Result<Vec<Event>>;

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>>;

    async fn fetch_participants(&self, event_id: EventId) -> Result<Vec<Participant>>;

    async fn fetch_activities(&self, event_id: EventId) -> Result<Vec<Activity>>;

    /// Ledger entries of the event in append (sequence) order.
    async fn fetch_ledger(&self, event_id: EventId) -> Result<Vec<AttendanceLogEntry>>;

    /// Everything stored for the event, read so that no commit lands between
    /// the roster and the ledger. `None` when the event does not exist.
    async fn fetch_snapshot(&self, event_id: EventId) -> Result<Option<StoreSnapshot>>;

    /// Participants currently in `activity_id`, sorted like the live view.
    async fn fetch_participants_by_activity(
        &self,
        event_id: EventId,
        activity_id: ActivityId,
    ) -> Result<Vec<Participant>> {
        let Some(snapshot) = self.fetch_snapshot(event_id).await? else {
            return Ok(Vec::new());
        };
        let mut live = compute_live_occupancy(&snapshot.participants, &snapshot.activities);
        Ok(live.per_activity.remove(&activity_id).unwrap_or_default())
    }

    /// Participants not currently in any activity, sorted like the live view.
    async fn fetch_unassigned_participants(&self, event_id: EventId) -> Result<Vec<Participant>> {
        let Some(snapshot) = self.fetch_snapshot(event_id).await? else {
            return Ok(Vec::new());
        };
        Ok(compute_live_occupancy(&snapshot.participants, &snapshot.activities).unassigned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookups (not scoped to an event, so callers can detect cross-event ids)
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch_participant(&self, participant_id: ParticipantId) -> Result<Option<Participant>>;

    async fn fetch_activity(&self, activity_id: ActivityId) -> Result<Option<Activity>>;

    async fn find_participant_by_code(
        &self,
        event_id: EventId,
        code: &str,
    ) -> Result<Option<Participant>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Append one ledger entry and apply it to the roster as one unit.
    ///
    /// The store assigns the entry's event-scoped sequence number. The roster
    /// location only changes when the entry's stamp is newer than the stamp
    /// the participant already holds.
    async fn commit_transition(&self, request: &TransitionRequest) -> Result<CommittedTransition>;

    /// Re-derive one participant's location from their newest ledger entry
    /// and write it if the roster disagrees.
    ///
    /// The ledger is read under the same lock as the roster write, so a
    /// transition committed after the caller's scan is never undone. Returns
    /// the divergence that was repaired, or `None` if there was none.
    async fn repair_location(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<Option<Divergence>>;

    async fn insert_event(&self, event: &Event) -> Result<()>;

    async fn insert_participant(&self, participant: &Participant) -> Result<()>;

    async fn insert_activity(&self, activity: &Activity) -> Result<()>;

    async fn update_activity(&self, activity: &Activity) -> Result<()>;

    /// Stop accepting check-ins to the activity. Commits targeting it fail
    /// with `ActivityNotFound` from then on. Returns whether it exists.
    async fn close_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool>;

    /// Delete every ledger entry of the event referencing the activity.
    /// Returns the number removed; zero on repeat calls.
    async fn purge_activity_entries(&self, event_id: EventId, activity_id: ActivityId) -> Result<u64>;

    /// Delete the activity record. Returns whether it existed.
    async fn remove_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool>;

    /// Delete every ledger entry of the participant. Returns the number removed.
    async fn purge_participant_entries(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<u64>;

    /// Delete the participant record. Returns whether it existed.
    async fn remove_participant(&self, event_id: EventId, participant_id: ParticipantId) -> Result<bool>;
}
