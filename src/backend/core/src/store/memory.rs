//! In-memory attendance store.
//!
//! All events live in one map guarded by a single `parking_lot::RwLock`.
//! Every write takes the write lock for its whole duration, which is what
//! makes `commit_transition` indivisible: readers see either the state
//! before the append and roster update, or the state after both.
//! `fetch_snapshot` copies a whole partition under one read guard.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

use super::{AttendanceStore, CommittedTransition, StoreSnapshot, TransitionRequest};
use crate::engine::reconcile::{find_divergences, Divergence};
use crate::error::{Result, RollcallError};
use crate::model::{
    Activity, ActivityId, AttendanceLogEntry, EntryId, Event, EventId, Location, Participant,
    ParticipantId,
};

/// Everything stored for one event.
#[derive(Debug, Clone)]
struct Partition {
    event: Event,
    participants: BTreeMap<ParticipantId, Participant>,
    activities: BTreeMap<ActivityId, Activity>,
    ledger: Vec<AttendanceLogEntry>,
    /// Activities being deleted; check-ins to them are refused.
    closed: BTreeSet<ActivityId>,
    next_sequence: u64,
}

impl Partition {
    fn new(event: Event) -> Self {
        Self {
            event,
            participants: BTreeMap::new(),
            activities: BTreeMap::new(),
            ledger: Vec::new(),
            closed: BTreeSet::new(),
            next_sequence: 1,
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            event: self.event.clone(),
            participants: self.participants.values().cloned().collect(),
            activities: self.activities.values().cloned().collect(),
            ledger: self.ledger.clone(),
        }
    }

    fn divergence_of(&self, participant_id: ParticipantId) -> Result<Option<Divergence>> {
        let participant = self
            .participants
            .get(&participant_id)
            .ok_or_else(|| RollcallError::participant_not_found(participant_id))?;
        let activities: Vec<Activity> = self.activities.values().cloned().collect();
        let history: Vec<AttendanceLogEntry> = self
            .ledger
            .iter()
            .filter(|entry| entry.participant_id == participant_id)
            .cloned()
            .collect();
        Ok(find_divergences(std::slice::from_ref(participant), &activities, &history)
            .into_iter()
            .next())
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// Serializable content for bootstrapping a store (CLI seed files, fixtures).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub ledger: Vec<AttendanceLogEntry>,
}

/// Process-local [`AttendanceStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    events: RwLock<BTreeMap<EventId, Partition>>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Build a store from seed data.
    ///
    /// Seeded ledger entries and roster locations are taken as given, without
    /// checking that they agree; run the reconciler to detect divergence.
    pub fn from_seed(seed: SeedData) -> Result<Self> {
        let store = Self::new();
        {
            let mut events = store.events.write();
            for event in seed.events {
                events.insert(event.id, Partition::new(event));
            }
            for activity in seed.activities {
                let partition = events
                    .get_mut(&activity.event_id)
                    .ok_or_else(|| RollcallError::event_not_found(activity.event_id))?;
                partition.activities.insert(activity.id, activity);
            }
            for participant in seed.participants {
                let partition = events
                    .get_mut(&participant.event_id)
                    .ok_or_else(|| RollcallError::event_not_found(participant.event_id))?;
                partition.participants.insert(participant.id, participant);
            }
            for entry in seed.ledger {
                let partition = events
                    .get_mut(&entry.event_id)
                    .ok_or_else(|| RollcallError::event_not_found(entry.event_id))?;
                partition.next_sequence = partition.next_sequence.max(entry.sequence + 1);
                partition.ledger.push(entry);
            }
            for partition in events.values_mut() {
                partition.ledger.sort_by_key(|e| e.sequence);
            }
        }
        Ok(store)
    }

    /// Simulate a store outage: while unavailable every call fails with
    /// `TransientIo` and nothing is modified.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RollcallError::transient_io("in-memory store marked unavailable"))
        }
    }
}

fn partition_mut(
    events: &mut BTreeMap<EventId, Partition>,
    event_id: EventId,
) -> Result<&mut Partition> {
    events
        .get_mut(&event_id)
        .ok_or_else(|| RollcallError::event_not_found(event_id))
}

#[async_trait]
impl AttendanceStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "in_memory"
    }

    async fn fetch_events(&self) -> Result<Vec<Event>> {
        self.ensure_available()?;
        Ok(self.events.read().values().map(|p| p.event.clone()).collect())
    }

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>> {
        self.ensure_available()?;
        Ok(self.events.read().get(&event_id).map(|p| p.event.clone()))
    }

    async fn fetch_participants(&self, event_id: EventId) -> Result<Vec<Participant>> {
        self.ensure_available()?;
        Ok(self
            .events
            .read()
            .get(&event_id)
            .map(|p| p.participants.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_activities(&self, event_id: EventId) -> Result<Vec<Activity>> {
        self.ensure_available()?;
        Ok(self
            .events
            .read()
            .get(&event_id)
            .map(|p| p.activities.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_ledger(&self, event_id: EventId) -> Result<Vec<AttendanceLogEntry>> {
        self.ensure_available()?;
        Ok(self
            .events
            .read()
            .get(&event_id)
            .map(|p| p.ledger.clone())
            .unwrap_or_default())
    }

    async fn fetch_snapshot(&self, event_id: EventId) -> Result<Option<StoreSnapshot>> {
        self.ensure_available()?;
        Ok(self.events.read().get(&event_id).map(Partition::snapshot))
    }

    async fn fetch_participant(&self, participant_id: ParticipantId) -> Result<Option<Participant>> {
        self.ensure_available()?;
        Ok(self
            .events
            .read()
            .values()
            .find_map(|p| p.participants.get(&participant_id).cloned()))
    }

    async fn fetch_activity(&self, activity_id: ActivityId) -> Result<Option<Activity>> {
        self.ensure_available()?;
        Ok(self
            .events
            .read()
            .values()
            .find_map(|p| p.activities.get(&activity_id).cloned()))
    }

    async fn find_participant_by_code(
        &self,
        event_id: EventId,
        code: &str,
    ) -> Result<Option<Participant>> {
        self.ensure_available()?;
        let code = code.trim();
        Ok(self.events.read().get(&event_id).and_then(|p| {
            p.participants
                .values()
                .find(|participant| participant.code == code)
                .cloned()
        }))
    }

    #[instrument(skip(self), fields(backend = "in_memory"))]
    async fn commit_transition(&self, request: &TransitionRequest) -> Result<CommittedTransition> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, request.event_id)?;

        // Everything is checked before anything is written.
        if let Location::Activity(activity_id) = request.target {
            if !partition.activities.contains_key(&activity_id) {
                return Err(RollcallError::activity_not_found(activity_id));
            }
            if partition.closed.contains(&activity_id) {
                return Err(RollcallError::activity_closed(activity_id));
            }
        }
        if !partition.participants.contains_key(&request.participant_id) {
            return Err(RollcallError::participant_not_found(request.participant_id));
        }

        let sequence = partition.take_sequence();
        let entry = AttendanceLogEntry {
            id: EntryId::new(),
            event_id: request.event_id,
            participant_id: request.participant_id,
            activity_id: request.target.activity(),
            timestamp: request.timestamp,
            sequence,
        };

        let participant = partition
            .participants
            .get_mut(&request.participant_id)
            .ok_or_else(|| RollcallError::participant_not_found(request.participant_id))?;
        let previous = participant.location;
        let applied = participant.apply_location(request.target, entry.stamp());
        let current = participant.location;
        partition.ledger.push(entry.clone());

        debug!(sequence, applied, "Transition committed");

        Ok(CommittedTransition {
            entry,
            previous,
            current,
            applied,
        })
    }

    async fn repair_location(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<Option<Divergence>> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        let Some(divergence) = partition.divergence_of(participant_id)? else {
            return Ok(None);
        };
        if let Some(participant) = partition.participants.get_mut(&participant_id) {
            participant.force_location(divergence.expected, divergence.expected_stamp);
        }
        Ok(Some(divergence))
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        self.ensure_available()?;
        let mut events = self.events.write();
        if events.contains_key(&event.id) {
            return Err(RollcallError::new(
                crate::error::ErrorCode::DuplicateRecord,
                format!("Event already exists: {}", event.id),
            ));
        }
        events.insert(event.id, Partition::new(event.clone()));
        Ok(())
    }

    async fn insert_participant(&self, participant: &Participant) -> Result<()> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, participant.event_id)?;
        if partition
            .participants
            .values()
            .any(|p| p.id == participant.id || p.code == participant.code)
        {
            return Err(RollcallError::new(
                crate::error::ErrorCode::DuplicateRecord,
                format!("Participant code already in use: {}", participant.code),
            ));
        }
        partition.participants.insert(participant.id, participant.clone());
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, activity.event_id)?;
        if partition
            .activities
            .values()
            .any(|a| a.id == activity.id || a.same_name(&activity.name))
        {
            return Err(RollcallError::duplicate_activity(&activity.name));
        }
        partition.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn update_activity(&self, activity: &Activity) -> Result<()> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, activity.event_id)?;
        if partition
            .activities
            .values()
            .any(|a| a.id != activity.id && a.same_name(&activity.name))
        {
            return Err(RollcallError::duplicate_activity(&activity.name));
        }
        let slot = partition
            .activities
            .get_mut(&activity.id)
            .ok_or_else(|| RollcallError::activity_not_found(activity.id))?;
        *slot = activity.clone();
        Ok(())
    }

    async fn close_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        if !partition.activities.contains_key(&activity_id) {
            return Ok(false);
        }
        partition.closed.insert(activity_id);
        Ok(true)
    }

    async fn purge_activity_entries(&self, event_id: EventId, activity_id: ActivityId) -> Result<u64> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        let before = partition.ledger.len();
        partition
            .ledger
            .retain(|entry| entry.activity_id != Some(activity_id));
        Ok((before - partition.ledger.len()) as u64)
    }

    async fn remove_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        partition.closed.remove(&activity_id);
        Ok(partition.activities.remove(&activity_id).is_some())
    }

    async fn purge_participant_entries(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<u64> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        let before = partition.ledger.len();
        partition
            .ledger
            .retain(|entry| entry.participant_id != participant_id);
        Ok((before - partition.ledger.len()) as u64)
    }

    async fn remove_participant(&self, event_id: EventId, participant_id: ParticipantId) -> Result<bool> {
        self.ensure_available()?;
        let mut events = self.events.write();
        let partition = partition_mut(&mut events, event_id)?;
        Ok(partition.participants.remove(&participant_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::ParticipantCategory;
    use chrono::{Duration, Utc};

    async fn seeded() -> (InMemoryStore, Event, Participant, Activity) {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let event = Event::new("Camp", now, now + Duration::days(3)).activated();
        store.insert_event(&event).await.unwrap();

        let participant =
            Participant::new(event.id, "Grace Lee", "Oakview", ParticipantCategory::Student, "QR-1");
        store.insert_participant(&participant).await.unwrap();

        let activity = crate::model::ActivityDraft::new("Archery", "Field 2").into_activity(event.id);
        store.insert_activity(&activity).await.unwrap();

        (store, event, participant, activity)
    }

    #[tokio::test]
    async fn test_commit_assigns_increasing_sequences() {
        let (store, event, participant, activity) = seeded().await;
        let now = Utc::now();

        let first = store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Activity(activity.id),
                timestamp: now,
            })
            .await
            .unwrap();
        let second = store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Unassigned,
                timestamp: now,
            })
            .await
            .unwrap();

        assert!(second.entry.sequence > first.entry.sequence);
        assert!(second.applied);
        assert_eq!(store.fetch_ledger(event.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_to_missing_activity_writes_nothing() {
        let (store, event, participant, _) = seeded().await;

        let err = store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Activity(ActivityId::new()),
                timestamp: Utc::now(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ActivityNotFound);
        assert!(store.fetch_ledger(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_activity_refuses_check_ins() {
        let (store, event, participant, activity) = seeded().await;
        assert!(store.close_activity(event.id, activity.id).await.unwrap());

        let err = store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Activity(activity.id),
                timestamp: Utc::now(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ActivityNotFound);
        assert!(store.fetch_ledger(event.id).await.unwrap().is_empty());
        assert!(!store.close_activity(event.id, ActivityId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_repair_derives_location_from_ledger() {
        let (store, event, participant, activity) = seeded().await;
        store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Activity(activity.id),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.repair_location(event.id, participant.id).await.unwrap(), None);

        {
            let mut events = store.events.write();
            let held = events
                .get_mut(&event.id)
                .and_then(|p| p.participants.get_mut(&participant.id))
                .unwrap();
            held.force_location(Location::Unassigned, None);
        }

        let repaired = store.repair_location(event.id, participant.id).await.unwrap().unwrap();
        assert_eq!(repaired.roster, Location::Unassigned);
        assert_eq!(repaired.expected, Location::Activity(activity.id));
        let snapshot = store.fetch_snapshot(event.id).await.unwrap().unwrap();
        assert_eq!(snapshot.participants[0].location, Location::Activity(activity.id));
        assert_eq!(snapshot.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_event_is_none() {
        let (store, _, _, _) = seeded().await;
        assert!(store.fetch_snapshot(EventId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_transiently() {
        let (store, event, _, _) = seeded().await;
        store.set_available(false);

        let err = store.fetch_participants(event.id).await.unwrap_err();
        assert!(err.is_retryable());

        store.set_available(true);
        assert_eq!(store.fetch_participants(event.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let (store, event, _, _) = seeded().await;
        let twin = Participant::new(event.id, "Sam Cho", "Grace Chapel", ParticipantCategory::Leader, "QR-1");

        let err = store.insert_participant(&twin).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn test_find_by_code_trims_input() {
        let (store, event, participant, _) = seeded().await;
        let found = store.find_participant_by_code(event.id, " QR-1 ").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(participant.id));
    }

    #[tokio::test]
    async fn test_seed_restores_sequence_counter() {
        let (store, event, participant, activity) = seeded().await;
        let seed = SeedData {
            events: vec![event.clone()],
            activities: vec![activity.clone()],
            participants: vec![participant.clone()],
            ledger: vec![AttendanceLogEntry {
                id: EntryId::new(),
                event_id: event.id,
                participant_id: participant.id,
                activity_id: Some(activity.id),
                timestamp: Utc::now(),
                sequence: 41,
            }],
        };
        drop(store);

        let store = InMemoryStore::from_seed(seed).unwrap();
        let committed = store
            .commit_transition(&TransitionRequest {
                event_id: event.id,
                participant_id: participant.id,
                target: Location::Unassigned,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(committed.entry.sequence, 42);
    }
}
