//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rollcall_core::engine::Divergence;
use rollcall_core::error::Result;
use rollcall_core::model::{
    Activity, ActivityDraft, ActivityId, AttendanceLogEntry, EntryId, Event, EventId, Location,
    Participant, ParticipantCategory, ParticipantId,
};
use rollcall_core::store::{
    AttendanceStore, CommittedTransition, InMemoryStore, StoreSnapshot, TransitionRequest,
};
use std::sync::Arc;

/// A fixed clock origin so test timestamps are reproducible.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
}

pub struct Camp {
    pub store: Arc<InMemoryStore>,
    pub event: Event,
    pub archery: Activity,
    pub canoe: Activity,
    pub grace: Participant,
    pub sam: Participant,
    pub ana: Participant,
}

impl Camp {
    pub fn event_id(&self) -> EventId {
        self.event.id
    }

    pub async fn location_of(&self, participant_id: ParticipantId) -> Location {
        self.store
            .fetch_participant(participant_id)
            .await
            .unwrap()
            .unwrap()
            .location
    }

    pub async fn ledger(&self) -> Vec<AttendanceLogEntry> {
        self.store.fetch_ledger(self.event.id).await.unwrap()
    }
}

pub fn summer_event() -> Event {
    Event::new("Summer Camp", at(0), at(3 * 24 * 3600)).activated()
}

/// One active event with two activities and three unassigned participants.
pub async fn camp() -> Camp {
    let store = Arc::new(InMemoryStore::new());
    let event = summer_event();
    store.insert_event(&event).await.unwrap();

    let archery = ActivityDraft::new("Archery", "North Field").into_activity(event.id);
    let canoe = ActivityDraft::new("Canoe", "Lake Front").into_activity(event.id);
    store.insert_activity(&archery).await.unwrap();
    store.insert_activity(&canoe).await.unwrap();

    let grace = Participant::new(event.id, "Grace Lee", "Oakview", ParticipantCategory::Student, "QR-001");
    let sam = Participant::new(event.id, "Sam Cho", "Grace Chapel", ParticipantCategory::Leader, "QR-002");
    let ana = Participant::new(event.id, "Ana Ruiz", "Lakeside", ParticipantCategory::Student, "QR-003");
    for p in [&grace, &sam, &ana] {
        store.insert_participant(p).await.unwrap();
    }

    Camp {
        store,
        event,
        archery,
        canoe,
        grace,
        sam,
        ana,
    }
}

/// A second event in the same store, with one activity and one participant.
pub async fn other_event(store: &InMemoryStore) -> (Event, Activity, Participant) {
    let event = Event::new("Winter Retreat", at(-90 * 24 * 3600), at(-88 * 24 * 3600));
    store.insert_event(&event).await.unwrap();
    let activity = ActivityDraft::new("Archery", "Gym").into_activity(event.id);
    store.insert_activity(&activity).await.unwrap();
    let participant = Participant::new(event.id, "Eli Park", "Oakview", ParticipantCategory::Student, "QR-001");
    store.insert_participant(&participant).await.unwrap();
    (event, activity, participant)
}

pub fn participant_at(event_id: EventId, name: &str, group: &str, location: Location) -> Participant {
    let mut p = Participant::new(event_id, name, group, ParticipantCategory::Student, name);
    p.location = location;
    p
}

pub fn log_entry(
    participant: &Participant,
    activity_id: Option<ActivityId>,
    seconds: i64,
    sequence: u64,
) -> AttendanceLogEntry {
    AttendanceLogEntry {
        id: EntryId::new(),
        event_id: participant.event_id,
        participant_id: participant.id,
        activity_id,
        timestamp: at(seconds),
        sequence,
    }
}

// ============================================================================
// Interleaving
// ============================================================================

/// Store calls a [`HookedStore`] can slip its transition in front of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    FetchSnapshot,
    FetchParticipants,
    FetchActivities,
    FetchLedger,
    RepairLocation,
    CloseActivity,
    PurgeActivityEntries,
}

/// Delegates to an [`InMemoryStore`] and commits one extra transition the
/// first time the hooked call is made, just before delegating it. This
/// plays a scanning station racing a multi-step reader or repair.
pub struct HookedStore {
    pub inner: Arc<InMemoryStore>,
    hook: Hook,
    pending: Mutex<Option<TransitionRequest>>,
    fired: Mutex<Option<Result<CommittedTransition>>>,
}

impl HookedStore {
    pub fn new(inner: Arc<InMemoryStore>, hook: Hook, request: TransitionRequest) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hook,
            pending: Mutex::new(Some(request)),
            fired: Mutex::new(None),
        })
    }

    /// Outcome of the injected commit, once it has fired.
    pub fn fired(&self) -> Option<Result<CommittedTransition>> {
        self.fired.lock().take()
    }

    async fn reach(&self, point: Hook) {
        if point != self.hook {
            return;
        }
        let request = self.pending.lock().take();
        if let Some(request) = request {
            let outcome = self.inner.commit_transition(&request).await;
            *self.fired.lock() = Some(outcome);
        }
    }
}

#[async_trait]
impl AttendanceStore for HookedStore {
    fn backend_name(&self) -> &'static str {
        "hooked"
    }

    async fn fetch_events(&self) -> Result<Vec<Event>> {
        self.inner.fetch_events().await
    }

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>> {
        self.inner.fetch_event(event_id).await
    }

    async fn fetch_participants(&self, event_id: EventId) -> Result<Vec<Participant>> {
        self.reach(Hook::FetchParticipants).await;
        self.inner.fetch_participants(event_id).await
    }

    async fn fetch_activities(&self, event_id: EventId) -> Result<Vec<Activity>> {
        self.reach(Hook::FetchActivities).await;
        self.inner.fetch_activities(event_id).await
    }

    async fn fetch_ledger(&self, event_id: EventId) -> Result<Vec<AttendanceLogEntry>> {
        self.reach(Hook::FetchLedger).await;
        self.inner.fetch_ledger(event_id).await
    }

    async fn fetch_snapshot(&self, event_id: EventId) -> Result<Option<StoreSnapshot>> {
        self.reach(Hook::FetchSnapshot).await;
        self.inner.fetch_snapshot(event_id).await
    }

    async fn fetch_participant(&self, participant_id: ParticipantId) -> Result<Option<Participant>> {
        self.inner.fetch_participant(participant_id).await
    }

    async fn fetch_activity(&self, activity_id: ActivityId) -> Result<Option<Activity>> {
        self.inner.fetch_activity(activity_id).await
    }

    async fn find_participant_by_code(&self, event_id: EventId, code: &str) -> Result<Option<Participant>> {
        self.inner.find_participant_by_code(event_id, code).await
    }

    async fn commit_transition(&self, request: &TransitionRequest) -> Result<CommittedTransition> {
        self.inner.commit_transition(request).await
    }

    async fn repair_location(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<Option<Divergence>> {
        self.reach(Hook::RepairLocation).await;
        self.inner.repair_location(event_id, participant_id).await
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        self.inner.insert_event(event).await
    }

    async fn insert_participant(&self, participant: &Participant) -> Result<()> {
        self.inner.insert_participant(participant).await
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.inner.insert_activity(activity).await
    }

    async fn update_activity(&self, activity: &Activity) -> Result<()> {
        self.inner.update_activity(activity).await
    }

    async fn close_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        self.reach(Hook::CloseActivity).await;
        self.inner.close_activity(event_id, activity_id).await
    }

    async fn purge_activity_entries(&self, event_id: EventId, activity_id: ActivityId) -> Result<u64> {
        self.reach(Hook::PurgeActivityEntries).await;
        self.inner.purge_activity_entries(event_id, activity_id).await
    }

    async fn remove_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        self.inner.remove_activity(event_id, activity_id).await
    }

    async fn purge_participant_entries(&self, event_id: EventId, participant_id: ParticipantId) -> Result<u64> {
        self.inner.purge_participant_entries(event_id, participant_id).await
    }

    async fn remove_participant(&self, event_id: EventId, participant_id: ParticipantId) -> Result<bool> {
        self.inner.remove_participant(event_id, participant_id).await
    }
}

pub fn move_to(event_id: EventId, participant_id: ParticipantId, target: Location, seconds: i64) -> TransitionRequest {
    TransitionRequest {
        event_id,
        participant_id,
        target,
        timestamp: at(seconds),
    }
}
