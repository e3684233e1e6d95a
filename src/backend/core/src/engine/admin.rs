//! Activity and roster administration.
//!
//! Deleting an activity runs a compensating cascade:
//!
//! 1. the activity is closed, so the store refuses new check-ins to it
//! 2. every participant in the activity is checked out through
//!    [`AttendanceStore::commit_transition`], so roster and ledger stay paired
//! 3. every ledger entry naming the activity is purged
//! 4. anyone still pointing at the activity is repaired from the ledger
//! 5. the activity record is removed
//!
//! Each step is a no-op when repeated and the record goes last, so a cascade
//! interrupted by a store failure is finished by calling
//! [`ActivityAdmin::delete_activity`] again. Until then the activity stays
//! closed.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, RollcallError};
use crate::model::{Activity, ActivityDraft, ActivityId, EventId, Location, ParticipantId};
use crate::store::{AttendanceStore, TransitionRequest};
use crate::telemetry::ACTIVITY_CASCADES_TOTAL;

/// What one activity deletion did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub activity_id: ActivityId,
    /// Participants checked out of the activity.
    pub displaced: Vec<ParticipantId>,
    /// Ledger entries removed.
    pub purged_entries: u64,
    /// Whether the activity record still existed.
    pub removed: bool,
}

pub struct ActivityAdmin<S: ?Sized> {
    store: Arc<S>,
}

impl<S> ActivityAdmin<S>
where
    S: AttendanceStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn require_event(&self, event_id: EventId) -> Result<()> {
        match self.store.fetch_event(event_id).await? {
            Some(_) => Ok(()),
            None => Err(RollcallError::event_not_found(event_id)),
        }
    }

    async fn ensure_unique_name(&self, event_id: EventId, name: &str, except: Option<ActivityId>) -> Result<()> {
        let activities = self.store.fetch_activities(event_id).await?;
        let taken = activities
            .iter()
            .any(|a| Some(a.id) != except && a.same_name(name));
        if taken {
            return Err(RollcallError::duplicate_activity(name));
        }
        Ok(())
    }

    async fn activity_in_event(&self, event_id: EventId, activity_id: ActivityId) -> Result<Option<Activity>> {
        match self.store.fetch_activity(activity_id).await? {
            Some(activity) if activity.event_id != event_id => Err(RollcallError::invalid_event(
                "activity",
                activity_id,
                event_id,
                activity.event_id,
            )),
            other => Ok(other),
        }
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_activity(&self, event_id: EventId, draft: ActivityDraft) -> Result<Activity> {
        let draft = draft.validated()?;
        self.require_event(event_id).await?;
        self.ensure_unique_name(event_id, &draft.name, None).await?;

        let activity = draft.into_activity(event_id);
        self.store.insert_activity(&activity).await?;

        info!(activity_id = %activity.id, "Activity created");
        Ok(activity)
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn update_activity(
        &self,
        event_id: EventId,
        activity_id: ActivityId,
        draft: ActivityDraft,
    ) -> Result<Activity> {
        let draft = draft.validated()?;
        let existing = self
            .activity_in_event(event_id, activity_id)
            .await?
            .ok_or_else(|| RollcallError::activity_not_found(activity_id))?;
        self.ensure_unique_name(event_id, &draft.name, Some(activity_id)).await?;

        let updated = Activity {
            name: draft.name,
            description: draft.description,
            location: draft.location,
            ..existing
        };
        self.store.update_activity(&updated).await?;
        Ok(updated)
    }

    /// Delete an activity and everything that references it.
    ///
    /// Safe to call again after a failure, or for an activity that is
    /// already gone.
    #[instrument(skip(self))]
    pub async fn delete_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<CascadeReport> {
        self.require_event(event_id).await?;
        self.activity_in_event(event_id, activity_id).await?;

        self.store.close_activity(event_id, activity_id).await?;
        let mut displaced = self.check_out_everyone(event_id, activity_id).await?;
        let purged_entries = self.store.purge_activity_entries(event_id, activity_id).await?;
        for participant_id in self.release_stragglers(event_id, activity_id).await? {
            if !displaced.contains(&participant_id) {
                displaced.push(participant_id);
            }
        }
        let removed = self.store.remove_activity(event_id, activity_id).await?;

        counter!(ACTIVITY_CASCADES_TOTAL).increment(1);
        info!(
            displaced = displaced.len(),
            purged_entries,
            removed,
            "Activity deleted"
        );

        Ok(CascadeReport {
            activity_id,
            displaced,
            purged_entries,
            removed,
        })
    }

    async fn check_out_everyone(&self, event_id: EventId, activity_id: ActivityId) -> Result<Vec<ParticipantId>> {
        let target = Location::Activity(activity_id);
        let participants = self.store.fetch_participants(event_id).await?;
        let mut displaced = Vec::new();

        for participant in participants.iter().filter(|p| p.location == target) {
            // Never earlier than the stamp held, so the checkout wins on sequence.
            let now = Utc::now();
            let timestamp = participant
                .location_stamp
                .map_or(now, |stamp| stamp.timestamp.max(now));

            let request = TransitionRequest {
                event_id,
                participant_id: participant.id,
                target: Location::Unassigned,
                timestamp,
            };
            let committed = self.store.commit_transition(&request).await?;

            debug!(
                participant_id = %participant.id,
                applied = committed.applied,
                "Checked out by activity deletion"
            );
            displaced.push(participant.id);
        }

        Ok(displaced)
    }

    /// Repair anyone the checkout pass did not move, now that the ledger no
    /// longer names the activity.
    async fn release_stragglers(&self, event_id: EventId, activity_id: ActivityId) -> Result<Vec<ParticipantId>> {
        let target = Location::Activity(activity_id);
        let participants = self.store.fetch_participants(event_id).await?;
        let mut released = Vec::new();

        for participant in participants.iter().filter(|p| p.location == target) {
            if let Some(divergence) = self.store.repair_location(event_id, participant.id).await? {
                warn!(
                    participant_id = %participant.id,
                    expected = %divergence.expected,
                    "Released participant left in a deleted activity"
                );
                released.push(participant.id);
            }
        }

        Ok(released)
    }

    /// Delete several activities, stopping at the first failure.
    ///
    /// The error carries a `completed` context entry with the number of
    /// cascades that finished before it.
    #[instrument(skip(self, activity_ids), fields(count = activity_ids.len()))]
    pub async fn delete_activities(
        &self,
        event_id: EventId,
        activity_ids: &[ActivityId],
    ) -> Result<Vec<CascadeReport>> {
        let mut reports = Vec::with_capacity(activity_ids.len());
        for activity_id in activity_ids {
            match self.delete_activity(event_id, *activity_id).await {
                Ok(report) => reports.push(report),
                Err(e) => return Err(e.with_context("completed", reports.len())),
            }
        }
        Ok(reports)
    }

    /// Remove a participant and their ledger history. Returns the number of
    /// ledger entries removed.
    #[instrument(skip(self))]
    pub async fn remove_participant(&self, event_id: EventId, participant_id: ParticipantId) -> Result<u64> {
        let participant = self
            .store
            .fetch_participant(participant_id)
            .await?
            .ok_or_else(|| RollcallError::participant_not_found(participant_id))?;
        if participant.event_id != event_id {
            return Err(RollcallError::invalid_event(
                "participant",
                participant_id,
                event_id,
                participant.event_id,
            ));
        }

        let purged = self.store.purge_participant_entries(event_id, participant_id).await?;
        self.store.remove_participant(event_id, participant_id).await?;

        info!(purged, "Participant removed");
        Ok(purged)
    }
}
