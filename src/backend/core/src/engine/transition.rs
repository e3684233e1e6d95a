//! Transition processor: validates and records check-ins and checkouts.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{Result, RollcallError};
use crate::model::{AttendanceLogEntry, EventId, Location, Participant, ParticipantId};
use crate::store::{AttendanceStore, CommittedTransition, TransitionRequest};
use crate::telemetry::TRANSITIONS_TOTAL;

/// Records transitions against one store.
pub struct TransitionProcessor<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for TransitionProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TransitionProcessor<S>
where
    S: AttendanceStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Move a participant to `target` (an activity or unassigned).
    ///
    /// Returns the appended ledger entry. The roster only follows the entry
    /// when its stamp is the newest the participant has seen; a transition
    /// that lost to a later one is still logged.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn record_transition(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        target: Location,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AttendanceLogEntry> {
        let participant = self
            .store
            .fetch_participant(participant_id)
            .await?
            .ok_or_else(|| RollcallError::participant_not_found(participant_id))?;

        self.commit(event_id, &participant, target, timestamp).await
    }

    /// Resolve a scanned code within the event, then record the transition.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn record_scan(
        &self,
        event_id: EventId,
        code: &str,
        target: Location,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AttendanceLogEntry> {
        let participant = self
            .store
            .find_participant_by_code(event_id, code)
            .await?
            .ok_or_else(|| RollcallError::participant_not_found(code.trim()))?;

        self.commit(event_id, &participant, target, timestamp).await
    }

    async fn commit(
        &self,
        event_id: EventId,
        participant: &Participant,
        target: Location,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AttendanceLogEntry> {
        self.validate(event_id, participant, target).await?;

        let request = TransitionRequest {
            event_id,
            participant_id: participant.id,
            target,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        };

        let committed = match self.store.commit_transition(&request).await {
            Ok(committed) => committed,
            Err(e) => {
                e.log();
                return Err(e);
            }
        };

        record_outcome(&committed);
        Ok(committed.entry)
    }

    async fn validate(&self, event_id: EventId, participant: &Participant, target: Location) -> Result<()> {
        if self.store.fetch_event(event_id).await?.is_none() {
            return Err(RollcallError::event_not_found(event_id));
        }

        if participant.event_id != event_id {
            return Err(RollcallError::invalid_event(
                "participant",
                participant.id,
                event_id,
                participant.event_id,
            ));
        }

        if let Location::Activity(activity_id) = target {
            let activity = self
                .store
                .fetch_activity(activity_id)
                .await?
                .ok_or_else(|| RollcallError::activity_not_found(activity_id))?;
            if activity.event_id != event_id {
                return Err(RollcallError::invalid_event(
                    "activity",
                    activity_id,
                    event_id,
                    activity.event_id,
                ));
            }
        }

        Ok(())
    }
}

fn record_outcome(committed: &CommittedTransition) {
    let kind = committed.kind();
    let outcome = if committed.applied { "applied" } else { "superseded" };

    counter!(TRANSITIONS_TOTAL, "kind" => kind.as_str(), "outcome" => outcome).increment(1);

    if committed.applied {
        info!(
            participant_id = %committed.entry.participant_id,
            kind = %kind,
            from = %committed.previous,
            to = %committed.current,
            sequence = committed.entry.sequence,
            "Transition recorded"
        );
    } else {
        warn!(
            participant_id = %committed.entry.participant_id,
            kind = %kind,
            held = %committed.current,
            sequence = committed.entry.sequence,
            "Transition logged but superseded by a later stamp"
        );
    }
}
