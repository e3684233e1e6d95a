//! Detect-and-heal for roster/ledger divergence.
//!
//! The ledger is authoritative: a participant's roster location must equal
//! the location of their newest ledger entry by stamp, or unassigned when
//! they have none. Repairs overwrite the roster and never touch the ledger.
//!
//! A scan only nominates participants. Each repair re-derives the location
//! inside the store under the participant's lock, so a transition committed
//! between the scan and the repair is kept, and a participant that became
//! consistent in the meantime is skipped.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, RollcallError};
use crate::model::{
    Activity, ActivityId, AttendanceLogEntry, EventId, Location, Participant, ParticipantId,
    TransitionStamp,
};
use crate::store::AttendanceStore;
use crate::telemetry::DIVERGENCES_REPAIRED_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// Roster disagrees with the newest ledger entry.
    Mismatch,
    /// Roster points at an activity that does not exist.
    DanglingActivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub participant_id: ParticipantId,
    pub roster: Location,
    pub expected: Location,
    pub expected_stamp: Option<TransitionStamp>,
    pub reason: DivergenceReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub event_id: EventId,
    pub checked: usize,
    pub repaired: Vec<Divergence>,
}

/// Newest ledger location per participant, by `(timestamp, sequence)`.
pub fn expected_locations(
    ledger: &[AttendanceLogEntry],
) -> HashMap<ParticipantId, (Location, TransitionStamp)> {
    let mut latest: HashMap<ParticipantId, (Location, TransitionStamp)> = HashMap::new();
    for entry in ledger {
        let stamp = entry.stamp();
        latest
            .entry(entry.participant_id)
            .and_modify(|held| {
                if stamp > held.1 {
                    *held = (entry.location(), stamp);
                }
            })
            .or_insert((entry.location(), stamp));
    }
    latest
}

/// Every participant whose roster location differs from the ledger.
///
/// Sorted by participant id.
pub fn find_divergences(
    participants: &[Participant],
    activities: &[Activity],
    ledger: &[AttendanceLogEntry],
) -> Vec<Divergence> {
    let known: HashSet<ActivityId> = activities.iter().map(|a| a.id).collect();
    let latest = expected_locations(ledger);
    let resolvable = |location: Location| match location {
        Location::Activity(id) if !known.contains(&id) => Location::Unassigned,
        other => other,
    };

    let mut divergences: Vec<Divergence> = participants
        .iter()
        .filter_map(|participant| {
            let (expected, expected_stamp) = match latest.get(&participant.id) {
                Some((location, stamp)) => (resolvable(*location), Some(*stamp)),
                None => (Location::Unassigned, None),
            };

            let dangling = matches!(participant.location, Location::Activity(id) if !known.contains(&id));
            let reason = if dangling {
                DivergenceReason::DanglingActivity
            } else if participant.location != expected {
                DivergenceReason::Mismatch
            } else {
                return None;
            };

            Some(Divergence {
                participant_id: participant.id,
                roster: participant.location,
                expected,
                expected_stamp,
                reason,
            })
        })
        .collect();

    divergences.sort_by_key(|d| d.participant_id);
    divergences
}

pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
}

impl<S> Reconciler<S>
where
    S: AttendanceStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn scan(&self, event_id: EventId) -> Result<(usize, Vec<Divergence>)> {
        let snapshot = self
            .store
            .fetch_snapshot(event_id)
            .await?
            .ok_or_else(|| RollcallError::event_not_found(event_id))?;
        let divergences = find_divergences(&snapshot.participants, &snapshot.activities, &snapshot.ledger);
        Ok((snapshot.participants.len(), divergences))
    }

    /// Fail with `Conflict` if any participant diverges.
    #[instrument(skip(self))]
    pub async fn verify(&self, event_id: EventId) -> Result<()> {
        let (_, divergences) = self.scan(event_id).await?;
        if divergences.is_empty() {
            return Ok(());
        }
        let error = RollcallError::conflict(event_id, divergences.len()).with_context(
            "participants",
            divergences
                .iter()
                .map(|d| d.participant_id.to_string())
                .collect::<Vec<_>>(),
        );
        error.log();
        Err(error)
    }

    /// Put the ledger-derived location onto every divergent participant.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, event_id: EventId) -> Result<ReconcileReport> {
        let (checked, candidates) = self.scan(event_id).await?;
        let mut repaired = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some(divergence) = self
                .store
                .repair_location(event_id, candidate.participant_id)
                .await?
            else {
                debug!(participant_id = %candidate.participant_id, "Already consistent at repair time");
                continue;
            };

            warn!(
                participant_id = %divergence.participant_id,
                roster = %divergence.roster,
                expected = %divergence.expected,
                reason = ?divergence.reason,
                "Repaired roster divergence"
            );
            counter!(DIVERGENCES_REPAIRED_TOTAL).increment(1);
            repaired.push(divergence);
        }

        info!(checked, repaired = repaired.len(), "Reconciliation finished");

        Ok(ReconcileReport {
            event_id,
            checked,
            repaired,
        })
    }
}
