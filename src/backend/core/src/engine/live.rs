//! Live occupancy: who is where right now.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::model::{Activity, ActivityId, Location, Participant, ParticipantId};

/// Partition of the roster into activity buckets plus the unassigned bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveOccupancy {
    /// One bucket per known activity, possibly empty.
    pub per_activity: BTreeMap<ActivityId, Vec<Participant>>,
    pub unassigned: Vec<Participant>,
    /// Participants whose roster points at an activity that no longer exists.
    /// They are also counted in `unassigned`.
    pub dangling: Vec<(ParticipantId, ActivityId)>,
}

impl LiveOccupancy {
    /// Number of participants in the activity's bucket (0 for unknown ids).
    pub fn count(&self, activity_id: ActivityId) -> usize {
        self.per_activity.get(&activity_id).map_or(0, Vec::len)
    }

    /// Total participants across every bucket.
    pub fn total(&self) -> usize {
        self.unassigned.len() + self.per_activity.values().map(Vec::len).sum::<usize>()
    }
}

/// Display order for member lists: case-insensitive name, then id.
pub fn by_display_name(a: &Participant, b: &Participant) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

/// Bucket every participant by current location.
///
/// Never fails: a location pointing at an unknown activity lands in
/// `unassigned` and is reported in `dangling`.
pub fn compute_live_occupancy(participants: &[Participant], activities: &[Activity]) -> LiveOccupancy {
    let known: HashSet<ActivityId> = activities.iter().map(|a| a.id).collect();

    let mut live = LiveOccupancy {
        per_activity: activities.iter().map(|a| (a.id, Vec::new())).collect(),
        ..Default::default()
    };

    for participant in participants {
        match participant.location {
            Location::Activity(activity_id) if known.contains(&activity_id) => {
                if let Some(bucket) = live.per_activity.get_mut(&activity_id) {
                    bucket.push(participant.clone());
                }
            }
            Location::Activity(activity_id) => {
                live.dangling.push((participant.id, activity_id));
                live.unassigned.push(participant.clone());
            }
            Location::Unassigned => live.unassigned.push(participant.clone()),
        }
    }

    for bucket in live.per_activity.values_mut() {
        bucket.sort_by(by_display_name);
    }
    live.unassigned.sort_by(by_display_name);
    live.dangling.sort();

    live
}
