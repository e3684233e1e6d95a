//! Engagement (visits per activity, all time) and roster demographics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Activity, ActivityId, AttendanceLogEntry, Participant, ParticipantCategory};

/// Check-in counts per activity over the whole ledger.
///
/// Re-confirms count as visits: every ledger entry carrying an activity is
/// one. Entries for activities that are no longer known are still counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub counts: BTreeMap<ActivityId, u64>,
}

impl Engagement {
    pub fn count(&self, activity_id: ActivityId) -> u64 {
        self.counts.get(&activity_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

pub fn compute_engagement(ledger: &[AttendanceLogEntry], activities: &[Activity]) -> Engagement {
    let mut counts: BTreeMap<ActivityId, u64> = activities.iter().map(|a| (a.id, 0)).collect();
    for activity_id in ledger.iter().filter_map(|entry| entry.activity_id) {
        *counts.entry(activity_id).or_insert(0) += 1;
    }
    Engagement { counts }
}

/// Roster totals by category and by affiliation group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub total: usize,
    pub students: usize,
    pub leaders: usize,
    /// Participants per affiliation group, keyed by the group as written.
    pub by_group: BTreeMap<String, usize>,
}

pub fn compute_demographics(participants: &[Participant]) -> Demographics {
    let mut demographics = Demographics {
        total: participants.len(),
        ..Default::default()
    };

    for participant in participants {
        match participant.category {
            ParticipantCategory::Student => demographics.students += 1,
            ParticipantCategory::Leader => demographics.leaders += 1,
        }
        *demographics
            .by_group
            .entry(participant.group.clone())
            .or_insert(0) += 1;
    }

    demographics
}
