//! Display-ready report structures.
//!
//! Composes live occupancy, engagement and demographics into sorted rows and
//! applies the free-text participant filter. Every ordering here is total, so
//! the same snapshot always renders identically whatever order the store
//! returned it in.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

use super::engagement::{Demographics, Engagement};
use super::live::{by_display_name, LiveOccupancy};
use crate::model::{normalize, Activity, ActivityId, Participant};

// ═══════════════════════════════════════════════════════════════════════════════
// Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// Case-insensitive substring match on participant name or affiliation group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    needle: String,
}

impl SearchFilter {
    pub fn new(text: &str) -> Self {
        Self {
            needle: normalize(text),
        }
    }

    /// Whether the filter is empty (matches everyone).
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn matches(&self, participant: &Participant) -> bool {
        self.is_empty()
            || participant.name.to_lowercase().contains(&self.needle)
            || participant.group.to_lowercase().contains(&self.needle)
    }

    fn apply(&self, members: &[Participant]) -> Vec<Participant> {
        members.iter().filter(|p| self.matches(p)).cloned().collect()
    }
}

impl From<Option<&str>> for SearchFilter {
    fn from(text: Option<&str>) -> Self {
        Self::new(text.unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

/// Members of one bucket after filtering, with the unfiltered size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberList {
    pub members: Vec<Participant>,
    pub total: usize,
}

impl MemberList {
    fn filtered(all: &[Participant], filter: &SearchFilter) -> Self {
        Self {
            members: filter.apply(all),
            total: all.len(),
        }
    }

    pub fn shown(&self) -> usize {
        self.members.len()
    }

    /// "shown / total" when a filter hides someone, otherwise the total.
    pub fn count_label(&self) -> String {
        if self.shown() == self.total {
            self.total.to_string()
        } else {
            format!("{} / {}", self.shown(), self.total)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRow {
    pub activity_id: ActivityId,
    pub name: String,
    pub location: String,
    /// Live occupant count, unaffected by the filter.
    pub live_count: usize,
    pub members: MemberList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRow {
    pub activity_id: ActivityId,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group: String,
    pub count: usize,
}

/// Dashboard tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub participants: usize,
    pub students: usize,
    pub leaders: usize,
    pub activities: usize,
    pub in_activities: usize,
    pub unassigned: usize,
}

/// Everything a dashboard renders for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportView {
    pub summary: ReportSummary,
    pub locations: Vec<LocationRow>,
    pub unassigned: MemberList,
    pub engagement: Vec<EngagementRow>,
    pub groups: Vec<GroupRow>,
    /// Whole roster after filtering, in display order.
    pub participants: Vec<Participant>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Composition
// ═══════════════════════════════════════════════════════════════════════════════

fn by_activity_name(a_name: &str, a_id: ActivityId, b_name: &str, b_id: ActivityId) -> Ordering {
    a_name
        .to_lowercase()
        .cmp(&b_name.to_lowercase())
        .then_with(|| a_id.cmp(&b_id))
}

/// Activity rows: busiest first, then by name.
pub fn location_rows(
    activities: &[Activity],
    live: &LiveOccupancy,
    filter: &SearchFilter,
) -> Vec<LocationRow> {
    let mut rows: Vec<LocationRow> = activities
        .iter()
        .map(|activity| {
            let all = live
                .per_activity
                .get(&activity.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            LocationRow {
                activity_id: activity.id,
                name: activity.name.clone(),
                location: activity.location.clone(),
                live_count: all.len(),
                members: MemberList::filtered(all, filter),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.live_count
            .cmp(&a.live_count)
            .then_with(|| by_activity_name(&a.name, a.activity_id, &b.name, b.activity_id))
    });
    rows
}

/// Known activities ranked by visit count.
pub fn engagement_ranking(activities: &[Activity], engagement: &Engagement) -> Vec<EngagementRow> {
    let mut rows: Vec<EngagementRow> = activities
        .iter()
        .map(|activity| EngagementRow {
            activity_id: activity.id,
            name: activity.name.clone(),
            count: engagement.count(activity.id),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| by_activity_name(&a.name, a.activity_id, &b.name, b.activity_id))
    });
    rows
}

/// Affiliation groups ranked by member count.
pub fn group_ranking(demographics: &Demographics) -> Vec<GroupRow> {
    let mut rows: Vec<GroupRow> = demographics
        .by_group
        .iter()
        .map(|(group, count)| GroupRow {
            group: group.clone(),
            count: *count,
        })
        .collect();

    // Groups are distinct map keys, so the exact-name tiebreak makes this total.
    rows.sort_by_key(|row| (Reverse(row.count), row.group.to_lowercase(), row.group.clone()));
    rows
}

pub fn compose_report(
    activities: &[Activity],
    participants: &[Participant],
    live: &LiveOccupancy,
    engagement: &Engagement,
    demographics: &Demographics,
    filter: &SearchFilter,
) -> ReportView {
    let summary = ReportSummary {
        participants: demographics.total,
        students: demographics.students,
        leaders: demographics.leaders,
        activities: activities.len(),
        in_activities: live.total() - live.unassigned.len(),
        unassigned: live.unassigned.len(),
    };

    let mut roster = filter.apply(participants);
    roster.sort_by(by_display_name);

    ReportView {
        summary,
        locations: location_rows(activities, live, filter),
        unassigned: MemberList::filtered(&live.unassigned, filter),
        engagement: engagement_ranking(activities, engagement),
        groups: group_ranking(demographics),
        participants: roster,
    }
}
