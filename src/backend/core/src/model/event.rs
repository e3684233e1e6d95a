//! Events and current-event selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EventId;

/// A scheduled event (camp, conference) owning its own roster and ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub active: bool,
}

impl Event {
    pub fn new(name: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            start_date,
            end_date,
            active: false,
        }
    }

    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }
}

/// Pick the event dashboards should show: the most recently started active
/// event. Equal start dates fall back to the greater id so the choice does
/// not depend on input order.
pub fn select_current_event(events: &[Event]) -> Option<&Event> {
    events
        .iter()
        .filter(|e| e.active)
        .max_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)))
}
