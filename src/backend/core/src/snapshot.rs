//! Point-in-time event snapshots and their refresh.
//!
//! Dashboards render from an immutable [`EventSnapshot`] held by a
//! [`SnapshotHolder`]. Refreshes are numbered when they start; a finished
//! refresh replaces the displayed snapshot only if nothing started after it
//! has already been installed. A failed refresh keeps the old snapshot and
//! marks it stale.

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::engine::{
    compose_report, compute_demographics, compute_engagement, compute_live_occupancy, Demographics,
    Engagement, LiveOccupancy, Reconciler, ReportView, SearchFilter,
};
use crate::error::{Result, RollcallError};
use crate::model::{select_current_event, Activity, AttendanceLogEntry, Event, EventId, Participant};
use crate::store::{AttendanceStore, StoreSnapshot};
use crate::telemetry::REFRESHES_TOTAL;

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Roster, activities and ledger of one event, with aggregates precomputed.
#[derive(Debug, Clone, Serialize)]
pub struct EventSnapshot {
    pub event: Event,
    pub participants: Vec<Participant>,
    pub activities: Vec<Activity>,
    pub ledger: Vec<AttendanceLogEntry>,
    pub live: LiveOccupancy,
    pub engagement: Engagement,
    pub demographics: Demographics,
    pub fetched_at: DateTime<Utc>,
}

impl EventSnapshot {
    pub fn build(
        event: Event,
        participants: Vec<Participant>,
        activities: Vec<Activity>,
        ledger: Vec<AttendanceLogEntry>,
    ) -> Self {
        let live = compute_live_occupancy(&participants, &activities);
        let engagement = compute_engagement(&ledger, &activities);
        let demographics = compute_demographics(&participants);

        if !live.dangling.is_empty() {
            warn!(
                event_id = %event.id,
                dangling = live.dangling.len(),
                "Roster points at activities that no longer exist"
            );
        }

        Self {
            event,
            participants,
            activities,
            ledger,
            live,
            engagement,
            demographics,
            fetched_at: Utc::now(),
        }
    }

    /// Compose the dashboard view with the given participant filter.
    pub fn report(&self, filter: &SearchFilter) -> ReportView {
        compose_report(
            &self.activities,
            &self.participants,
            &self.live,
            &self.engagement,
            &self.demographics,
            filter,
        )
    }
}

/// Read one event's data in a single store snapshot and derive the views.
pub async fn load_snapshot<S>(store: &S, event_id: EventId) -> Result<EventSnapshot>
where
    S: AttendanceStore + ?Sized,
{
    let StoreSnapshot {
        event,
        participants,
        activities,
        ledger,
    } = store
        .fetch_snapshot(event_id)
        .await?
        .ok_or_else(|| RollcallError::event_not_found(event_id))?;

    Ok(EventSnapshot::build(event, participants, activities, ledger))
}

/// The most recently started active event, if any.
pub async fn current_event<S>(store: &S) -> Result<Option<Event>>
where
    S: AttendanceStore + ?Sized,
{
    let events = store.fetch_events().await?;
    Ok(select_current_event(&events).cloned())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Holder
// ═══════════════════════════════════════════════════════════════════════════════

/// Start number of one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// What happened to a finished refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Installed,
    /// A later refresh had already been installed.
    Discarded,
    /// The refresh failed; the previous snapshot was kept.
    Failed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Discarded => "discarded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotStatus {
    pub installed_ticket: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct HolderState {
    snapshot: Option<Arc<EventSnapshot>>,
    installed: u64,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SnapshotHolder {
    state: RwLock<HolderState>,
    next_ticket: AtomicU64,
}

impl SnapshotHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number a refresh that is about to start.
    pub fn begin(&self) -> RefreshTicket {
        RefreshTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Install a finished snapshot unless a later refresh already was.
    pub fn complete(&self, ticket: RefreshTicket, snapshot: EventSnapshot) -> RefreshOutcome {
        let mut state = self.state.write();
        if ticket.0 <= state.installed {
            debug!(ticket = ticket.0, installed = state.installed, "Discarding superseded snapshot");
            return RefreshOutcome::Discarded;
        }
        state.snapshot = Some(Arc::new(snapshot));
        state.installed = ticket.0;
        state.last_error = None;
        RefreshOutcome::Installed
    }

    /// Record a failed refresh. The displayed snapshot is kept; it is marked
    /// stale unless a later refresh has already been installed.
    pub fn fail(&self, ticket: RefreshTicket, error: &RollcallError) -> RefreshOutcome {
        let mut state = self.state.write();
        if ticket.0 > state.installed {
            state.last_error = Some(error.user_message().to_string());
        }
        RefreshOutcome::Failed
    }

    pub fn current(&self) -> Option<Arc<EventSnapshot>> {
        self.state.read().snapshot.clone()
    }

    pub fn status(&self) -> SnapshotStatus {
        let state = self.state.read();
        SnapshotStatus {
            installed_ticket: state.installed,
            fetched_at: state.snapshot.as_ref().map(|s| s.fetched_at),
            stale: state.last_error.is_some(),
            last_error: state.last_error.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Refresher
// ═══════════════════════════════════════════════════════════════════════════════

/// Re-fetches one event into a [`SnapshotHolder`].
pub struct SnapshotRefresher<S: ?Sized> {
    store: Arc<S>,
    holder: Arc<SnapshotHolder>,
    event_id: EventId,
    heal_on_refresh: bool,
}

impl<S> SnapshotRefresher<S>
where
    S: AttendanceStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, holder: Arc<SnapshotHolder>, event_id: EventId) -> Self {
        Self {
            store,
            holder,
            event_id,
            heal_on_refresh: false,
        }
    }

    /// Repair roster divergence before each fetch.
    pub fn with_healing(mut self, heal_on_refresh: bool) -> Self {
        self.heal_on_refresh = heal_on_refresh;
        self
    }

    pub fn holder(&self) -> &Arc<SnapshotHolder> {
        &self.holder
    }

    async fn load(&self) -> Result<EventSnapshot> {
        if self.heal_on_refresh {
            Reconciler::new(Arc::clone(&self.store))
                .reconcile(self.event_id)
                .await?;
        }
        load_snapshot(self.store.as_ref(), self.event_id).await
    }

    #[instrument(skip(self), fields(event_id = %self.event_id))]
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let ticket = self.holder.begin();

        match self.load().await {
            Ok(snapshot) => {
                let outcome = self.holder.complete(ticket, snapshot);
                counter!(REFRESHES_TOTAL, "outcome" => outcome.as_str()).increment(1);
                Ok(outcome)
            }
            Err(e) => {
                let outcome = self.holder.fail(ticket, &e);
                counter!(REFRESHES_TOTAL, "outcome" => outcome.as_str()).increment(1);
                e.log();
                Err(e)
            }
        }
    }

    /// Refresh every `period` until the handle is aborted.
    pub fn spawn_interval(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!(event_id = %self.event_id, period = ?period, "Starting snapshot refresh loop");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Snapshot refresh failed; keeping previous snapshot");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn snapshot(name: &str) -> EventSnapshot {
        let now = Utc::now();
        let event = Event::new(name, now, now + ChronoDuration::days(1)).activated();
        EventSnapshot::build(event, Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn test_later_ticket_wins_regardless_of_completion_order() {
        let holder = SnapshotHolder::new();
        let first = holder.begin();
        let second = holder.begin();

        assert_eq!(holder.complete(second, snapshot("second")), RefreshOutcome::Installed);
        assert_eq!(holder.complete(first, snapshot("first")), RefreshOutcome::Discarded);

        let shown = holder.current().unwrap();
        assert_eq!(shown.event.name, "second");
        assert_eq!(holder.status().installed_ticket, second.value());
    }

    #[test]
    fn test_failure_keeps_snapshot_and_marks_stale() {
        let holder = SnapshotHolder::new();
        let ok = holder.begin();
        holder.complete(ok, snapshot("camp"));

        let failing = holder.begin();
        let error = RollcallError::transient_io("connection refused");
        assert_eq!(holder.fail(failing, &error), RefreshOutcome::Failed);

        assert_eq!(holder.current().unwrap().event.name, "camp");
        let status = holder.status();
        assert!(status.stale);
        assert!(status.last_error.is_some());

        let recovered = holder.begin();
        holder.complete(recovered, snapshot("camp"));
        assert!(!holder.status().stale);
    }

    #[test]
    fn test_stale_failure_after_newer_install_is_ignored() {
        let holder = SnapshotHolder::new();
        let older = holder.begin();
        let newer = holder.begin();
        holder.complete(newer, snapshot("camp"));

        holder.fail(older, &RollcallError::transient_io("timeout"));
        assert!(!holder.status().stale);
    }
}
