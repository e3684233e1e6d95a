#![allow(clippy::result_large_err)]
//! # Rollcall Core
//!
//! Attendance reconciliation and aggregation for multi-activity events.
//!
//! ## Architecture
//!
//! - **Model**: events, activities, participants and the append-only ledger
//! - **Store**: the `AttendanceStore` trait with in-memory and PostgreSQL backends;
//!   `commit_transition` appends a ledger entry and moves the participant as one unit
//! - **Engine**: the transition processor, reconciler, activity administration
//!   and the pure live/engagement/report aggregators
//! - **Snapshot**: immutable per-event snapshots with ordered refresh
//! - **Telemetry**: structured logging and metric names
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rollcall_core::prelude::*;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let processor = TransitionProcessor::new(store.clone());
//! processor
//!     .record_transition(event_id, participant_id, Location::Activity(archery), None)
//!     .await?;
//!
//! let snapshot = load_snapshot(store.as_ref(), event_id).await?;
//! let view = snapshot.report(&SearchFilter::new("grace"));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, RollcallError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, StoreBackend};
    pub use crate::engine::{
        compose_report, compute_demographics, compute_engagement, compute_live_occupancy,
        find_divergences, ActivityAdmin, CascadeReport, Demographics, Engagement, LiveOccupancy,
        ReconcileReport, Reconciler, ReportView, SearchFilter, TransitionProcessor,
    };
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, RollcallError};
    pub use crate::model::{
        select_current_event, Activity, ActivityDraft, ActivityId, AttendanceLogEntry, Event,
        EventId, Location, Participant, ParticipantCategory, ParticipantId, TransitionKind,
        TransitionStamp,
    };
    pub use crate::snapshot::{
        current_event, load_snapshot, EventSnapshot, RefreshOutcome, SnapshotHolder,
        SnapshotRefresher, SnapshotStatus,
    };
    pub use crate::store::{AttendanceStore, InMemoryStore, PgStore, SeedData, StoreSnapshot};
}
