//! Attendance engine.
//!
//! - [`transition`]: validated writes of check-ins and checkouts
//! - [`reconcile`]: roster/ledger divergence detection and repair
//! - [`admin`]: activity lifecycle including the delete cascade
//! - [`live`], [`engagement`], [`report`]: pure aggregation over a snapshot

pub mod admin;
pub mod engagement;
pub mod live;
pub mod reconcile;
pub mod report;
pub mod transition;

pub use admin::{ActivityAdmin, CascadeReport};
pub use engagement::{compute_demographics, compute_engagement, Demographics, Engagement};
pub use live::{compute_live_occupancy, LiveOccupancy};
pub use reconcile::{
    expected_locations, find_divergences, Divergence, DivergenceReason, ReconcileReport, Reconciler,
};
pub use report::{
    compose_report, engagement_ranking, group_ranking, location_rows, EngagementRow, GroupRow,
    LocationRow, MemberList, ReportSummary, ReportView, SearchFilter,
};
pub use transition::TransitionProcessor;
