//! Telemetry: structured logging and metric names.
//!
//! Logging is built on `tracing-subscriber`; metrics go through the `metrics`
//! facade, so they are no-ops until the embedding process installs a recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use rollcall_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};

/// Counter: accepted transitions, labelled by `kind` and `outcome`.
pub const TRANSITIONS_TOTAL: &str = "rollcall_transitions_total";

/// Counter: roster pointers repaired by the reconciler.
pub const DIVERGENCES_REPAIRED_TOTAL: &str = "rollcall_divergences_repaired_total";

/// Counter: snapshot refreshes, labelled by `outcome`.
pub const REFRESHES_TOTAL: &str = "rollcall_snapshot_refreshes_total";

/// Counter: activities removed through the cascade.
pub const ACTIVITY_CASCADES_TOTAL: &str = "rollcall_activity_cascades_total";
