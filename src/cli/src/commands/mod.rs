pub mod events;
pub mod reconcile;
pub mod report;
