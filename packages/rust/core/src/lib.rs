//! Reconciliation of a lecture script's outline against the lecture's
//! chapter/section hierarchy.
//!
//! Pipeline: bookmarks → [`classifier`] → [`matcher`] → [`report`] gate →
//! [`destinations`] + [`importer`] (only when the report is clear).

pub mod classifier;
pub mod destinations;
pub mod importer;
pub mod manuscript;
pub mod matcher;
pub mod reconciler;
pub mod report;

pub use destinations::DestinationSync;
pub use importer::ImportSummary;
pub use manuscript::{
    ImportOutcome, Manuscript, compute_contradictions, import_if_eligible, reconcile_destinations,
};
pub use matcher::Contradiction;
pub use reconciler::Reconciler;
pub use report::ContradictionReport;
