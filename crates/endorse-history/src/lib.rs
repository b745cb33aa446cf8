//! Endorsement period tracking on top of a [`endorse_db::HistoryRepository`].
//!
//! [`HistoryService`] is the entry point. Every mutation follows the same
//! shape: take the per-key lock, load the document, apply a pure change from
//! `endorse-core`, and save it under the version check. Transient storage
//! errors are retried; version conflicts surface as
//! [`HistoryError::Concurrency`].

pub mod admin;
pub mod error;
mod ledger;
pub mod locks;
pub mod position;
pub mod retry;
pub mod service;
pub mod tracker;

pub use admin::{parse_admin_date, AdminCorrectionService, BackdatedPeriod, TotalsOverride};
pub use error::HistoryError;
pub use locks::KeyedLocks;
pub use position::PositionTracker;
pub use retry::RetryPolicy;
pub use service::{HistoryService, ReorderEntry};
pub use tracker::PeriodTracker;
