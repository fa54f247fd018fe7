//! Shared types used across stowage crates.
//!
//! This crate carries the pieces both the storage client and the task
//! manager need: a generic progress-callback trait and the normalized
//! progress report exchanged between workers and status queries.

mod progress;
mod report;

pub use progress::{NoOpProgress, ProgressCallback};
pub use report::ProgressReport;
