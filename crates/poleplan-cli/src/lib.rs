//! PolePlan CLI - offline tools over the PolePlan core.
//!
//! The `poleplan` binary wraps these modules:
//! - job: reading job files (record JSON or GeoJSON)
//! - commands: export, permit summary and target lookups

pub mod commands;
pub mod job;

pub use job::{load_job, JobFile};
