//! Shared library surface for PolePlan server handlers and tests.

pub mod api;
pub mod config;
pub mod state;
