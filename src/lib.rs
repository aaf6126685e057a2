//! SCALES — Channel loyalty currency and betting backend
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod betting;
pub mod config;
pub mod hub;
pub mod jobs;
pub mod ledger;
pub mod odds;
pub mod store;
pub mod types;
