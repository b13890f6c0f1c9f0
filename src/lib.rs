//! oddsheet — periodic odds fetcher that keeps bookie columns in a sheet.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod geometry;
pub mod registry;
pub mod reconciler;
pub mod fetch;
pub mod engine;
pub mod storage;
pub mod dashboard;
