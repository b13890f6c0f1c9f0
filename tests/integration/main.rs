//! End-to-end scenarios: scheduler, task, reconciler and stores together.

mod mock_source;
mod scenarios;
mod sheet_file;
