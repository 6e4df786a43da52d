//! End-to-end session tests, each run against the document store and SQLite

#[path = "../common/mod.rs"]
mod common;

mod change_tracking;
mod constraints;
mod datetime_fidelity;
mod isolation;
mod own_fields;
mod schema;
