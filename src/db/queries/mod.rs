//! Database queries

pub mod branch;
pub mod client;
pub mod import_job;
