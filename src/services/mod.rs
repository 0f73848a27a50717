//! Business logic services

pub mod directory;
pub mod documents;
pub mod import_processor;
pub mod job_ledger;
pub mod memory_store;
pub mod normalizer;
pub mod payload;
pub mod persister;
pub mod phone;
pub mod row_filter;
pub mod spreadsheet;
pub mod store;
