//! Type definitions

pub mod branch;
pub mod client;
pub mod document;
pub mod import_job;
pub mod messages;
pub mod sheet;

pub use branch::*;
pub use client::*;
pub use document::*;
pub use import_job::*;
pub use messages::*;
pub use sheet::*;
