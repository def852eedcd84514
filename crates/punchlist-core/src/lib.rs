//! punchlist-core - Core library for Punchlist
//!
//! This crate contains the shared models, error type, and local storage
//! layer used by the sync subsystem and the application shells.

pub mod error;
pub mod models;
pub mod store;

pub use error::{Error, Result};
pub use models::{Issue, IssueId, IssueStatus, Location, Report, ReportId};
pub use store::{FileStore, LocalStore, MemoryStore};
