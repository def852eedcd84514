//! Data models for Punchlist

mod report;

pub use report::{now_ms, Issue, IssueId, IssueStatus, Location, Report, ReportId};
