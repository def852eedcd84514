//! Report model
//!
//! A `Report` is the unit of synchronization: the reconciler treats its
//! content as atomic and only ever chooses whole-report winners by
//! `last_modified`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a report, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(Uuid);

impl ReportId {
    /// Create a new unique report ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A unique identifier for an issue within a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(Uuid);

impl IssueId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IssueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a recorded defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    Open,
    Resolved,
}

/// A single defect recorded during an inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier
    pub id: IssueId,
    /// Defect description
    pub description: String,
    /// Current status
    pub status: IssueStatus,
    /// Opaque attachment references (photo capture lives in the app shell)
    pub photos: Vec<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Issue {
    /// Create a new open issue with the given description
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: IssueId::new(),
            description: description.into(),
            status: IssueStatus::Open,
            photos: Vec::new(),
            created_at: now_ms(),
        }
    }
}

/// A location within the inspected site, grouping its issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Location name, e.g. "Level 2 / Apartment 2.04"
    pub name: String,
    /// Issues recorded at this location
    pub issues: Vec<Issue>,
}

impl Location {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            issues: Vec::new(),
        }
    }
}

/// An inspection report - the unit of synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier, stable for the lifetime of the report
    pub id: ReportId,
    /// Project or site name
    pub project: String,
    /// Locations with their recorded issues
    pub locations: Vec<Location>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last content mutation timestamp (Unix ms). The sole ordering signal
    /// for conflict resolution.
    pub last_modified: i64,
}

impl Report {
    /// Create a new empty report for the given project
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: ReportId::new(),
            project: project.into(),
            locations: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }

    /// Bump `last_modified` to the current time. Call after every content
    /// mutation; this is what makes the local copy win reconciliation.
    pub fn touch(&mut self) {
        self.last_modified = now_ms();
    }

    /// Count of unresolved issues across all locations
    #[must_use]
    pub fn open_issue_count(&self) -> usize {
        self.locations
            .iter()
            .flat_map(|location| &location.issues)
            .filter(|issue| issue.status == IssueStatus::Open)
            .count()
    }
}

/// Current time as Unix milliseconds
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
