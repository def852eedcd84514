//! Remote report service client.
//!
//! Authenticated HTTP CRUD over report records, keyed by report id and
//! scoped to the authenticated user. Every call requires a credential from
//! the [`AuthProvider`]; without one the call fails locally as
//! [`SyncError::Unauthenticated`] and is never attempted on the wire.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use punchlist_core::{Report, ReportId};

use crate::error::{SyncError, SyncResult};

/// Opaque capability for retrieving the current auth credential.
///
/// Returns `None` when unauthenticated. Token acquisition and refresh live
/// in the application shell.
pub trait AuthProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Remote CRUD contract for report records.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fetch all reports for the authenticated user.
    async fn fetch_reports(&self) -> SyncResult<Vec<Report>>;

    /// Upsert a single report, keyed by `(user, id)`.
    async fn save_report(&self, report: &Report) -> SyncResult<()>;

    /// Delete the report with the given id. Idempotent: deleting an absent
    /// id is not an error.
    async fn delete_report(&self, id: ReportId) -> SyncResult<()>;
}

/// reqwest-backed implementation of [`RemoteService`].
#[derive(Clone)]
pub struct HttpReportService {
    base_url: String,
    client: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
}

impl HttpReportService {
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> SyncResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
            auth,
        })
    }

    fn token(&self) -> SyncResult<String> {
        self.auth.access_token().ok_or(SyncError::Unauthenticated)
    }

    fn reports_url(&self) -> String {
        format!("{}/reports", self.base_url)
    }
}

#[async_trait]
impl RemoteService for HttpReportService {
    async fn fetch_reports(&self) -> SyncResult<Vec<Report>> {
        let token = self.token()?;
        let response = self
            .client
            .get(self.reports_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(remote_error(status, &body));
        }

        Ok(response.json::<Vec<Report>>().await?)
    }

    async fn save_report(&self, report: &Report) -> SyncResult<()> {
        let token = self.token()?;
        let response = self
            .client
            .post(self.reports_url())
            .bearer_auth(token)
            .json(report)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(remote_error(status, &body));
        }

        Ok(())
    }

    async fn delete_report(&self, id: ReportId) -> SyncResult<()> {
        let token = self.token()?;
        let response = self
            .client
            .delete(format!("{}/{}", self.reports_url(), id))
            .bearer_auth(token)
            .send()
            .await?;

        // Already gone remotely counts as done
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(remote_error(status, &body));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn remote_error(status: StatusCode, body: &str) -> SyncError {
    let message = if let Ok(payload) = serde_json::from_str::<RemoteErrorBody>(body) {
        payload.message.or(payload.error)
    } else {
        None
    };

    let message = message.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            trimmed.to_string()
        }
    });

    SyncError::Remote {
        status: status.as_u16(),
        message: message.trim().to_string(),
    }
}

fn normalize_base_url(raw: String) -> SyncResult<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(SyncError::InvalidConfiguration(
            "base URL must not be empty".to_string(),
        ));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}
