//! Pluto HTTP Client
//!
//! Thin client for the routes the Pluto server exposes to the launcher.
//! Every call carries the session secret as a query parameter.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::notebooks::decode_snapshot;
use crate::session::SessionInfo;

#[derive(Error, Debug)]
pub enum PlutoApiError {
    #[error("Pluto HTTP error: {0}")]
    Http(String),
    #[error("Pluto rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Decode(String),
}

impl Serialize for PlutoApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for PlutoApiError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the secret.
        PlutoApiError::Http(e.without_url().to_string())
    }
}

/// What `/open` should load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    Path(String),
    Url(String),
}

impl OpenTarget {
    fn param(&self) -> (&'static str, &str) {
        match self {
            OpenTarget::Path(p) => ("path", p),
            OpenTarget::Url(u) => ("url", u),
        }
    }
}

/// Routes of the Pluto server used by the launcher.
#[async_trait]
pub trait PlutoApi: Send + Sync {
    /// `POST /new`, returns the new notebook id.
    async fn new_notebook(&self, session: &SessionInfo) -> Result<String, PlutoApiError>;

    /// `POST /open`, returns the notebook id.
    async fn open_notebook(
        &self,
        session: &SessionInfo,
        target: &OpenTarget,
    ) -> Result<String, PlutoApiError>;

    /// `GET /shutdown`
    async fn shutdown_notebook(&self, session: &SessionInfo, id: &str) -> Result<(), PlutoApiError>;

    /// `POST /move`, returns the response body.
    async fn move_notebook(
        &self,
        session: &SessionInfo,
        id: &str,
        new_path: &str,
    ) -> Result<String, PlutoApiError>;

    /// `GET /notebooklist`, decoded to `id → location`.
    async fn notebook_list(
        &self,
        session: &SessionInfo,
    ) -> Result<HashMap<String, String>, PlutoApiError>;
}

/// reqwest-backed implementation.
#[derive(Clone)]
pub struct PlutoClient {
    http: Client,
}

impl PlutoClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http }
    }

    /// Turn a non-200 response into `Rejected`, otherwise hand it back.
    async fn expect_ok(resp: Response, route: &str) -> Result<Response, PlutoApiError> {
        let status = resp.status();
        if status.as_u16() == 200 {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        error!(route = %route, status = %status, body = %body, "Pluto HTTP error");
        Err(PlutoApiError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl Default for PlutoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlutoApi for PlutoClient {
    async fn new_notebook(&self, session: &SessionInfo) -> Result<String, PlutoApiError> {
        let resp = self.http.post(session.route_url("new", &[])).send().await?;
        let resp = Self::expect_ok(resp, "new").await?;
        let id = resp.text().await?.trim().to_string();
        info!(id = %id, "Created notebook");
        Ok(id)
    }

    async fn open_notebook(
        &self,
        session: &SessionInfo,
        target: &OpenTarget,
    ) -> Result<String, PlutoApiError> {
        let resp = self
            .http
            .post(session.route_url("open", &[target.param()]))
            .send()
            .await?;
        let resp = Self::expect_ok(resp, "open").await?;
        let id = resp.text().await?.trim().to_string();
        info!(id = %id, "Opened notebook");
        Ok(id)
    }

    async fn shutdown_notebook(&self, session: &SessionInfo, id: &str) -> Result<(), PlutoApiError> {
        let resp = self
            .http
            .get(session.route_url("shutdown", &[("id", id)]))
            .send()
            .await?;
        Self::expect_ok(resp, "shutdown").await?;
        info!(id = %id, "Notebook shut down");
        Ok(())
    }

    async fn move_notebook(
        &self,
        session: &SessionInfo,
        id: &str,
        new_path: &str,
    ) -> Result<String, PlutoApiError> {
        let resp = self
            .http
            .post(session.route_url("move", &[("id", id), ("newpath", new_path)]))
            .send()
            .await?;
        let resp = Self::expect_ok(resp, "move").await?;
        Ok(resp.text().await?)
    }

    async fn notebook_list(
        &self,
        session: &SessionInfo,
    ) -> Result<HashMap<String, String>, PlutoApiError> {
        let resp = self
            .http
            .get(session.route_url("notebooklist", &[]))
            .send()
            .await?;
        let resp = Self::expect_ok(resp, "notebooklist").await?;
        let bytes = resp.bytes().await?;
        let list = decode_snapshot(&bytes).map_err(|e| PlutoApiError::Decode(e.to_string()))?;
        debug!(count = list.len(), "Fetched notebook list");
        Ok(list)
    }
}
