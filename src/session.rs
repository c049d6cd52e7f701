//! Session state shared by every component.
//!
//! A session is the live association between the launcher and one running
//! Pluto server: its base URL plus the secret required on every call. The
//! [`SessionContext`] is created once at startup and handed to each component
//! by `Arc`; the [`SessionInfo`] inside it is written exactly once, when the
//! server announces its URL.

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Server URL has no secret")]
    MissingSecret,
    #[error("Server URL has no host")]
    MissingHost,
}

impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

static SECRET_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"secret=[^&\s]+").expect("valid secret regex"));

/// Replace every `secret=<value>` occurrence so the text is safe to log.
pub fn redact_secret(text: &str) -> String {
    SECRET_PARAM.replace_all(text, "secret=***").into_owned()
}

/// Fresh secret handed to the server at launch.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Connection details of the running Pluto server.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionInfo {
    base_url: Url,
    entry_url: Url,
    secret: String,
    port: u16,
}

impl SessionInfo {
    /// Build from the entry URL the server prints, e.g.
    /// `http://localhost:1234/?secret=abc`.
    pub fn from_entry_url(entry: &str) -> Result<Self, SessionError> {
        let entry_url = Url::parse(entry)?;
        if entry_url.host_str().is_none() {
            return Err(SessionError::MissingHost);
        }

        let secret = entry_url
            .query_pairs()
            .find(|(k, _)| k == "secret")
            .map(|(_, v)| v.into_owned())
            .filter(|s| !s.is_empty())
            .ok_or(SessionError::MissingSecret)?;

        let base_url = Url::parse(&format!("{}/", entry_url.origin().ascii_serialization()))?;
        let port = entry_url.port_or_known_default().unwrap_or(80);

        Ok(Self {
            base_url,
            entry_url,
            secret,
            port,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn entry_url(&self) -> &Url {
        &self.entry_url
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `{base}/{route}?secret=…&<params>`
    pub fn route_url(&self, route: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(route);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("secret", &self.secret);
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }
        url
    }

    /// The server's landing page.
    pub fn landing_url(&self) -> Url {
        self.route_url("", &[])
    }

    /// The server's editor page for notebook `id`.
    pub fn editor_url(&self, id: &str) -> Url {
        self.route_url("edit", &[("id", id)])
    }

    /// Payload pushed to the windows when the server becomes ready.
    pub fn to_payload(&self) -> SessionPayload {
        SessionPayload {
            url: self.entry_url.to_string(),
            port: self.port.to_string(),
            secret: self.secret.clone(),
        }
    }
}

impl fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInfo")
            .field("base_url", &self.base_url.as_str())
            .field("port", &self.port)
            .field("secret", &"***")
            .finish()
    }
}

/// Session details as the embedded UI expects them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub url: String,
    pub port: String,
    pub secret: String,
}

impl fmt::Debug for SessionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPayload")
            .field("url", &redact_secret(&self.url))
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Progress phases of the server boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPhase {
    Loading,
    Updating,
    Loaded,
}

/// Message on the `pluto-url` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusUpdate {
    Phase(ServerPhase),
    Session(SessionPayload),
    Text(String),
}

/// Process-wide session record, constructed once and shared by `Arc`.
pub struct SessionContext {
    launch_secret: String,
    session: RwLock<Option<SessionInfo>>,
    exited: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_secret(generate_secret())
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            launch_secret: secret.into(),
            session: RwLock::new(None),
            exited: AtomicBool::new(false),
        }
    }

    /// Secret passed to the server on its command line.
    pub fn launch_secret(&self) -> &str {
        &self.launch_secret
    }

    /// Store the session. Only the first call wins; returns whether this
    /// call established it.
    pub fn establish(&self, info: SessionInfo) -> bool {
        let mut slot = self.session.write();
        if slot.is_some() {
            return false;
        }
        if info.secret() != self.launch_secret {
            warn!("Server reported a different secret than the one it was launched with");
        }
        info!(base_url = %info.base_url(), "Session established");
        *slot = Some(info);
        true
    }

    /// The live session, if the server is up. A server that has exited
    /// leaves no usable session behind.
    pub fn session(&self) -> Option<SessionInfo> {
        if self.has_exited() {
            return None;
        }
        self.session.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.session().is_some()
    }

    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Drop the session at application exit.
    pub fn teardown(&self) {
        self.session.write().take();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
