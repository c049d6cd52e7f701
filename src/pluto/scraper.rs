//! Readiness detection from the server's log output.
//!
//! Pluto has no structured channel for telling us it is up; the only signal
//! is a human-readable line such as `Go to http://localhost:1234/?secret=xyz`.
//! Every line of stdout and stderr goes through [`LogScraper::observe`].

use tracing::{debug, warn};

use crate::session::{ServerPhase, SessionInfo};

/// Marker that identifies the line announcing the server URL.
pub const READY_MARKER: &str = "?secret=";

/// Printed by the package manager when it cannot reach the registry.
pub const NETWORK_FAILURE_MARKER: &str =
    "failed to send request: The server name or address could not be resolved";

/// What a single line of output means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Status(ServerPhase),
    Ready(String),
    NetworkFailure,
}

/// Classify one line of output. Matching is substring based and checks the
/// readiness marker first.
pub fn classify(line: &str) -> Option<LogEvent> {
    if line.contains(READY_MARKER) {
        if let Some(url) = line.split_whitespace().find(|t| t.starts_with("http")) {
            return Some(LogEvent::Ready(url.to_string()));
        }
    }
    if line.contains(NETWORK_FAILURE_MARKER) {
        return Some(LogEvent::NetworkFailure);
    }
    if line.contains("Updating") {
        return Some(LogEvent::Status(ServerPhase::Updating));
    }
    if line.contains("Loading") || line.contains("loading") {
        return Some(LogEvent::Status(ServerPhase::Loading));
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperState {
    AwaitingReady,
    Ready,
    /// The install step failed; the launch cannot succeed any more.
    Failed,
}

/// Signals the supervisor acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScraperSignal {
    Status(ServerPhase),
    SessionReady(SessionInfo),
    FatalNetworkError,
}

#[derive(Debug)]
pub struct LogScraper {
    state: ScraperState,
}

impl LogScraper {
    pub fn new() -> Self {
        Self {
            state: ScraperState::AwaitingReady,
        }
    }

    pub fn state(&self) -> ScraperState {
        self.state
    }

    pub fn observe(&mut self, line: &str) -> Option<ScraperSignal> {
        match (self.state, classify(line)?) {
            (_, LogEvent::Status(phase)) => Some(ScraperSignal::Status(phase)),
            (ScraperState::AwaitingReady, LogEvent::Ready(url)) => {
                match SessionInfo::from_entry_url(&url) {
                    Ok(info) => {
                        self.state = ScraperState::Ready;
                        Some(ScraperSignal::SessionReady(info))
                    }
                    Err(e) => {
                        warn!(error = %e, "Readiness marker without a usable URL");
                        None
                    }
                }
            }
            (ScraperState::AwaitingReady, LogEvent::NetworkFailure) => {
                self.state = ScraperState::Failed;
                Some(ScraperSignal::FatalNetworkError)
            }
            (ScraperState::Ready, event) => {
                debug!(?event, "Ignoring readiness output after session was established");
                None
            }
            (ScraperState::Failed, event) => {
                debug!(?event, "Ignoring output after a fatal install error");
                None
            }
        }
    }

    /// Feed a chunk that may hold several lines.
    pub fn observe_chunk(&mut self, chunk: &str) -> Vec<ScraperSignal> {
        chunk.lines().filter_map(|line| self.observe(line)).collect()
    }
}

impl Default for LogScraper {
    fn default() -> Self {
        Self::new()
    }
}
