//! Window Registry
//!
//! Every open application window is registered here under a locally
//! generated UUID. Web requests only tell us which webview issued them, so
//! the registry also answers "which window owns this contents id".

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::session::StatusUpdate;

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Window is closed")]
    Closed,
    #[error("Window operation failed: {0}")]
    Failed(String),
}

impl Serialize for WindowError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// The native window behind a [`PlutoWindow`].
pub trait WindowHandle: Send + Sync {
    /// Identifier of the web contents, as tagged on outgoing requests.
    fn contents_id(&self) -> String;
    fn current_url(&self) -> Option<Url>;
    fn navigate(&self, url: &Url) -> Result<(), WindowError>;
    /// Push a message on the `pluto-url` channel.
    fn send_status(&self, status: &StatusUpdate) -> Result<(), WindowError>;
    /// Inject a stylesheet, returning a key for [`WindowHandle::remove_css`].
    fn insert_css(&self, css: &str) -> Result<String, WindowError>;
    fn remove_css(&self, key: &str) -> Result<(), WindowError>;
    fn print(&self) -> Result<(), WindowError>;
    fn download(&self, url: &Url) -> Result<(), WindowError>;
    /// Raise the window, restoring it when minimised.
    fn focus(&self) -> Result<(), WindowError>;
    fn is_focused(&self) -> bool;
    fn is_alive(&self) -> bool;
}

/// A registered window.
pub struct PlutoWindow {
    id: Uuid,
    handle: Arc<dyn WindowHandle>,
    open_lock: tokio::sync::Mutex<()>,
}

impl PlutoWindow {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> &dyn WindowHandle {
        self.handle.as_ref()
    }

    /// Serialises notebook opens issued from this window.
    pub(crate) fn open_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.open_lock
    }

    /// Notebook id of the page currently shown, if any.
    pub fn notebook_id(&self) -> Option<String> {
        self.handle
            .current_url()?
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
    }
}

impl std::fmt::Debug for PlutoWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlutoWindow")
            .field("id", &self.id)
            .field("contents_id", &self.handle.contents_id())
            .finish()
    }
}

struct WindowEntry {
    id: Uuid,
    window: Arc<PlutoWindow>,
}

#[derive(Default)]
pub struct WindowRegistry {
    entries: Mutex<Vec<WindowEntry>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window and hand back its registry record.
    pub fn register(&self, handle: Arc<dyn WindowHandle>) -> Arc<PlutoWindow> {
        let id = Uuid::new_v4();
        let window = Arc::new(PlutoWindow {
            id,
            handle,
            open_lock: tokio::sync::Mutex::new(()),
        });
        self.entries.lock().push(WindowEntry {
            id,
            window: window.clone(),
        });
        info!(id = %id, "Window registered");
        window
    }

    pub fn unregister(&self, id: Uuid) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() < before {
            info!(id = %id, "Window unregistered");
        } else {
            debug!(id = %id, "Unregister for unknown window");
        }
    }

    pub fn by_id(&self, id: Uuid) -> Option<Arc<PlutoWindow>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.window.clone())
    }

    pub fn by_contents_id(&self, contents_id: &str) -> Option<Arc<PlutoWindow>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.window.handle.contents_id() == contents_id)
            .map(|e| e.window.clone())
    }

    pub fn focused(&self) -> Option<Arc<PlutoWindow>> {
        self.windows().into_iter().find(|w| w.handle.is_focused())
    }

    /// Snapshot of the registered windows.
    pub fn windows(&self) -> Vec<Arc<PlutoWindow>> {
        self.entries.lock().iter().map(|e| e.window.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run `f` for every window. The registry lock is not held while `f` runs.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&PlutoWindow),
    {
        for window in self.windows() {
            f(&window);
        }
    }

    /// Push a status hint to every window; failures are only logged.
    pub fn broadcast(&self, status: &StatusUpdate) {
        self.for_each(|w| {
            if let Err(e) = w.handle.send_status(status) {
                warn!(id = %w.id, error = %e, "Status update not delivered");
            }
        });
    }
}
