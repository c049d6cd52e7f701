//! Notebook operations
//!
//! Translates what the user asked for (open, create, export, shut down, move)
//! into calls against the running Pluto server and then points the right
//! window at the result. Every operation needs an established session and
//! reports its own failures: a log line carrying a machine-readable code and,
//! where it helps the user, an error dialog.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::dialogs::{Dialogs, FileFilter};
use crate::extensions::{is_ext_match, is_url_or_path, LocatorKind};
use crate::pluto::client::{OpenTarget, PlutoApi, PlutoApiError};
use crate::pluto::notebooks::NotebookDirectory;
use crate::session::{redact_secret, SessionContext, SessionInfo, StatusUpdate};
use crate::windows::{PlutoWindow, WindowError, WindowHandle, WindowRegistry};

/// Stylesheet applied while an open is in flight.
pub const POINTER_LOADING_CSS: &str = "* {cursor: progress !important;}";

#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Pluto is not initialized yet")]
    NotInitialized,
    #[error("Not a supported file type: {0}")]
    UnsupportedFileType(String),
    #[error("Empty URL passed")]
    EmptyLocator,
    #[error("Server rejected the request ({status}): {body}")]
    ServerRejected { status: u16, body: String },
    #[error("Cancelled by user")]
    Cancelled,
    #[error("No notebook id available")]
    MissingId,
    #[error("No window to act on")]
    NoWindow,
    #[error("Pluto HTTP error: {0}")]
    Http(String),
    #[error("Deserialization error: {0}")]
    Decode(String),
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl Serialize for NotebookError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<PlutoApiError> for NotebookError {
    fn from(e: PlutoApiError) -> Self {
        match e {
            PlutoApiError::Rejected { status, body } => NotebookError::ServerRejected { status, body },
            PlutoApiError::Http(msg) => NotebookError::Http(msg),
            PlutoApiError::Decode(msg) => NotebookError::Decode(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenKind {
    New,
    Path,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    File,
    Html,
    State,
    Pdf,
}

impl ExportKind {
    /// Server route serving this export; `None` for PDF, which is printed
    /// locally.
    pub fn route(&self) -> Option<&'static str> {
        match self {
            ExportKind::File => Some("notebookfile"),
            ExportKind::Html => Some("notebookexport"),
            ExportKind::State => Some("statefile"),
            ExportKind::Pdf => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Open,
    Export,
    Shutdown,
    Move,
    Lookup,
}

impl Operation {
    fn code(&self) -> &'static str {
        match self {
            Operation::Open => "PLUTO-CANNOT-OPEN-NOTEBOOK",
            Operation::Export => "PLUTO-EXPORT-ERROR",
            Operation::Shutdown => "PLUTO-FILE-SHUTDOWN-ERROR",
            Operation::Move => "PLUTO-FILE-MOVE-ERROR",
            Operation::Lookup => "PLUTO-CHECK-NOTEBOOK-ERROR",
        }
    }

    /// Shutdown and lookup failures are logged without interrupting the user.
    fn shows_dialog(&self) -> bool {
        matches!(self, Operation::Open | Operation::Export | Operation::Move)
    }
}

/// Progress cursor for the lifetime of the guard.
struct BusyCursor<'a> {
    window: &'a dyn WindowHandle,
    key: Option<String>,
}

impl<'a> BusyCursor<'a> {
    fn start(window: &'a dyn WindowHandle) -> Self {
        let key = match window.insert_css(POINTER_LOADING_CSS) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Could not apply busy cursor");
                None
            }
        };
        Self { window, key }
    }
}

impl Drop for BusyCursor<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Err(e) = self.window.remove_css(&key) {
                debug!(error = %e, "Could not remove busy cursor");
            }
        }
    }
}

/// Whether `locator` is an editor URL of a local Pluto server.
fn local_edit_id(locator: &str, session: &SessionInfo) -> Option<String> {
    let url = Url::parse(locator).ok()?;
    let is_local = url.origin() == session.base_url().origin()
        || matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
    if !is_local || !url.path().ends_with("edit") {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
}

pub struct NotebookOps {
    ctx: Arc<SessionContext>,
    registry: Arc<WindowRegistry>,
    api: Arc<dyn PlutoApi>,
    dialogs: Arc<dyn Dialogs>,
}

impl NotebookOps {
    pub fn new(
        ctx: Arc<SessionContext>,
        registry: Arc<WindowRegistry>,
        api: Arc<dyn PlutoApi>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Self {
        Self {
            ctx,
            registry,
            api,
            dialogs,
        }
    }

    pub fn registry(&self) -> &Arc<WindowRegistry> {
        &self.registry
    }

    /// The focused window, falling back to the most recently registered one.
    pub fn target_window(&self) -> Result<Arc<PlutoWindow>, NotebookError> {
        self.registry
            .focused()
            .or_else(|| self.registry.windows().pop())
            .ok_or(NotebookError::NoWindow)
    }

    fn require_session(&self) -> Result<SessionInfo, NotebookError> {
        self.ctx.session().ok_or(NotebookError::NotInitialized)
    }

    /// Log and surface an error. `Cancelled` is swallowed.
    fn settle<T>(&self, op: Operation, result: Result<T, NotebookError>) -> Result<Option<T>, NotebookError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(NotebookError::Cancelled) => {
                debug!(operation = ?op, "Dialog dismissed");
                Ok(None)
            }
            Err(e) => {
                self.report(op, &e);
                Err(e)
            }
        }
    }

    /// Log `e` under the operation's code and show a dialog where one helps.
    fn report(&self, op: Operation, e: &NotebookError) {
        error!(code = op.code(), error = %e, "Notebook operation failed");
        match e {
            NotebookError::NotInitialized => self.dialogs.show_error(
                "Pluto not initialized",
                "Please wait for Pluto to initialize first.",
            ),
            _ if op.shows_dialog() => {
                let message = match (e, op) {
                    (NotebookError::ServerRejected { .. }, Operation::Open) => {
                        "Please check if you are using the correct secret.".to_string()
                    }
                    (NotebookError::ServerRejected { .. }, Operation::Move) => {
                        "Please check if you are using a valid file name.".to_string()
                    }
                    _ => e.to_string(),
                };
                self.dialogs.show_error(op.code(), &message);
            }
            _ => {}
        }
    }

    /// Open a notebook in `window` and return its id. `Ok(None)` when the
    /// user dismissed the file picker.
    pub async fn open(
        &self,
        window: &PlutoWindow,
        kind: OpenKind,
        locator: Option<String>,
    ) -> Result<Option<String>, NotebookError> {
        let result = self.try_open(window, kind, locator).await;
        self.settle(Operation::Open, result)
    }

    async fn try_open(
        &self,
        window: &PlutoWindow,
        kind: OpenKind,
        locator: Option<String>,
    ) -> Result<String, NotebookError> {
        let _serial = window.open_lock().lock().await;
        let session = self.require_session()?;
        let handle = window.handle();

        let locator = locator.filter(|l| !l.is_empty());
        if let (OpenKind::Path, Some(path)) = (kind, &locator) {
            if !is_ext_match(path) {
                return Err(NotebookError::UnsupportedFileType(path.clone()));
            }
        }

        let locator = match (kind, locator) {
            (OpenKind::New, _) => None,
            (_, Some(locator)) => Some(locator),
            (OpenKind::Path, None) => {
                let picked = self
                    .dialogs
                    .pick_file("Please select a Pluto Notebook.", &FileFilter::notebooks())
                    .await
                    .ok_or(NotebookError::Cancelled)?;
                Some(picked.to_string_lossy().into_owned())
            }
            (OpenKind::Url, None) => return Err(NotebookError::EmptyLocator),
        };

        let _busy = BusyCursor::start(handle);

        let target = match (kind, &locator) {
            (OpenKind::Path, Some(path)) => Some(OpenTarget::Path(path.clone())),
            (OpenKind::Url, Some(url)) => {
                let embedded_path = Url::parse(url).ok().and_then(|u| {
                    u.query_pairs()
                        .find(|(k, _)| k == "path")
                        .map(|(_, v)| v.into_owned())
                });
                Some(match embedded_path {
                    Some(path) => OpenTarget::Path(path),
                    None => OpenTarget::Url(url.clone()),
                })
            }
            _ => None,
        };

        if let Some(target) = &target {
            let shown = match target {
                OpenTarget::Path(p) | OpenTarget::Url(p) => p,
            };
            info!(locator = %redact_secret(shown), "Trying to open notebook");
            if let Err(e) = handle.send_status(&StatusUpdate::Text(format!("Trying to open {}", shown))) {
                debug!(error = %e, "Progress text not delivered");
            }
        }

        let existing = match &locator {
            Some(locator) => self.resolve_existing(&session, locator).await,
            None => None,
        };

        let id = match (existing, &target) {
            (Some(id), _) => {
                debug!(id = %id, "Notebook already running");
                id
            }
            (None, Some(target)) => self.api.open_notebook(&session, target).await?,
            (None, None) => self.api.new_notebook(&session).await?,
        };

        handle.navigate(&session.editor_url(&id))?;
        Ok(id)
    }

    /// Id of an already running notebook for `locator`: either read from a
    /// local editor URL or looked up in a fresh directory snapshot.
    async fn resolve_existing(&self, session: &SessionInfo, locator: &str) -> Option<String> {
        if let Some(id) = local_edit_id(locator, session) {
            return Some(id);
        }
        match self.directory(session).await {
            Ok(directory) => directory.id_for(locator).map(str::to_string),
            Err(e) => {
                self.report(Operation::Lookup, &e);
                None
            }
        }
    }

    /// The registered window already showing the notebook `locator` names.
    pub async fn window_showing(&self, locator: &str) -> Option<Arc<PlutoWindow>> {
        let session = self.ctx.session()?;
        let id = self.resolve_existing(&session, locator).await?;
        self.registry
            .windows()
            .into_iter()
            .find(|w| w.notebook_id().as_deref() == Some(id.as_str()))
    }

    /// Show `locator` on behalf of the OS (a file opened with the app, a
    /// second launch). A window already showing it is raised; otherwise the
    /// notebook opens in a window from `new_window`.
    pub async fn open_requested<F>(&self, locator: String, new_window: F) -> Result<Option<String>, NotebookError>
    where
        F: FnOnce() -> Result<Arc<PlutoWindow>, WindowError>,
    {
        let kind = match is_url_or_path(&locator) {
            LocatorKind::Url => OpenKind::Url,
            LocatorKind::Path => OpenKind::Path,
            LocatorKind::None => {
                let result = Err(NotebookError::UnsupportedFileType(locator));
                return self.settle(Operation::Open, result);
            }
        };
        if let Some(window) = self.window_showing(&locator).await {
            info!(window = %window.id(), "Notebook already shown, focusing its window");
            window.handle().focus()?;
            return Ok(window.notebook_id());
        }
        let window = match new_window() {
            Ok(window) => window,
            Err(e) => return self.settle(Operation::Open, Err(e.into())),
        };
        self.open(&window, kind, Some(locator)).await
    }

    async fn directory(&self, session: &SessionInfo) -> Result<NotebookDirectory, NotebookError> {
        let snapshot = self.api.notebook_list(session).await?;
        Ok(NotebookDirectory::from_snapshot(snapshot))
    }

    /// File location of notebook `id`, when it is backed by a notebook file.
    pub async fn file_location(&self, id: &str) -> Result<Option<String>, NotebookError> {
        let result = self.try_file_location(id).await;
        self.settle(Operation::Lookup, result).map(Option::flatten)
    }

    async fn try_file_location(&self, id: &str) -> Result<Option<String>, NotebookError> {
        let session = self.require_session()?;
        let directory = self.directory(&session).await?;
        Ok(directory
            .location_for(id)
            .filter(|loc| is_ext_match(loc))
            .map(str::to_string))
    }

    /// Export notebook `id`. PDF goes through the window's print dialog,
    /// everything else is downloaded from the server.
    pub async fn export(
        &self,
        window: &PlutoWindow,
        id: &str,
        kind: ExportKind,
    ) -> Result<(), NotebookError> {
        let result = self.try_export(window, id, kind);
        self.settle(Operation::Export, result).map(|_| ())
    }

    fn try_export(&self, window: &PlutoWindow, id: &str, kind: ExportKind) -> Result<(), NotebookError> {
        let session = self.require_session()?;
        let handle = window.handle();
        match kind.route() {
            None => handle.print()?,
            Some(route) => handle.download(&session.route_url(route, &[("id", id)]))?,
        }
        info!(id = %id, kind = ?kind, "Export started");
        Ok(())
    }

    /// Shut down notebook `id` (or the one shown in `window`) and send the
    /// window back to the landing page.
    pub async fn shutdown(&self, window: &PlutoWindow, id: Option<String>) -> Result<(), NotebookError> {
        let result = self.try_shutdown(window, id).await;
        self.settle(Operation::Shutdown, result).map(|_| ())
    }

    async fn try_shutdown(&self, window: &PlutoWindow, id: Option<String>) -> Result<(), NotebookError> {
        let session = self.require_session()?;
        let id = id
            .or_else(|| window.notebook_id())
            .ok_or(NotebookError::MissingId)?;
        self.api.shutdown_notebook(&session, &id).await?;
        info!(id = %id, "Notebook has been shut down");
        let handle = window.handle();
        if handle.is_alive() {
            handle.navigate(&session.landing_url())?;
        }
        Ok(())
    }

    /// Move notebook `id` (or the one shown in `window`) to a location chosen
    /// in a save dialog. Returns the new path, or `None` if cancelled.
    pub async fn move_notebook(
        &self,
        window: &PlutoWindow,
        id: Option<String>,
    ) -> Result<Option<PathBuf>, NotebookError> {
        let result = self.try_move(window, id).await;
        self.settle(Operation::Move, result)
    }

    async fn try_move(&self, window: &PlutoWindow, id: Option<String>) -> Result<PathBuf, NotebookError> {
        let session = self.require_session()?;
        let id = id
            .or_else(|| window.notebook_id())
            .ok_or(NotebookError::MissingId)?;
        let destination = self
            .dialogs
            .save_file("Select location to move your file", &FileFilter::notebooks())
            .await
            .ok_or(NotebookError::Cancelled)?;
        let new_path = destination.to_string_lossy().into_owned();
        self.api.move_notebook(&session, &id, &new_path).await?;
        info!(id = %id, path = %new_path, "Notebook moved");
        Ok(destination)
    }
}
