//! IPC commands invoked by the embedded UI.

use std::sync::Arc;
use tauri::{AppHandle, Emitter, State, WebviewWindow};
use tracing::{debug, info, warn};
use url::Url;

use super::{create_window, open_in_browser, AppState};
use crate::interceptor::RequestDecision;
use crate::notebook::{ExportKind, NotebookError, OpenKind};
use crate::pluto::SidecarStatus;
use crate::windows::{PlutoWindow, WindowError};

/// Emitted to the window after a successful move, with the new path.
pub const MOVE_EVENT: &str = "pluto-move-notebook";

/// Registry record for the calling webview.
fn caller(state: &AppState, window: &WebviewWindow) -> Result<Arc<PlutoWindow>, NotebookError> {
    state
        .registry
        .by_contents_id(window.label())
        .ok_or(NotebookError::NoWindow)
}

// ============ TAURI COMMANDS ============

#[tauri::command]
pub async fn open_notebook(
    window: WebviewWindow,
    state: State<'_, AppState>,
    kind: OpenKind,
    locator: Option<String>,
) -> Result<Option<String>, NotebookError> {
    let target = caller(&state, &window)?;
    state.ops.open(&target, kind, locator).await
}

#[tauri::command]
pub async fn shutdown_notebook(
    window: WebviewWindow,
    state: State<'_, AppState>,
    id: Option<String>,
) -> Result<(), NotebookError> {
    let target = caller(&state, &window)?;
    state.ops.shutdown(&target, id).await
}

#[tauri::command]
pub async fn move_notebook(
    window: WebviewWindow,
    state: State<'_, AppState>,
    id: Option<String>,
) -> Result<Option<String>, NotebookError> {
    let target = caller(&state, &window)?;
    let moved = state
        .ops
        .move_notebook(&target, id)
        .await?
        .map(|p| p.to_string_lossy().into_owned());
    if let Some(path) = &moved {
        if let Err(e) = window.emit(MOVE_EVENT, path.clone()) {
            warn!(error = %e, "Move result not delivered");
        }
    }
    Ok(moved)
}

#[tauri::command]
pub async fn export_notebook(
    window: WebviewWindow,
    state: State<'_, AppState>,
    id: String,
    kind: ExportKind,
) -> Result<(), NotebookError> {
    let target = caller(&state, &window)?;
    state.ops.export(&target, &id, kind).await
}

#[tauri::command]
pub async fn notebook_location(
    state: State<'_, AppState>,
    id: String,
) -> Result<Option<String>, NotebookError> {
    state.ops.file_location(&id).await
}

#[tauri::command]
pub fn sidecar_status(state: State<'_, AppState>) -> SidecarStatus {
    state.sidecar.status()
}

#[tauri::command]
pub fn new_window(app: AppHandle, state: State<'_, AppState>) -> Result<(), NotebookError> {
    let window = create_window(&app, &state)
        .map_err(|e| NotebookError::Window(WindowError::Failed(e.to_string())))?;
    if let Some(pages) = state.interceptor.pages() {
        window.handle().navigate(&pages.landing)?;
    }
    Ok(())
}

#[tauri::command]
pub fn open_log_folder(app: AppHandle, state: State<'_, AppState>) -> Result<(), NotebookError> {
    use tauri_plugin_shell::ShellExt;

    let dir = state.paths.log_dir.to_string_lossy().into_owned();
    info!(path = %dir, "Opening log folder");
    #[allow(deprecated)]
    let opened = app.shell().open(dir, None);
    opened.map_err(|e| NotebookError::Window(WindowError::Failed(e.to_string())))
}

/// Asked by the request hook before a page fetches a `/frontend/...` route
/// or opens a new window.
#[tauri::command]
pub fn intercept_request(
    app: AppHandle,
    window: WebviewWindow,
    state: State<'_, AppState>,
    url: String,
) -> RequestDecision {
    let Ok(url) = Url::parse(&url) else {
        debug!("Unparseable request passed through");
        return RequestDecision::default();
    };
    let (decision, external, action) = state
        .interceptor
        .on_before_request(window.label(), &url)
        .into_decision();
    if let Some(action) = action {
        tauri::async_runtime::spawn(action.run());
    }
    if let Some(target) = external {
        open_in_browser(&app, &target);
    }
    decision
}
