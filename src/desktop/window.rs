//! [`WindowHandle`] for Tauri webview windows.

use std::sync::atomic::{AtomicUsize, Ordering};
use tauri::{Emitter, Manager, WebviewWindow};
use url::Url;

use crate::session::StatusUpdate;
use crate::windows::{WindowError, WindowHandle};

/// Channel the UI listens on for server status.
pub const STATUS_EVENT: &str = "pluto-url";

fn failed(e: tauri::Error) -> WindowError {
    WindowError::Failed(e.to_string())
}

/// JSON string literal, safe to splice into a script.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub struct TauriWindow {
    window: WebviewWindow,
    css_counter: AtomicUsize,
}

impl TauriWindow {
    pub fn new(window: WebviewWindow) -> Self {
        Self {
            window,
            css_counter: AtomicUsize::new(0),
        }
    }
}

impl WindowHandle for TauriWindow {
    fn contents_id(&self) -> String {
        self.window.label().to_string()
    }

    fn current_url(&self) -> Option<Url> {
        self.window.url().ok()
    }

    fn navigate(&self, url: &Url) -> Result<(), WindowError> {
        if !self.is_alive() {
            return Err(WindowError::Closed);
        }
        let mut target = self.window.clone();
        WebviewWindow::navigate(&mut target, url.clone()).map_err(failed)
    }

    fn send_status(&self, status: &StatusUpdate) -> Result<(), WindowError> {
        self.window.emit(STATUS_EVENT, status.clone()).map_err(failed)
    }

    fn insert_css(&self, css: &str) -> Result<String, WindowError> {
        let key = format!(
            "pluto-desktop-style-{}",
            self.css_counter.fetch_add(1, Ordering::SeqCst)
        );
        let script = format!(
            "(() => {{ const s = document.createElement('style'); s.id = {}; s.textContent = {}; document.head.appendChild(s); }})()",
            js_string(&key),
            js_string(css)
        );
        self.window.eval(&script).map_err(failed)?;
        Ok(key)
    }

    fn remove_css(&self, key: &str) -> Result<(), WindowError> {
        let script = format!("document.getElementById({})?.remove()", js_string(key));
        self.window.eval(&script).map_err(failed)
    }

    fn print(&self) -> Result<(), WindowError> {
        self.window.print().map_err(failed)
    }

    fn download(&self, url: &Url) -> Result<(), WindowError> {
        let script = format!(
            "(() => {{ const a = document.createElement('a'); a.href = {}; a.download = ''; document.body.appendChild(a); a.click(); a.remove(); }})()",
            js_string(url.as_str())
        );
        self.window.eval(&script).map_err(failed)
    }

    fn focus(&self) -> Result<(), WindowError> {
        self.window.unminimize().map_err(failed)?;
        self.window.set_focus().map_err(failed)
    }

    fn is_focused(&self) -> bool {
        self.window.is_focused().unwrap_or(false)
    }

    fn is_alive(&self) -> bool {
        self.window
            .app_handle()
            .get_webview_window(self.window.label())
            .is_some()
    }
}
