//! Fakes for the window, dialog and server seams used across unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use crate::dialogs::{Dialogs, FileFilter};
use crate::pluto::client::{OpenTarget, PlutoApi, PlutoApiError};
use crate::session::{SessionInfo, StatusUpdate};
use crate::windows::{WindowError, WindowHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssCall {
    Insert(String),
    Remove(String),
}

#[derive(Default)]
pub struct FakeWindow {
    label: String,
    url: Mutex<Option<Url>>,
    focused: Mutex<bool>,
    closed: Mutex<bool>,
    pub navigations: Mutex<Vec<Url>>,
    pub downloads: Mutex<Vec<Url>>,
    pub statuses: Mutex<Vec<StatusUpdate>>,
    pub css: Mutex<Vec<CssCall>>,
    pub prints: AtomicUsize,
    pub focus_requests: AtomicUsize,
    css_counter: AtomicUsize,
}

impl FakeWindow {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            ..Default::default()
        })
    }

    pub fn set_url(&self, url: &str) {
        *self.url.lock() = Some(Url::parse(url).unwrap());
    }

    pub fn set_focused(&self, focused: bool) {
        *self.focused.lock() = focused;
    }

    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    pub fn statuses(&self) -> Vec<StatusUpdate> {
        self.statuses.lock().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().iter().map(|u| u.to_string()).collect()
    }

    pub fn css_calls(&self) -> Vec<CssCall> {
        self.css.lock().clone()
    }
}

impl WindowHandle for FakeWindow {
    fn contents_id(&self) -> String {
        self.label.clone()
    }

    fn current_url(&self) -> Option<Url> {
        self.url.lock().clone()
    }

    fn navigate(&self, url: &Url) -> Result<(), WindowError> {
        if *self.closed.lock() {
            return Err(WindowError::Closed);
        }
        self.navigations.lock().push(url.clone());
        *self.url.lock() = Some(url.clone());
        Ok(())
    }

    fn send_status(&self, status: &StatusUpdate) -> Result<(), WindowError> {
        self.statuses.lock().push(status.clone());
        Ok(())
    }

    fn insert_css(&self, css: &str) -> Result<String, WindowError> {
        let key = format!("css-{}", self.css_counter.fetch_add(1, Ordering::SeqCst));
        self.css.lock().push(CssCall::Insert(css.to_string()));
        Ok(key)
    }

    fn remove_css(&self, key: &str) -> Result<(), WindowError> {
        self.css.lock().push(CssCall::Remove(key.to_string()));
        Ok(())
    }

    fn print(&self) -> Result<(), WindowError> {
        self.prints.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self, url: &Url) -> Result<(), WindowError> {
        self.downloads.lock().push(url.clone());
        Ok(())
    }

    fn focus(&self) -> Result<(), WindowError> {
        self.focus_requests.fetch_add(1, Ordering::SeqCst);
        *self.focused.lock() = true;
        Ok(())
    }

    fn is_focused(&self) -> bool {
        *self.focused.lock()
    }

    fn is_alive(&self) -> bool {
        !*self.closed.lock()
    }
}

/// Dialogs that answer from a script and record error boxes.
#[derive(Default)]
pub struct FakeDialogs {
    pub picks: Mutex<VecDeque<Option<PathBuf>>>,
    pub saves: Mutex<VecDeque<Option<PathBuf>>>,
    pub errors: Mutex<Vec<(String, String)>>,
    pub fatals: Mutex<Vec<(String, String)>>,
}

impl FakeDialogs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer_pick(&self, answer: Option<&str>) {
        self.picks.lock().push_back(answer.map(PathBuf::from));
    }

    pub fn answer_save(&self, answer: Option<&str>) {
        self.saves.lock().push_back(answer.map(PathBuf::from));
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl Dialogs for FakeDialogs {
    async fn pick_file(&self, _title: &str, _filter: &FileFilter) -> Option<PathBuf> {
        self.picks.lock().pop_front().flatten()
    }

    async fn save_file(&self, _title: &str, _filter: &FileFilter) -> Option<PathBuf> {
        self.saves.lock().pop_front().flatten()
    }

    fn show_error(&self, title: &str, message: &str) {
        self.errors.lock().push((title.to_string(), message.to_string()));
    }

    fn show_fatal(&self, title: &str, message: &str) {
        self.fatals.lock().push((title.to_string(), message.to_string()));
    }
}

/// Records every call; answers are configured per route.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<String>>,
    pub new_id: Mutex<Option<String>>,
    pub open_result: Mutex<Option<Result<String, (u16, String)>>>,
    pub list: Mutex<HashMap<String, String>>,
    pub shutdown_status: Mutex<Option<u16>>,
    pub move_status: Mutex<Option<u16>>,
    pub panic_on_open: Mutex<bool>,
    pub list_fails: Mutex<bool>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PlutoApi for FakeApi {
    async fn new_notebook(&self, _session: &SessionInfo) -> Result<String, PlutoApiError> {
        self.record("new".to_string());
        self.new_id
            .lock()
            .clone()
            .ok_or(PlutoApiError::Rejected {
                status: 500,
                body: "no id".to_string(),
            })
    }

    async fn open_notebook(
        &self,
        _session: &SessionInfo,
        target: &OpenTarget,
    ) -> Result<String, PlutoApiError> {
        self.record(format!("open {:?}", target));
        if *self.panic_on_open.lock() {
            panic!("server blew up");
        }
        match self.open_result.lock().clone() {
            Some(Ok(id)) => Ok(id),
            Some(Err((status, body))) => Err(PlutoApiError::Rejected { status, body }),
            None => Err(PlutoApiError::Http("connection refused".to_string())),
        }
    }

    async fn shutdown_notebook(&self, _session: &SessionInfo, id: &str) -> Result<(), PlutoApiError> {
        self.record(format!("shutdown {}", id));
        match *self.shutdown_status.lock() {
            Some(200) | None => Ok(()),
            Some(status) => Err(PlutoApiError::Rejected {
                status,
                body: String::new(),
            }),
        }
    }

    async fn move_notebook(
        &self,
        _session: &SessionInfo,
        id: &str,
        new_path: &str,
    ) -> Result<String, PlutoApiError> {
        self.record(format!("move {} {}", id, new_path));
        match *self.move_status.lock() {
            Some(200) | None => Ok(new_path.to_string()),
            Some(status) => Err(PlutoApiError::Rejected {
                status,
                body: "invalid name".to_string(),
            }),
        }
    }

    async fn notebook_list(
        &self,
        _session: &SessionInfo,
    ) -> Result<HashMap<String, String>, PlutoApiError> {
        self.record("notebooklist".to_string());
        if *self.list_fails.lock() {
            return Err(PlutoApiError::Decode("truncated snapshot".to_string()));
        }
        Ok(self.list.lock().clone())
    }
}

/// In-memory sink for log output of the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's tracing output here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
