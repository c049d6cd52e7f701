//! Native dialog seam.
//!
//! The desktop shell implements this with the Tauri dialog plugin; tests use
//! a scripted fake.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::extensions::dialog_extensions;

/// Extension filter shown in file pickers.
#[derive(Debug, Clone)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn notebooks() -> Self {
        Self {
            name: "Pluto Notebook".to_string(),
            extensions: dialog_extensions().into_iter().map(String::from).collect(),
        }
    }
}

#[async_trait]
pub trait Dialogs: Send + Sync {
    /// Ask for an existing file. `None` when the user cancels.
    async fn pick_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf>;

    /// Ask for a destination file. `None` when the user cancels.
    async fn save_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf>;

    /// Show an error box. Returns without waiting for the user.
    fn show_error(&self, title: &str, message: &str);

    /// Show an error box and wait until the user dismisses it. Must not be
    /// called on the UI thread.
    fn show_fatal(&self, title: &str, message: &str);
}
