//! Native dialogs through the Tauri dialog plugin.

use async_trait::async_trait;
use std::path::PathBuf;
use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, FilePath, MessageDialogKind};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dialogs::{Dialogs, FileFilter};

pub struct TauriDialogs {
    app: AppHandle,
}

impl TauriDialogs {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

fn into_path(picked: Option<FilePath>) -> Option<PathBuf> {
    match picked?.into_path() {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "Dialog returned a non-file location");
            None
        }
    }
}

#[async_trait]
impl Dialogs for TauriDialogs {
    async fn pick_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf> {
        let (tx, rx) = oneshot::channel();
        let extensions: Vec<&str> = filter.extensions.iter().map(String::as_str).collect();
        self.app
            .dialog()
            .file()
            .set_title(title)
            .add_filter(&filter.name, &extensions)
            .pick_file(move |picked| {
                if tx.send(picked).is_err() {
                    debug!("Dialog answered after the caller went away");
                }
            });
        into_path(rx.await.ok().flatten())
    }

    async fn save_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf> {
        let (tx, rx) = oneshot::channel();
        let extensions: Vec<&str> = filter.extensions.iter().map(String::as_str).collect();
        self.app
            .dialog()
            .file()
            .set_title(title)
            .add_filter(&filter.name, &extensions)
            .save_file(move |picked| {
                if tx.send(picked).is_err() {
                    debug!("Dialog answered after the caller went away");
                }
            });
        into_path(rx.await.ok().flatten())
    }

    fn show_error(&self, title: &str, message: &str) {
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(|_| {});
    }

    fn show_fatal(&self, title: &str, message: &str) {
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .blocking_show();
    }
}
