// Pluto Desktop Library
// Core launcher logic shared by the Tauri app and the CLI binary

pub mod config;
pub mod dialogs;
pub mod extensions;
pub mod interceptor;
pub mod logging;
pub mod notebook;
pub mod pluto;
pub mod session;
pub mod windows;

#[cfg(feature = "desktop")]
pub mod desktop;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, LaunchArgs, LauncherPaths, Settings, APP_IDENTIFIER};
pub use dialogs::{Dialogs, FileFilter};
pub use extensions::{is_ext_match, is_url_or_path, LocatorKind, PLUTO_FILE_EXTENSIONS};
pub use interceptor::{FrontendPages, NavigationInterceptor, NavigationOutcome, PendingOpen};
pub use notebook::{ExportKind, NotebookError, NotebookOps, OpenKind};
pub use pluto::sidecar::{ensure_writable_depot, find_julia, locate_pluto};
pub use pluto::{
    ExitKind, LaunchSpec, NotebookDirectory, PlutoApi, PlutoClient, PlutoSidecar, SidecarError,
    SidecarEvents, SidecarStatus,
};
pub use session::{
    generate_secret, redact_secret, ServerPhase, SessionContext, SessionError, SessionInfo,
    SessionPayload, StatusUpdate,
};
pub use windows::{PlutoWindow, WindowError, WindowHandle, WindowRegistry};
