//! Desktop shell
//!
//! Wires the launcher core into a Tauri application: one shared
//! [`AppState`], webview windows registered with the window registry, the
//! navigation interceptor hooked into every window, and the Pluto server
//! started in the background as soon as the app is up. Only one instance
//! runs: later launches hand their notebook to it and exit.

pub mod commands;
pub mod dialogs;
pub mod window;

use clap::Parser;
use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent, WebviewUrl, WebviewWindowBuilder, WindowEvent};
use tauri_plugin_shell::ShellExt;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{LaunchArgs, LauncherPaths, Settings};
use crate::interceptor::{NavigationInterceptor, REQUEST_HOOK_SCRIPT};
use crate::notebook::{NotebookOps, OpenKind};
use crate::pluto::sidecar::{find_julia, locate_pluto};
use crate::pluto::{ExitKind, LaunchSpec, PlutoClient, PlutoSidecar, SidecarEvents};
use crate::session::{ServerPhase, SessionContext, SessionInfo};
use crate::windows::{PlutoWindow, WindowError, WindowRegistry};
use crate::{dialogs::Dialogs, logging};

use self::dialogs::TauriDialogs;
use self::window::TauriWindow;

const WINDOW_TITLE: &str = "⚡ Pluto ⚡";

/// Shared state handed to every command.
pub struct AppState {
    pub ctx: Arc<SessionContext>,
    pub registry: Arc<WindowRegistry>,
    pub ops: Arc<NotebookOps>,
    pub interceptor: Arc<NavigationInterceptor>,
    pub sidecar: Arc<PlutoSidecar>,
    pub paths: LauncherPaths,
}

/// Reacts to server lifecycle events on behalf of the UI.
struct DesktopEvents {
    app: AppHandle,
    registry: Arc<WindowRegistry>,
    ops: Arc<NotebookOps>,
    dialogs: Arc<TauriDialogs>,
    startup_url: Option<String>,
}

impl SidecarEvents for DesktopEvents {
    fn status(&self, phase: ServerPhase) {
        self.registry.status(phase);
    }

    fn session_ready(&self, session: &SessionInfo) {
        self.registry.session_ready(session);
        self.registry.for_each(|w| {
            if let Err(e) = w.handle().navigate(session.entry_url()) {
                warn!(window = %w.id(), error = %e, "Could not show the Pluto page");
            }
        });

        if let Some(url) = self.startup_url.clone() {
            let Some(target) = self.registry.windows().into_iter().next() else {
                return;
            };
            let ops = self.ops.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = ops.open(&target, OpenKind::Url, Some(url)).await {
                    debug!(error = %e, "Startup URL not opened");
                }
            });
        }
    }

    fn fatal(&self, code: &str, message: &str) {
        error!(code = %code, "Startup failed, exiting");
        self.dialogs.show_fatal(code, message);
        self.app.exit(1);
    }

    fn exited(&self, exit: ExitKind) {
        if let ExitKind::Crashed(code) = exit {
            error!(code = ?code, "Pluto server crashed");
            self.dialogs.show_error("PLUTO-CRASHED", "Pluto crashed");
        }
    }
}

/// Hand `url` to the system browser.
pub(crate) fn open_in_browser(app: &AppHandle, url: &Url) {
    info!(host = ?url.host_str(), "Opening external link");
    #[allow(deprecated)]
    let opened = app.shell().open(url.as_str(), None);
    if let Err(e) = opened {
        warn!(error = %e, "External link not opened");
    }
}

/// Show `locator` for the OS: raise the window that already has it, or
/// open it in a new one.
fn open_requested(app: &AppHandle, locator: String) {
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        let Some(state) = app.try_state::<AppState>() else {
            warn!("Open requested before the app was set up");
            return;
        };
        let ops = state.ops.clone();
        let result = ops
            .open_requested(locator, || {
                create_window(&app, &state).map_err(|e| WindowError::Failed(e.to_string()))
            })
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Requested notebook not shown");
        }
    });
}

/// A later launch of the app. Its notebook is shown here; without one the
/// most recent window is raised.
fn on_second_instance(app: &AppHandle, argv: Vec<String>, _cwd: String) {
    let args = LaunchArgs::try_parse_from(&argv)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unrecognised command line of second launch");
            LaunchArgs::default()
        })
        .resolve();
    info!(args = ?args, "Second launch");
    if let Some(locator) = args.notebook.or(args.url) {
        open_requested(app, locator);
        return;
    }
    let Some(state) = app.try_state::<AppState>() else {
        return;
    };
    if let Some(window) = state.registry.windows().pop() {
        if let Err(e) = window.handle().focus() {
            warn!(error = %e, "Window not raised");
        }
    }
}

/// Build a webview window, hook up the interceptor and register it.
pub fn create_window(app: &AppHandle, state: &AppState) -> tauri::Result<Arc<PlutoWindow>> {
    let label = format!("pluto-{}", Uuid::new_v4().simple());
    let interceptor = state.interceptor.clone();
    let nav_label = label.clone();
    let nav_app = app.clone();

    let webview = WebviewWindowBuilder::new(app, &label, WebviewUrl::App("index.html".into()))
        .title(WINDOW_TITLE)
        .inner_size(800.0, 600.0)
        .resizable(true)
        .initialization_script(REQUEST_HOOK_SCRIPT)
        .on_navigation(move |url| {
            let outcome = interceptor.on_before_request(&nav_label, url);
            if let Some(action) = outcome.action {
                tauri::async_runtime::spawn(action.run());
            }
            if let Some(target) = &outcome.external {
                open_in_browser(&nav_app, target);
            }
            if let Some(target) = outcome.redirect {
                if let Some(mut window) = nav_app.get_webview_window(&nav_label) {
                    tauri::async_runtime::spawn(async move {
                        if let Err(e) = window.navigate(target) {
                            warn!(error = %e, "Redirect failed");
                        }
                    });
                }
                return false;
            }
            !outcome.cancel
        })
        .on_download(|_webview, event| {
            match event {
                tauri::webview::DownloadEvent::Requested { url, .. } => {
                    debug!(url = %crate::session::redact_secret(url.as_str()), "Download requested");
                }
                tauri::webview::DownloadEvent::Finished { path, success, .. } => {
                    info!(path = ?path, success = success, "Download finished");
                }
                _ => {}
            }
            true
        })
        .build()?;

    let registered = state.registry.register(Arc::new(TauriWindow::new(webview)));
    debug!(label = %label, id = %registered.id(), "Window created");
    Ok(registered)
}

fn setup(app: &mut tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    let mut paths = LauncherPaths::resolve(app.path().resource_dir().ok())?;
    logging::init(Some(&paths.log_dir));

    let args = LaunchArgs::try_parse().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unrecognised command line");
        LaunchArgs::default()
    });
    let args = args.resolve();
    info!(args = ?args, "Arguments received");
    args.apply_to(&mut paths);

    let settings = Settings::load(&paths.settings_file).unwrap_or_else(|e| {
        warn!(error = %e, "Using default settings");
        Settings::default()
    });
    let julia = find_julia(&paths.assets_dir, &settings);

    let handle = app.handle().clone();
    let ctx = Arc::new(SessionContext::new());
    let registry = Arc::new(WindowRegistry::new());
    let dialogs = Arc::new(TauriDialogs::new(handle.clone()));
    let ops = Arc::new(NotebookOps::new(
        ctx.clone(),
        registry.clone(),
        Arc::new(PlutoClient::new()),
        dialogs.clone(),
    ));
    let interceptor = Arc::new(NavigationInterceptor::new(
        ctx.clone(),
        registry.clone(),
        ops.clone(),
    ));
    let events = Arc::new(DesktopEvents {
        app: handle.clone(),
        registry: registry.clone(),
        ops: ops.clone(),
        dialogs,
        startup_url: args.url.clone(),
    });
    let sidecar = Arc::new(PlutoSidecar::new(ctx.clone(), events));

    let spec = LaunchSpec::from_paths(&paths, julia.clone(), args.notebook.clone(), ctx.launch_secret());

    app.manage(AppState {
        ctx,
        registry,
        ops,
        interceptor: interceptor.clone(),
        sidecar: sidecar.clone(),
        paths: paths.clone(),
    });

    let state = app.state::<AppState>();
    create_window(&handle, &state)?;

    tauri::async_runtime::spawn(async move {
        if let Err(e) = sidecar.start(&spec) {
            error!(error = %e, "Pluto server did not start");
            return;
        }
        match locate_pluto(&julia, &paths).await {
            Ok(dir) => interceptor.set_pluto_location(dir),
            Err(e) => warn!(error = %e, "Using the pages served by Pluto"),
        }
    });

    Ok(())
}

fn on_window_event(window: &tauri::Window, event: &WindowEvent) {
    let state = window.state::<AppState>();
    let Some(registered) = state.registry.by_contents_id(window.label()) else {
        return;
    };
    match event {
        WindowEvent::CloseRequested { .. } => {
            if registered.notebook_id().is_some() {
                let ops = state.ops.clone();
                tauri::async_runtime::spawn(async move {
                    if let Err(e) = ops.shutdown(&registered, None).await {
                        debug!(error = %e, "Notebook not shut down on close");
                    }
                });
            }
        }
        WindowEvent::Destroyed => state.registry.unregister(registered.id()),
        _ => {}
    }
}

pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(on_second_instance))
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(setup)
        .on_window_event(on_window_event)
        .invoke_handler(tauri::generate_handler![
            commands::open_notebook,
            commands::shutdown_notebook,
            commands::move_notebook,
            commands::export_notebook,
            commands::notebook_location,
            commands::sidecar_status,
            commands::new_window,
            commands::open_log_folder,
            commands::intercept_request,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| match event {
        RunEvent::Exit => {
            if let Some(state) = app_handle.try_state::<AppState>() {
                info!("Application exiting, stopping Pluto");
                state.sidecar.stop();
                state.ctx.teardown();
            }
        }
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        RunEvent::Opened { urls } => {
            for url in urls {
                let locator = match url.to_file_path() {
                    Ok(path) => path.to_string_lossy().into_owned(),
                    Err(()) => url.to_string(),
                };
                open_requested(app_handle, locator);
            }
        }
        _ => {}
    });
}
