//! Pluto Desktop CLI
//!
//! Headless front end to the launcher: run the Pluto server without a
//! window, inspect resolved paths and manage the custom Julia setting.
//! Results are printed as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use pluto_desktop_lib::{
    find_julia, is_url_or_path, locate_pluto, logging, redact_secret, ExitKind,
    LaunchSpec, LauncherPaths, LocatorKind, PlutoSidecar, ServerPhase, SessionContext,
    SessionInfo, Settings, SidecarEvents,
};

#[derive(Parser)]
#[command(name = "pluto-desktop-cli")]
#[command(about = "Pluto Desktop CLI - run and inspect the Pluto server headless", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Pluto server and print its URL once it is ready
    Serve {
        /// Notebook to open when the server starts
        #[arg(short, long)]
        notebook: Option<String>,
        /// Print the URL including the secret
        #[arg(long)]
        show_secret: bool,
    },
    /// Show the resolved launcher paths
    Paths,
    /// Locate Julia and the Pluto package
    Locate,
    /// Classify a path or URL the way the launcher would
    Check {
        /// Notebook path or URL
        locator: String,
    },
    /// Show or change the custom Julia executable
    Julia {
        /// Julia executable to use from now on
        #[arg(long, conflicts_with = "clear")]
        set: Option<PathBuf>,
        /// Go back to the bundled Julia
        #[arg(long)]
        clear: bool,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
struct ReadyOutput {
    url: String,
    port: u16,
}

#[derive(Serialize)]
struct ExitOutput {
    exit: String,
}

#[derive(Serialize)]
struct PathsOutput {
    assets_dir: String,
    data_dir: String,
    depot: String,
    readonly_depot: String,
    scratch_dir: String,
    project_dir: String,
    debug_project: bool,
    sysimage: Option<String>,
    log_dir: String,
    settings_file: String,
}

#[derive(Serialize)]
struct LocateOutput {
    julia: String,
    pluto: String,
}

#[derive(Serialize)]
struct CheckOutput {
    kind: String,
    supported: bool,
}

#[derive(Serialize)]
struct JuliaOutput {
    custom_julia_path: Option<String>,
    effective: String,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    logging::init(None);
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            notebook,
            show_secret,
        } => handle_serve(notebook, show_secret).await,
        Commands::Paths => handle_paths(),
        Commands::Locate => handle_locate().await,
        Commands::Check { locator } => handle_check(&locator),
        Commands::Julia { set, clear } => handle_julia(set, clear),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput {
                error: format!("{:#}", e),
            };
            match serde_json::to_string(&error) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("{:#}", e),
            }
            std::process::exit(1);
        }
    }
}

// ============ Handlers ============

/// Prints readiness to stdout as soon as it happens and forwards startup
/// failures to the serve loop.
struct CliEvents {
    show_secret: bool,
    fatal_tx: mpsc::UnboundedSender<(String, String)>,
}

impl SidecarEvents for CliEvents {
    fn status(&self, phase: ServerPhase) {
        info!(phase = ?phase, "Server status");
    }

    fn session_ready(&self, session: &SessionInfo) {
        let url = session.landing_url().to_string();
        let output = ReadyOutput {
            url: if self.show_secret { url } else { redact_secret(&url) },
            port: session.port(),
        };
        if let Ok(json) = serde_json::to_string(&output) {
            println!("{}", json);
        }
    }

    fn fatal(&self, code: &str, message: &str) {
        if self.fatal_tx.send((code.to_string(), message.to_string())).is_err() {
            warn!(code = %code, "Startup failure reported after serve ended");
        }
    }
}

async fn handle_serve(notebook: Option<String>, show_secret: bool) -> anyhow::Result<String> {
    let paths = LauncherPaths::resolve(None)?;
    let settings = Settings::load(&paths.settings_file).unwrap_or_default();
    let julia = find_julia(&paths.assets_dir, &settings);

    let ctx = Arc::new(SessionContext::new());
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let sidecar = PlutoSidecar::new(ctx.clone(), Arc::new(CliEvents { show_secret, fatal_tx }));
    let spec = LaunchSpec::from_paths(&paths, julia, notebook, ctx.launch_secret());
    sidecar.start(&spec).context("starting the Pluto server")?;

    let exit = tokio::select! {
        exit = sidecar.wait() => exit?,
        Some((code, message)) = fatal_rx.recv() => {
            sidecar.stop();
            ctx.teardown();
            anyhow::bail!("{}: {}", code, message);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping server");
            sidecar.stop();
            sidecar.wait().await?
        }
    };
    ctx.teardown();
    if let Ok((code, message)) = fatal_rx.try_recv() {
        anyhow::bail!("{}: {}", code, message);
    }

    let exit = match exit {
        ExitKind::Clean => "clean".to_string(),
        ExitKind::Stopped => "stopped".to_string(),
        ExitKind::Crashed(code) => format!("crashed ({})", code.map_or("signal".to_string(), |c| c.to_string())),
    };
    Ok(serde_json::to_string(&ExitOutput { exit })?)
}

fn handle_paths() -> anyhow::Result<String> {
    let paths = LauncherPaths::resolve(None)?;
    let output = PathsOutput {
        assets_dir: paths.assets_dir.display().to_string(),
        data_dir: paths.data_dir.display().to_string(),
        depot: paths.depot.display().to_string(),
        readonly_depot: paths.readonly_depot.display().to_string(),
        scratch_dir: paths.scratch_dir.display().to_string(),
        project_dir: paths.project_dir.display().to_string(),
        debug_project: paths.debug_project,
        sysimage: paths
            .sysimage
            .exists()
            .then(|| paths.sysimage.display().to_string()),
        log_dir: paths.log_dir.display().to_string(),
        settings_file: paths.settings_file.display().to_string(),
    };
    Ok(serde_json::to_string(&output)?)
}

async fn handle_locate() -> anyhow::Result<String> {
    let paths = LauncherPaths::resolve(None)?;
    let settings = Settings::load(&paths.settings_file).unwrap_or_default();
    let julia = find_julia(&paths.assets_dir, &settings);
    let pluto = locate_pluto(&julia, &paths)
        .await
        .context("locating the Pluto package")?;
    let output = LocateOutput {
        julia: julia.display().to_string(),
        pluto: pluto.display().to_string(),
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_check(locator: &str) -> anyhow::Result<String> {
    let kind = is_url_or_path(locator);
    let output = CheckOutput {
        kind: format!("{:?}", kind).to_lowercase(),
        supported: kind != LocatorKind::None,
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_julia(set: Option<PathBuf>, clear: bool) -> anyhow::Result<String> {
    let paths = LauncherPaths::resolve(None)?;
    let mut settings = Settings::load(&paths.settings_file)?;

    if let Some(path) = set {
        if !path.exists() {
            warn!(path = %path.display(), "Custom julia does not exist yet");
        }
        settings.custom_julia_path = Some(path);
        settings.save(&paths.settings_file)?;
    } else if clear {
        settings.custom_julia_path = None;
        settings.save(&paths.settings_file)?;
    }

    let output = JuliaOutput {
        custom_julia_path: settings
            .custom_julia_path
            .as_ref()
            .map(|p| p.display().to_string()),
        effective: find_julia(&paths.assets_dir, &settings).display().to_string(),
    };
    Ok(serde_json::to_string(&output)?)
}
