//! Pluto Server Lifecycle Management
//!
//! Spawns the Julia process that runs the Pluto server, feeds its output
//! through the log scraper and reports the lifecycle to the rest of the app.
//! The server is never restarted: once it exits the session is marked dead
//! and every later notebook operation fails with "not initialized".

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::scraper::{LogScraper, ScraperSignal};
use crate::config::{LauncherPaths, Settings};
use crate::session::{redact_secret, ServerPhase, SessionContext, SessionInfo, StatusUpdate};
use crate::windows::WindowRegistry;

/// Environment variable pointing Julia at its package depot.
pub const DEPOT_ENV: &str = "JULIA_DEPOT_PATH";

/// The server could not be spawned or its environment prepared.
pub const RUN_ERROR: &str = "PLUTO-RUN-ERROR";

/// Installing Pluto failed for lack of network access.
pub const INSTALL_ERROR: &str = "CANNOT-INSTALL-PLUTO";

/// Codes passed to [`SidecarEvents::fatal`]. After any of them the launch
/// cannot recover and the host terminates.
pub const STARTUP_FATAL_CODES: &[&str] = &[RUN_ERROR, INSTALL_ERROR];

/// How long to wait for buffered output after the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `stop` waits for the killed process to be reaped.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

static JULIA_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^julia-(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)$").expect("valid regex")
});

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Julia not found at: {0}")]
    NotFound(String),
    #[error("Pluto failed to start: {0}")]
    StartFailed(String),
    #[error("Pluto server not running")]
    NotRunning,
    #[error("Could not locate the Pluto package: {0}")]
    LocateFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for SidecarError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Server process status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub session_ready: bool,
}

/// How the server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0.
    Clean,
    /// Non-zero exit, or killed by a signal we did not send.
    Crashed(Option<i32>),
    /// Killed through [`PlutoSidecar::stop`].
    Stopped,
}

/// Receives lifecycle notifications from the supervisor.
pub trait SidecarEvents: Send + Sync {
    fn status(&self, phase: ServerPhase);

    /// Called once, when the entry URL has been scraped from the output.
    fn session_ready(&self, session: &SessionInfo);

    /// An unrecoverable launch problem, one of [`STARTUP_FATAL_CODES`]. The
    /// host shows `message` in a blocking dialog and then terminates. Called
    /// from a runtime worker, never from the UI thread.
    fn fatal(&self, _code: &str, _message: &str) {}

    fn exited(&self, _exit: ExitKind) {}
}

impl SidecarEvents for WindowRegistry {
    fn status(&self, phase: ServerPhase) {
        self.broadcast(&StatusUpdate::Phase(phase));
    }

    fn session_ready(&self, session: &SessionInfo) {
        self.broadcast(&StatusUpdate::Phase(ServerPhase::Loaded));
        self.broadcast(&StatusUpdate::Session(session.to_payload()));
    }
}

/// Everything needed to spawn the server.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub julia: PathBuf,
    pub project_dir: PathBuf,
    pub sysimage: Option<PathBuf>,
    pub entry_script: PathBuf,
    pub notebook: Option<String>,
    pub depot: PathBuf,
    pub readonly_depot: PathBuf,
    pub scratch_dir: PathBuf,
    pub secret: String,
}

impl LaunchSpec {
    /// The cached system image is only used when it exists and no debug
    /// project is active.
    pub fn from_paths(
        paths: &LauncherPaths,
        julia: PathBuf,
        notebook: Option<String>,
        secret: &str,
    ) -> Self {
        let sysimage = (!paths.debug_project && paths.sysimage.exists()).then(|| paths.sysimage.clone());
        Self {
            julia,
            project_dir: paths.project_dir.clone(),
            sysimage,
            entry_script: paths.entry_script.clone(),
            notebook,
            depot: paths.depot.clone(),
            readonly_depot: paths.readonly_depot.clone(),
            scratch_dir: paths.scratch_dir.clone(),
            secret: secret.to_string(),
        }
    }

    /// Command line handed to Julia. The entry script reads the positional
    /// arguments in this order.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![format!("--project={}", self.project_dir.display())];
        if let Some(sysimage) = &self.sysimage {
            args.push(format!("--sysimage={}", sysimage.display()));
        }
        args.push(self.entry_script.to_string_lossy().into_owned());
        args.push(self.notebook.clone().unwrap_or_default());
        args.push(self.depot.to_string_lossy().into_owned());
        args.push(self.scratch_dir.to_string_lossy().into_owned());
        args.push(self.secret.clone());
        args
    }
}

/// Copy the bundled depot into the writable location unless it is already
/// there. Returns whether a copy happened.
pub fn ensure_writable_depot(readonly: &Path, writable: &Path) -> Result<bool, SidecarError> {
    if writable.exists() {
        return Ok(false);
    }
    if !readonly.exists() {
        warn!(path = %readonly.display(), "No bundled julia depot to copy");
        return Ok(false);
    }
    info!(from = %readonly.display(), to = %writable.display(), "Copying julia_depot from installation directory");
    copy_dir_recursive(readonly, writable)?;
    Ok(true)
}

fn prepare_environment(spec: &LaunchSpec) -> Result<(), SidecarError> {
    ensure_writable_depot(&spec.readonly_depot, &spec.depot)?;
    fs::create_dir_all(&spec.scratch_dir)?;
    Ok(())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), SidecarError> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Pick the Julia executable: the user's custom path if it exists, then a
/// bundled `julia-X.Y.Z` in the assets directory, then `julia` on `PATH`.
pub fn find_julia(assets_dir: &Path, settings: &Settings) -> PathBuf {
    if let Some(custom) = &settings.custom_julia_path {
        if custom.exists() {
            info!(path = %custom.display(), "Using custom julia");
            return custom.clone();
        }
        warn!(path = %custom.display(), "Custom julia path does not exist, ignoring");
    }

    match bundled_julia(assets_dir) {
        Some(path) => {
            info!(path = %path.display(), "Julia found in assets");
            path
        }
        None => {
            warn!("Couldn't find Julia in assets, falling back to the `julia` command");
            PathBuf::from("julia")
        }
    }
}

/// `(major, minor, patch)` of a `julia-X.Y.Z` directory name.
fn julia_version(name: &str) -> Option<(u32, u32, u32)> {
    let caps = JULIA_DIR_RE.captures(name)?;
    Some((
        caps["major"].parse().ok()?,
        caps["minor"].parse().ok()?,
        caps["patch"].parse().ok()?,
    ))
}

/// Newest bundled Julia, compared by version rather than by name.
fn bundled_julia(assets_dir: &Path) -> Option<PathBuf> {
    let (_, dir) = fs::read_dir(assets_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter_map(|name| julia_version(&name).map(|v| (v, name)))
        .max()?;
    Some(assets_dir.join(dir).join("bin").join(julia_binary_name()))
}

fn julia_binary_name() -> &'static str {
    #[cfg(windows)]
    {
        "julia.exe"
    }
    #[cfg(not(windows))]
    {
        "julia"
    }
}

/// Ask Julia where the Pluto package is installed.
pub async fn locate_pluto(julia: &Path, paths: &LauncherPaths) -> Result<PathBuf, SidecarError> {
    let output = Command::new(julia)
        .arg(format!("--project={}", paths.project_dir.display()))
        .arg(&paths.locate_script)
        .env(DEPOT_ENV, &paths.depot)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| SidecarError::NotFound(format!("{}: {}", julia.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SidecarError::LocateFailed(stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let location = stdout
        .lines()
        .next()
        .map(|l| l.trim().trim_end_matches('/'))
        .filter(|l| !l.is_empty())
        .ok_or_else(|| SidecarError::LocateFailed("locate script printed nothing".to_string()))?;
    info!(path = %location, "Pluto found");
    Ok(PathBuf::from(location))
}

struct RunningProcess {
    pid: Option<u32>,
    started_at: Instant,
    kill: Option<oneshot::Sender<()>>,
}

/// Supervises the Pluto server process.
pub struct PlutoSidecar {
    ctx: Arc<SessionContext>,
    events: Arc<dyn SidecarEvents>,
    process: Mutex<Option<RunningProcess>>,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    started: AtomicBool,
    exit: Arc<watch::Sender<Option<ExitKind>>>,
}

impl PlutoSidecar {
    pub fn new(ctx: Arc<SessionContext>, events: Arc<dyn SidecarEvents>) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            ctx,
            events,
            process: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            exit: Arc::new(exit),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the server. Must be called from within a Tokio runtime. A second
    /// call is a no-op: the server is launched at most once per app run.
    pub fn start(&self, spec: &LaunchSpec) -> Result<(), SidecarError> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Pluto server already started");
            return Ok(());
        }

        self.events.status(ServerPhase::Loading);

        if let Err(e) = prepare_environment(spec) {
            error!(code = RUN_ERROR, error = %e, "Could not prepare the julia environment");
            self.events.fatal(RUN_ERROR, &e.to_string());
            return Err(e);
        }

        info!(
            julia = %spec.julia.display(),
            project = %spec.project_dir.display(),
            sysimage = ?spec.sysimage,
            "Executing julia"
        );

        let spawned = Command::new(&spec.julia)
            .args(spec.args())
            .env(DEPOT_ENV, &spec.depot)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to spawn {}: {}", spec.julia.display(), e);
                error!(code = RUN_ERROR, error = %e, "Could not start Pluto");
                self.events.fatal(RUN_ERROR, &message);
                return Err(SidecarError::StartFailed(message));
            }
        };

        let pid = child.id();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, line_tx.clone());
        }
        drop(line_tx);

        let consumer = spawn_consumer(line_rx, self.ctx.clone(), self.events.clone());

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        self.running.store(true, Ordering::SeqCst);

        let ctx = self.ctx.clone();
        let events = self.events.clone();
        let running = self.running.clone();
        let stopping = self.stopping.clone();
        let exit = self.exit.clone();
        tokio::spawn(async move {
            let (status, requested) = tokio::select! {
                status = child.wait() => (status, false),
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "Failed to kill Pluto server");
                    }
                    (child.wait().await, true)
                }
            };
            running.store(false, Ordering::SeqCst);

            if tokio::time::timeout(DRAIN_TIMEOUT, consumer).await.is_err() {
                debug!("Output still open after exit, not waiting further");
            }

            let code = status.as_ref().ok().and_then(|s| s.code());
            let requested = requested || stopping.load(Ordering::SeqCst);
            let kind = match (requested, code) {
                (true, _) => ExitKind::Stopped,
                (false, Some(0)) => ExitKind::Clean,
                (false, code) => ExitKind::Crashed(code),
            };
            ctx.mark_exited();
            match kind {
                ExitKind::Crashed(code) => {
                    error!(code = "PLUTO-CRASHED", exit_code = ?code, "Pluto crashed")
                }
                _ => info!(exit_code = ?code, "Pluto server exited"),
            }
            events.exited(kind);
            exit.send_replace(Some(kind));
        });

        *self.process.lock() = Some(RunningProcess {
            pid,
            started_at: Instant::now(),
            kill: Some(kill_tx),
        });
        info!(pid = ?pid, "Started Pluto server");
        Ok(())
    }

    /// Kill the server if it is running. Safe to call repeatedly.
    ///
    /// The signal is sent before returning, so the process dies even if no
    /// runtime task runs afterwards. Unless called from a current-thread
    /// runtime, this also blocks briefly until the process has been reaped.
    pub fn stop(&self) {
        let Some(mut process) = self.process.lock().take() else {
            debug!("No Pluto server to stop");
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);
        info!(pid = ?process.pid, "Stopping Pluto server");

        if self.is_running() {
            if let Some(pid) = process.pid {
                kill_pid(pid);
            }
        }
        if let Some(kill) = process.kill.take() {
            if kill.send(()).is_err() {
                debug!("Pluto server had already exited");
            }
        }

        if can_block_on_exit() && !self.wait_reaped(STOP_TIMEOUT) {
            warn!(pid = ?process.pid, "Pluto server still running after stop");
        }
    }

    fn wait_reaped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        true
    }

    /// Wait until the server process has ended.
    pub async fn wait(&self) -> Result<ExitKind, SidecarError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SidecarError::NotRunning);
        }
        let mut rx = self.exit.subscribe();
        let exit = rx
            .wait_for(|e| e.is_some())
            .await
            .map_err(|_| SidecarError::NotRunning)?;
        Ok((*exit).unwrap_or(ExitKind::Stopped))
    }

    pub fn status(&self) -> SidecarStatus {
        let process = self.process.lock();
        let running = self.is_running();
        let status = SidecarStatus {
            running,
            pid: process.as_ref().filter(|_| running).and_then(|p| p.pid),
            uptime_seconds: process
                .as_ref()
                .filter(|_| running)
                .map(|p| p.started_at.elapsed().as_secs()),
            session_ready: self.ctx.is_ready(),
        };
        debug!(running = status.running, pid = ?status.pid, "Sidecar status query");
        status
    }
}

impl Drop for PlutoSidecar {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Send SIGKILL (Unix) or `taskkill /F /T` (Windows) to `pid`.
fn kill_pid(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                warn!(pid, error = %e, "Failed to kill Pluto server");
            }
        }
    }
    #[cfg(windows)]
    {
        match std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .output()
        {
            Ok(output) if !output.status.success() => {
                debug!(pid, status = %output.status, "taskkill did not succeed");
            }
            Ok(_) => {}
            Err(e) => warn!(pid, error = %e, "Failed to run taskkill"),
        }
    }
}

/// The exit task needs a free runtime thread to reap the child; a
/// current-thread runtime is blocked while `stop` runs.
fn can_block_on_exit() -> bool {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => !matches!(handle.runtime_flavor(), tokio::runtime::RuntimeFlavor::CurrentThread),
        Err(_) => true,
    }
}

/// Forward output lines to the consumer. Invalid UTF-8 is replaced rather
/// than dropped.
fn spawn_reader<R>(stream: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Output stream closed");
                    break;
                }
            }
        }
    })
}

/// Single scraper over both streams, in arrival order.
fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<String>,
    ctx: Arc<SessionContext>,
    events: Arc<dyn SidecarEvents>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scraper = LogScraper::new();
        while let Some(line) = rx.recv().await {
            info!(target: "julia", "{}", redact_secret(&line));
            match scraper.observe(&line) {
                Some(ScraperSignal::Status(phase)) => events.status(phase),
                Some(ScraperSignal::SessionReady(session)) => {
                    if ctx.establish(session.clone()) {
                        events.session_ready(&session);
                    }
                }
                Some(ScraperSignal::FatalNetworkError) => {
                    error!(code = "INTERNET-CONNECTION-ERROR", "Pluto install failed, no internet connection");
                    events.fatal(INSTALL_ERROR, "Please check your internet connection!");
                }
                None => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(root: &Path, debug_project: bool) -> LauncherPaths {
        LauncherPaths::from_parts(
            root.join("assets"),
            root.join("data"),
            root.join("config"),
            debug_project.then(|| root.join("dev")),
        )
    }

    #[test]
    fn test_args_without_sysimage() {
        let dir = TempDir::new().unwrap();
        let paths = paths(dir.path(), false);
        let spec = LaunchSpec::from_paths(&paths, PathBuf::from("julia"), None, "abc");

        let args = spec.args();
        assert_eq!(args.len(), 6);
        assert_eq!(args[0], format!("--project={}", paths.project_dir.display()));
        assert_eq!(args[1], paths.entry_script.to_string_lossy());
        assert_eq!(args[2], "");
        assert_eq!(args[3], paths.depot.to_string_lossy());
        assert_eq!(args[4], paths.scratch_dir.to_string_lossy());
        assert_eq!(args[5], "abc");
    }

    #[test]
    fn test_args_with_sysimage_and_notebook() {
        let dir = TempDir::new().unwrap();
        let paths = paths(dir.path(), false);
        fs::create_dir_all(&paths.assets_dir).unwrap();
        fs::write(&paths.sysimage, b"").unwrap();

        let spec = LaunchSpec::from_paths(
            &paths,
            PathBuf::from("julia"),
            Some("/home/me/nb.jl".to_string()),
            "abc",
        );

        let args = spec.args();
        assert_eq!(args[1], format!("--sysimage={}", paths.sysimage.display()));
        assert_eq!(args[3], "/home/me/nb.jl");
        assert_eq!(args.last().map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_debug_project_skips_sysimage() {
        let dir = TempDir::new().unwrap();
        let paths = paths(dir.path(), true);
        fs::create_dir_all(&paths.assets_dir).unwrap();
        fs::write(&paths.sysimage, b"").unwrap();

        let spec = LaunchSpec::from_paths(&paths, PathBuf::from("julia"), None, "abc");
        assert!(spec.sysimage.is_none());
        assert!(!spec.args().iter().any(|a| a.starts_with("--sysimage")));
    }

    #[test]
    fn test_depot_copied_only_when_missing() {
        let dir = TempDir::new().unwrap();
        let readonly = dir.path().join("ro");
        let writable = dir.path().join("rw");
        fs::create_dir_all(readonly.join("packages").join("Pluto")).unwrap();
        fs::write(readonly.join("packages").join("Pluto").join("Project.toml"), "name").unwrap();

        assert!(ensure_writable_depot(&readonly, &writable).unwrap());
        assert_eq!(
            fs::read_to_string(writable.join("packages").join("Pluto").join("Project.toml")).unwrap(),
            "name"
        );

        fs::write(readonly.join("extra"), "new").unwrap();
        assert!(!ensure_writable_depot(&readonly, &writable).unwrap());
        assert!(!writable.join("extra").exists());
    }

    #[test]
    fn test_find_julia_prefers_custom_then_bundled() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir_all(assets.join("julia-1.10.4").join("bin")).unwrap();
        fs::create_dir_all(assets.join("julia-notes")).unwrap();

        let bundled = find_julia(&assets, &Settings::default());
        assert_eq!(bundled, assets.join("julia-1.10.4").join("bin").join(julia_binary_name()));

        let custom = dir.path().join("my-julia");
        fs::write(&custom, "").unwrap();
        let settings = Settings {
            custom_julia_path: Some(custom.clone()),
        };
        assert_eq!(find_julia(&assets, &settings), custom);

        let missing = Settings {
            custom_julia_path: Some(dir.path().join("gone")),
        };
        assert_eq!(find_julia(&assets, &missing), bundled);
    }

    #[test]
    fn test_bundled_julia_compares_versions() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join("assets");
        for name in ["julia-1.9.0", "julia-1.10.4", "julia-1.2.10"] {
            fs::create_dir_all(assets.join(name).join("bin")).unwrap();
        }

        let found = find_julia(&assets, &Settings::default());
        assert_eq!(found, assets.join("julia-1.10.4").join("bin").join(julia_binary_name()));
        assert_eq!(julia_version("julia-1.9.0"), Some((1, 9, 0)));
        assert_eq!(julia_version("julia-1.9"), None);
    }

    #[test]
    fn test_find_julia_falls_back_to_path() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_julia(dir.path(), &Settings::default()), PathBuf::from("julia"));
    }

    #[tokio::test]
    async fn test_stop_without_process_is_noop() {
        let ctx = Arc::new(SessionContext::new());
        let sidecar = PlutoSidecar::new(ctx, Arc::new(WindowRegistry::new()));
        sidecar.stop();
        sidecar.stop();
        assert!(!sidecar.status().running);
        assert!(matches!(sidecar.wait().await, Err(SidecarError::NotRunning)));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let paths = paths(dir.path(), false);
        let spec = LaunchSpec::from_paths(&paths, dir.path().join("no-such-julia"), None, "abc");
        let ctx = Arc::new(SessionContext::new());
        let sidecar = PlutoSidecar::new(ctx.clone(), Arc::new(WindowRegistry::new()));

        let result = sidecar.start(&spec);

        assert!(matches!(result, Err(SidecarError::StartFailed(_))));
        assert!(!sidecar.is_running());
        assert!(!ctx.is_ready());
    }
}
