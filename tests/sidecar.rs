//! Runs the supervisor against a shell script standing in for Julia.

#![cfg(unix)]

use parking_lot::Mutex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pluto_desktop_lib::pluto::scraper::NETWORK_FAILURE_MARKER;
use pluto_desktop_lib::pluto::sidecar::STARTUP_FATAL_CODES;
use pluto_desktop_lib::{
    ExitKind, LaunchSpec, LauncherPaths, PlutoSidecar, ServerPhase, SessionContext, SessionInfo,
    SidecarEvents,
};

#[derive(Default)]
struct Recorder {
    phases: Mutex<Vec<ServerPhase>>,
    ready: Mutex<Vec<SessionInfo>>,
    exits: Mutex<Vec<ExitKind>>,
    fatals: Mutex<Vec<(String, String)>>,
}

impl SidecarEvents for Recorder {
    fn status(&self, phase: ServerPhase) {
        self.phases.lock().push(phase);
    }

    fn session_ready(&self, session: &SessionInfo) {
        self.ready.lock().push(session.clone());
    }

    fn fatal(&self, code: &str, message: &str) {
        self.fatals.lock().push((code.to_string(), message.to_string()));
    }

    fn exited(&self, exit: ExitKind) {
        self.exits.lock().push(exit);
    }
}

fn write_stub(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("fake-julia");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn launch_spec(dir: &Path, julia: std::path::PathBuf, secret: &str) -> LaunchSpec {
    let paths = LauncherPaths::from_parts(
        dir.join("assets"),
        dir.join("data"),
        dir.join("config"),
        None,
    );
    LaunchSpec::from_paths(&paths, julia, None, secret)
}

#[tokio::test]
async fn test_ready_line_establishes_session_once() {
    let dir = TempDir::new().unwrap();
    let julia = write_stub(
        dir.path(),
        r#"echo "Updating registry"
echo "Loading Pluto..." 1>&2
echo "Go to http://localhost:1234/?secret=first in your browser"
echo "Go to http://localhost:9999/?secret=second in your browser"
exit 0"#,
    );
    let ctx = Arc::new(SessionContext::with_secret("first"));
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    sidecar.start(&launch_spec(dir.path(), julia, "first")).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(10), sidecar.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, ExitKind::Clean);
    let ready = recorder.ready.lock().clone();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].port(), 1234);
    assert_eq!(ready[0].secret(), "first");
    assert!(recorder.phases.lock().contains(&ServerPhase::Updating));
    assert!(recorder.phases.lock().contains(&ServerPhase::Loading));
    assert_eq!(recorder.exits.lock().clone(), vec![ExitKind::Clean]);
    // Scratch directory is created before launch
    assert!(dir.path().join("data").join("unsaved_notebooks").is_dir());
    // A dead server leaves no usable session
    assert!(ctx.has_exited());
    assert!(ctx.session().is_none());
}

#[tokio::test]
async fn test_nonzero_exit_is_a_crash() {
    let dir = TempDir::new().unwrap();
    let julia = write_stub(dir.path(), "echo 'ERROR: something broke' 1>&2\nexit 3");
    let ctx = Arc::new(SessionContext::new());
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    sidecar
        .start(&launch_spec(dir.path(), julia, ctx.launch_secret()))
        .unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(10), sidecar.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, ExitKind::Crashed(Some(3)));
    assert!(recorder.ready.lock().is_empty());
    assert!(!ctx.is_ready());
}

#[tokio::test]
async fn test_stop_kills_running_server() {
    let dir = TempDir::new().unwrap();
    let julia = write_stub(dir.path(), "echo 'Loading'\nexec sleep 30");
    let ctx = Arc::new(SessionContext::new());
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    sidecar
        .start(&launch_spec(dir.path(), julia, ctx.launch_secret()))
        .unwrap();
    assert!(sidecar.status().running);
    assert!(sidecar.status().pid.is_some());

    sidecar.stop();
    sidecar.stop();
    let exit = tokio::time::timeout(Duration::from_secs(10), sidecar.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, ExitKind::Stopped);
    assert!(!sidecar.status().running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_child_is_gone_when_stop_returns() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let dir = TempDir::new().unwrap();
    let julia = write_stub(dir.path(), "exec sleep 30");
    let ctx = Arc::new(SessionContext::new());
    let sidecar = PlutoSidecar::new(ctx.clone(), Arc::new(Recorder::default()));

    sidecar
        .start(&launch_spec(dir.path(), julia, ctx.launch_secret()))
        .unwrap();
    let pid = sidecar.status().pid.unwrap() as i32;

    sidecar.stop();

    assert!(!sidecar.status().running);
    assert_eq!(kill(Pid::from_raw(pid), None), Err(nix::errno::Errno::ESRCH));
}

#[tokio::test]
async fn test_network_failure_before_ready_is_fatal_once() {
    let dir = TempDir::new().unwrap();
    let julia = write_stub(
        dir.path(),
        &format!("echo '{0}' 1>&2\necho '{0}' 1>&2\nexit 1", NETWORK_FAILURE_MARKER),
    );
    let ctx = Arc::new(SessionContext::new());
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    sidecar
        .start(&launch_spec(dir.path(), julia, ctx.launch_secret()))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), sidecar.wait())
        .await
        .unwrap()
        .unwrap();

    let fatals = recorder.fatals.lock().clone();
    assert_eq!(fatals.len(), 1);
    assert_eq!(fatals[0].0, "CANNOT-INSTALL-PLUTO");
    assert!(STARTUP_FATAL_CODES.contains(&fatals[0].0.as_str()));
}

#[tokio::test]
async fn test_network_failure_after_ready_is_ignored() {
    let dir = TempDir::new().unwrap();
    let julia = write_stub(
        dir.path(),
        &format!(
            "echo 'Go to http://localhost:1234/?secret=abc in your browser'\necho '{}' 1>&2\nexit 0",
            NETWORK_FAILURE_MARKER
        ),
    );
    let ctx = Arc::new(SessionContext::with_secret("abc"));
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    sidecar.start(&launch_spec(dir.path(), julia, "abc")).unwrap();
    tokio::time::timeout(Duration::from_secs(10), sidecar.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(recorder.ready.lock().len(), 1);
    assert!(recorder.fatals.lock().is_empty());
}

#[tokio::test]
async fn test_spawn_failure_is_a_startup_fatal() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(SessionContext::new());
    let recorder = Arc::new(Recorder::default());
    let sidecar = PlutoSidecar::new(ctx.clone(), recorder.clone());

    let result = sidecar.start(&launch_spec(
        dir.path(),
        dir.path().join("no-such-julia"),
        ctx.launch_secret(),
    ));

    assert!(result.is_err());
    let fatals = recorder.fatals.lock().clone();
    assert_eq!(fatals.len(), 1);
    assert_eq!(fatals[0].0, "PLUTO-RUN-ERROR");
    assert!(STARTUP_FATAL_CODES.contains(&fatals[0].0.as_str()));
}
