//! Launcher paths and persisted settings.
//!
//! Everything the supervisor needs to find on disk is resolved once at
//! startup into a [`LauncherPaths`]. User overrides live in a small JSON
//! settings file under the platform config directory.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::extensions::{is_url_or_path, LocatorKind};

/// Application identifier - must match tauri.conf.json
pub const APP_IDENTIFIER: &str = "org.plutojl.desktop";

/// Overrides the bundled assets directory.
pub const ASSETS_ENV: &str = "PLUTO_ASSETS_DIR";

/// Points the server at a development Julia project instead of the bundled one.
pub const DEBUG_PROJECT_ENV: &str = "DEBUG_PROJECT_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine app data directory")]
    NoAppDataDir,
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Locations used to launch and talk to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    pub assets_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Writable per-user Julia depot.
    pub depot: PathBuf,
    /// Depot shipped with the installer; seeds `depot`.
    pub readonly_depot: PathBuf,
    /// Where the server keeps unsaved notebooks.
    pub scratch_dir: PathBuf,
    pub project_dir: PathBuf,
    /// True when `project_dir` was overridden (`DEBUG_PROJECT_PATH` or `--project`).
    pub debug_project: bool,
    pub sysimage: PathBuf,
    pub entry_script: PathBuf,
    pub locate_script: PathBuf,
    pub log_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl LauncherPaths {
    /// Resolve paths from the environment and the platform directories.
    /// `resource_dir` is the bundle's resource directory when running as the
    /// desktop app.
    pub fn resolve(resource_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let assets_dir = match std::env::var_os(ASSETS_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => match resource_dir {
                Some(dir) => dir.join("assets"),
                None => std::env::current_dir()?.join("assets"),
            },
        };
        let data_dir = dirs::data_dir()
            .ok_or(ConfigError::NoAppDataDir)?
            .join(APP_IDENTIFIER);
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join(APP_IDENTIFIER);
        let debug_project = std::env::var_os(DEBUG_PROJECT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let paths = Self::from_parts(assets_dir, data_dir, config_dir, debug_project);
        debug!(assets = %paths.assets_dir.display(), data = %paths.data_dir.display(), "Resolved launcher paths");
        Ok(paths)
    }

    pub fn from_parts(
        assets_dir: PathBuf,
        data_dir: PathBuf,
        config_dir: PathBuf,
        debug_project: Option<PathBuf>,
    ) -> Self {
        let debug = debug_project.is_some();
        let project_dir = debug_project.unwrap_or_else(|| assets_dir.join("env_for_julia"));
        Self {
            depot: data_dir.join("julia_depot"),
            readonly_depot: assets_dir.join("julia_depot"),
            scratch_dir: data_dir.join("unsaved_notebooks"),
            project_dir,
            debug_project: debug,
            sysimage: assets_dir.join("pluto-sysimage.so"),
            entry_script: assets_dir.join("run_pluto.jl"),
            locate_script: assets_dir.join("locate_pluto.jl"),
            log_dir: data_dir.join("logs"),
            settings_file: config_dir.join("settings.json"),
            assets_dir,
            data_dir,
        }
    }
}

/// User-editable settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Julia executable to use instead of the bundled one.
    #[serde(default)]
    pub custom_julia_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
                Err(e.into())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, &content)
    }
}

/// Command line of the desktop app, e.g. `pluto-desktop -n demo.pluto.jl`.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "pluto-desktop")]
#[command(about = "Pluto notebooks on the desktop", long_about = None)]
pub struct LaunchArgs {
    /// Julia project to run Pluto in
    #[arg(short, long)]
    pub project: Option<PathBuf>,
    /// Pluto URL to open once the server is up
    #[arg(short, long)]
    pub url: Option<String>,
    /// Notebook file to open
    #[arg(short, long)]
    pub notebook: Option<String>,
    /// Notebook path or URL
    pub locator: Option<String>,
}

impl LaunchArgs {
    /// Fold the positional locator into `url` or `notebook`. Explicit flags
    /// win over the positional argument.
    pub fn resolve(mut self) -> Self {
        if let Some(locator) = self.locator.take() {
            match is_url_or_path(&locator) {
                LocatorKind::Url => {
                    self.url.get_or_insert(locator);
                }
                LocatorKind::Path => {
                    self.notebook.get_or_insert(locator);
                }
                LocatorKind::None => {
                    warn!(locator = %locator, "Ignoring argument that is neither a URL nor a notebook");
                }
            }
        }
        self
    }

    /// Apply `--project` to the resolved paths. A custom project is treated
    /// like a debug project: the bundled system image does not match it.
    pub fn apply_to(&self, paths: &mut LauncherPaths) {
        if let Some(project) = &self.project {
            paths.project_dir = project.clone();
            paths.debug_project = true;
        }
    }
}

/// Write to a temp file then rename into place.
fn atomic_write(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
