//! Pluto Server Integration
//!
//! Process supervision, readiness detection from log output, the HTTP client
//! for the server's notebook routes, and the directory of running notebooks.

pub mod client;
pub mod notebooks;
pub mod scraper;
pub mod sidecar;

pub use client::{OpenTarget, PlutoApi, PlutoApiError, PlutoClient};
pub use notebooks::NotebookDirectory;
pub use scraper::{LogScraper, ScraperSignal};
pub use sidecar::{ExitKind, LaunchSpec, PlutoSidecar, SidecarError, SidecarEvents, SidecarStatus};
