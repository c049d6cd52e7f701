//! Navigation Interceptor
//!
//! The Pluto frontend links to its own routes (`.../frontend/new`,
//! `.../frontend/edit?id=...`). Inside the desktop shell those are handled
//! natively: some are rewritten to the right page, others are cancelled and
//! turned into notebook operations on the window that issued them. Links
//! leaving the local server are handed to the system browser.
//!
//! Webview navigation callbacks only see top-level page loads. Subresource
//! requests (the upload form posts with `fetch`) reach the interceptor via
//! [`REQUEST_HOOK_SCRIPT`], which runs in every page and asks the host
//! before letting a `/frontend/...` request through.

use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::Url;

use crate::notebook::{NotebookOps, OpenKind};
use crate::session::{SessionContext, SessionInfo};
use crate::windows::{PlutoWindow, WindowRegistry};

static FRONTEND_ROUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/frontend/(?P<route>[^/]*)$").expect("valid regex"));

/// Installed in every webview before page scripts run. Routes `fetch` calls
/// to `/frontend/...` and `window.open` through the `intercept_request`
/// command, then follows the returned [`RequestDecision`].
pub const REQUEST_HOOK_SCRIPT: &str = r#"(() => {
  if (window.__plutoRequestHook) return;
  window.__plutoRequestHook = true;
  const frontendRoute = /\/frontend\/[^/]*$/;
  const ask = (url) => {
    const tauri = window.__TAURI__;
    if (!tauri || !tauri.core) return Promise.resolve(null);
    return tauri.core.invoke("intercept_request", { url }).catch(() => null);
  };
  const originalFetch = window.fetch.bind(window);
  window.fetch = async (input, init) => {
    const raw = input instanceof Request ? input.url : String(input);
    const url = new URL(raw, window.location.href);
    if (!frontendRoute.test(url.pathname)) return originalFetch(input, init);
    const decision = await ask(url.href);
    if (decision && decision.redirect) {
      if (input instanceof Request) return originalFetch(new Request(decision.redirect, input), init);
      return originalFetch(decision.redirect, init);
    }
    if (decision && decision.cancel) return new Response(null, { status: 204 });
    return originalFetch(input, init);
  };
  const originalOpen = window.open.bind(window);
  const localHost = /^(localhost|127\.0\.0\.1|\[::1\]|.+\.localhost)$/;
  window.open = (target, ...rest) => {
    const url = new URL(String(target ?? ""), window.location.href);
    if ((url.protocol === "http:" || url.protocol === "https:") && !localHost.test(url.hostname)) {
      ask(url.href);
      return null;
    }
    return originalOpen(target, ...rest);
  };
})();"#;

/// Whether `url` leaves the local Pluto server and belongs in the system
/// browser.
pub fn is_external(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(url::Host::Domain(host)) => host != "localhost" && !host.ends_with(".localhost"),
        Some(url::Host::Ipv4(ip)) => !ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => !ip.is_loopback(),
        None => false,
    }
}

/// Landing and editor pages the shell shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendPages {
    pub landing: Url,
    pub editor: Url,
}

impl FrontendPages {
    /// Pages shipped inside the located Pluto package.
    pub fn local(pluto_dir: &Path) -> Option<Self> {
        let frontend = pluto_dir.join("frontend");
        Some(Self {
            landing: Url::from_file_path(frontend.join("index.html")).ok()?,
            editor: Url::from_file_path(frontend.join("editor.html")).ok()?,
        })
    }

    /// Pages served by the running session.
    pub fn hosted(session: &SessionInfo) -> Self {
        Self {
            landing: session.landing_url(),
            editor: session.route_url("edit", &[]),
        }
    }
}

/// A notebook open deferred out of the navigation callback.
pub struct PendingOpen {
    ops: Arc<NotebookOps>,
    window: Arc<PlutoWindow>,
    kind: OpenKind,
    locator: Option<String>,
}

impl PendingOpen {
    pub fn kind(&self) -> OpenKind {
        self.kind
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    /// Failures are reported by the operation itself.
    pub async fn run(self) {
        if let Err(e) = self.ops.open(&self.window, self.kind, self.locator).await {
            debug!(error = %e, "Open requested by navigation failed");
        }
    }
}

impl std::fmt::Debug for PendingOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOpen")
            .field("window", &self.window.id())
            .field("kind", &self.kind)
            .field("locator", &self.locator)
            .finish()
    }
}

/// What to do with an outgoing request.
#[derive(Debug, Default)]
pub struct NavigationOutcome {
    pub cancel: bool,
    pub redirect: Option<Url>,
    /// To be opened in the system browser instead of the window.
    pub external: Option<Url>,
    /// To be spawned by the caller once the callback has returned.
    pub action: Option<PendingOpen>,
}

/// The part of a [`NavigationOutcome`] handed back to page scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestDecision {
    pub cancel: bool,
    pub redirect: Option<String>,
}

impl NavigationOutcome {
    pub fn pass() -> Self {
        Self::default()
    }

    fn redirect(url: Url) -> Self {
        Self {
            redirect: Some(url),
            ..Self::default()
        }
    }

    fn cancelled(action: Option<PendingOpen>) -> Self {
        Self {
            cancel: true,
            action,
            ..Self::default()
        }
    }

    fn external(url: Url) -> Self {
        Self {
            cancel: true,
            external: Some(url),
            ..Self::default()
        }
    }

    /// Split into the answer for the page and the work left to the host.
    pub fn into_decision(self) -> (RequestDecision, Option<Url>, Option<PendingOpen>) {
        let decision = RequestDecision {
            cancel: self.cancel,
            redirect: self.redirect.map(String::from),
        };
        (decision, self.external, self.action)
    }
}

pub struct NavigationInterceptor {
    ctx: Arc<SessionContext>,
    registry: Arc<WindowRegistry>,
    ops: Arc<NotebookOps>,
    pluto_dir: RwLock<Option<PathBuf>>,
}

impl NavigationInterceptor {
    pub fn new(ctx: Arc<SessionContext>, registry: Arc<WindowRegistry>, ops: Arc<NotebookOps>) -> Self {
        Self {
            ctx,
            registry,
            ops,
            pluto_dir: RwLock::new(None),
        }
    }

    /// Use the frontend pages of the Pluto package at `dir`.
    pub fn set_pluto_location(&self, dir: PathBuf) {
        *self.pluto_dir.write() = Some(dir);
    }

    pub fn pages(&self) -> Option<FrontendPages> {
        if let Some(local) = self.pluto_dir.read().as_deref().and_then(FrontendPages::local) {
            return Some(local);
        }
        self.ctx.session().map(|s| FrontendPages::hosted(&s))
    }

    pub fn on_before_request(&self, contents_id: &str, url: &Url) -> NavigationOutcome {
        let Some(window) = self.registry.by_contents_id(contents_id) else {
            return NavigationOutcome::pass();
        };
        if is_external(url) {
            debug!(window = %window.id(), "External link, handing to the browser");
            return NavigationOutcome::external(url.clone());
        }
        let Some(route) = FRONTEND_ROUTE_RE
            .captures(url.path())
            .and_then(|c| c.name("route"))
            .map(|m| m.as_str().to_string())
        else {
            return NavigationOutcome::pass();
        };

        debug!(route = %route, window = %window.id(), "Intercepted frontend route");
        match route.as_str() {
            "" => match self.pages() {
                Some(pages) => NavigationOutcome::redirect(pages.landing),
                None => {
                    warn!("Landing page requested before Pluto is ready");
                    NavigationOutcome::cancelled(None)
                }
            },
            "new" => NavigationOutcome::cancelled(Some(self.pending(window, OpenKind::New, None))),
            "open" => {
                let path = query_value(url, "path");
                NavigationOutcome::cancelled(Some(self.pending(window, OpenKind::Path, path)))
            }
            "edit" => match self.pages() {
                Some(pages) => NavigationOutcome::redirect(merge_query(pages.editor, url)),
                None => {
                    warn!("Editor requested before Pluto is ready");
                    NavigationOutcome::cancelled(None)
                }
            },
            "notebookupload" => match self.ctx.session().and_then(|s| upload_url(&s, url)) {
                Some(target) => NavigationOutcome::redirect(target),
                None => {
                    warn!("Notebook upload requested before Pluto is ready");
                    NavigationOutcome::cancelled(None)
                }
            },
            _ => NavigationOutcome::pass(),
        }
    }

    fn pending(&self, window: Arc<PlutoWindow>, kind: OpenKind, locator: Option<String>) -> PendingOpen {
        PendingOpen {
            ops: self.ops.clone(),
            window,
            kind,
            locator,
        }
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `target` with the request's query pairs appended, keeping any pair the
/// target already sets.
fn merge_query(mut target: Url, request: &Url) -> Url {
    let existing: Vec<String> = target.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let extra: Vec<(String, String)> = request
        .query_pairs()
        .filter(|(k, _)| !existing.iter().any(|e| e == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !extra.is_empty() {
        target.query_pairs_mut().extend_pairs(extra);
    }
    target
}

fn upload_url(session: &SessionInfo, request: &Url) -> Option<Url> {
    let mut target = session.base_url().join("notebookupload").ok()?;
    target.set_query(request.query());
    target.query_pairs_mut().append_pair("secret", session.secret());
    Some(target)
}
