//! Scriptable login browser driven over the Chrome DevTools Protocol.
//!
//! A Chromium-family browser is started visibly with a throwaway profile and
//! `--remote-debugging-port=0`. The browser writes the port it picked to
//! `DevToolsActivePort` in the profile directory; we connect to the
//! browser-level WebSocket from there, attach to the page, navigate to the
//! login page and read cookies with `Storage.getCookies`.
//!
//! Any failure before the login page is showing is reported as
//! [`IconfontError::AutomationUnavailable`] so the caller can fall back to
//! the system browser.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::iconfont::{IconfontError, IconfontResult};
use crate::login::browser::{BrowserAutomation, BrowserSession};

/// How long to wait for the browser to publish its DevTools endpoint.
const DEVTOOLS_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// How long to wait for the login page to reach network idle.
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for `Browser.close` before the process is killed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events kept while waiting for a command reply.
const MAX_BUFFERED_EVENTS: usize = 256;

/// Executable names searched on `PATH`.
const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "microsoft-edge",
    "msedge",
];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(windows)]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", windows)))]
const INSTALL_PATHS: &[&str] = &[];

fn unavailable(reason: impl Into<String>) -> IconfontError {
    IconfontError::automation_unavailable(reason)
}

/// Launches Chrome, Chromium or Edge for interactive login.
#[derive(Debug, Clone, Default)]
pub struct ChromeAutomation {
    executable: Option<PathBuf>,
}

impl ChromeAutomation {
    /// Creates a launcher. With `executable` unset, common install
    /// locations and `PATH` are searched.
    #[must_use]
    pub const fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    /// Returns the browser executable to launch, if one can be found.
    #[must_use]
    pub fn find_executable(&self) -> Option<PathBuf> {
        if let Some(configured) = &self.executable {
            return configured.exists().then(|| configured.clone());
        }

        EXECUTABLE_NAMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .or_else(|| {
                INSTALL_PATHS
                    .iter()
                    .map(PathBuf::from)
                    .find(|path| path.exists())
            })
    }
}

#[async_trait]
impl BrowserAutomation for ChromeAutomation {
    async fn launch(&self, url: &str) -> IconfontResult<Box<dyn BrowserSession>> {
        let executable = self
            .find_executable()
            .ok_or_else(|| unavailable("no Chrome, Chromium or Edge executable found"))?;

        let profile = tempfile::Builder::new()
            .prefix("iconfont-mcp-login-")
            .tempdir()
            .map_err(|e| unavailable(format!("failed to create browser profile: {e}")))?;

        info!(browser = %executable.display(), "Launching login browser");

        let mut child = Command::new(&executable)
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .args([
                "--remote-debugging-port=0",
                "--no-first-run",
                "--no-default-browser-check",
                "about:blank",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(format!("failed to start {}: {e}", executable.display())))?;

        let ws_url = wait_for_devtools_url(profile.path(), &mut child).await?;
        debug!(endpoint = %ws_url, "DevTools endpoint ready");

        let mut connection = CdpConnection::connect(&ws_url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let session_id = open_login_page(&mut connection, url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let idle = connection
            .wait_for_event(
                |event| {
                    event.get("method").and_then(Value::as_str) == Some("Page.lifecycleEvent")
                        && event.get("sessionId").and_then(Value::as_str) == Some(session_id.as_str())
                        && event.pointer("/params/name").and_then(Value::as_str)
                            == Some("networkIdle")
                },
                NETWORK_IDLE_TIMEOUT,
            )
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if idle.is_none() {
            warn!("Login page did not reach network idle; continuing anyway");
        }

        Ok(Box::new(ChromeSession {
            connection: Some(connection),
            child: Some(child),
            profile: Some(profile),
        }))
    }
}

/// Extracts the browser WebSocket URL from `DevToolsActivePort` contents.
fn parse_devtools_port(contents: &str) -> Option<String> {
    let mut lines = contents.lines();
    let port: u16 = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim();
    path.starts_with('/')
        .then(|| format!("ws://127.0.0.1:{port}{path}"))
}

async fn wait_for_devtools_url(profile: &Path, child: &mut Child) -> IconfontResult<String> {
    let port_file = profile.join("DevToolsActivePort");
    let deadline = Instant::now() + DEVTOOLS_READY_TIMEOUT;

    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
            if let Some(url) = parse_devtools_port(&contents) {
                return Ok(url);
            }
        }

        if let Ok(Some(status)) = child.try_wait() {
            return Err(unavailable(format!("browser exited during startup ({status})")));
        }
        if Instant::now() >= deadline {
            return Err(unavailable("browser did not expose a DevTools endpoint"));
        }
        sleep(Duration::from_millis(100)).await;
    }
}

/// Attaches to a page target and navigates it to `url`.
///
/// Returns the CDP session id of the page.
async fn open_login_page(connection: &mut CdpConnection, url: &str) -> IconfontResult<String> {
    let targets = connection.call("Target.getTargets", json!({}), None).await?;
    let existing = targets
        .get("targetInfos")
        .and_then(Value::as_array)
        .and_then(|infos| {
            infos
                .iter()
                .find(|info| info.get("type").and_then(Value::as_str) == Some("page"))
        })
        .and_then(|info| info.get("targetId").and_then(Value::as_str))
        .map(str::to_string);

    let target_id = match existing {
        Some(id) => id,
        None => connection
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?
            .get("targetId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IconfontError::transport("Target.createTarget returned no targetId"))?,
    };

    let session_id = connection
        .call(
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
            None,
        )
        .await?
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| IconfontError::transport("Target.attachToTarget returned no sessionId"))?;

    connection
        .call("Page.enable", json!({}), Some(&session_id))
        .await?;
    connection
        .call(
            "Page.setLifecycleEventsEnabled",
            json!({ "enabled": true }),
            Some(&session_id),
        )
        .await?;
    connection
        .call("Page.navigate", json!({ "url": url }), Some(&session_id))
        .await?;

    Ok(session_id)
}

/// A running login browser.
struct ChromeSession {
    connection: Option<CdpConnection>,
    child: Option<Child>,
    profile: Option<TempDir>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn cookie(&mut self, name: &str) -> IconfontResult<Option<String>> {
        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                self.child = None;
                self.connection = None;
                return Err(IconfontError::transport(format!(
                    "login browser was closed ({status})"
                )));
            }
        }
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| IconfontError::transport("login browser is closed"))?;

        let result = connection
            .call("Storage.getCookies", json!({}), None)
            .await?;

        Ok(result
            .get("cookies")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|cookie| cookie.get("name").and_then(Value::as_str) == Some(name))
            .filter_map(|cookie| cookie.get("value").and_then(Value::as_str))
            .find(|value| !value.is_empty())
            .map(str::to_string))
    }

    async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = timeout(
                CLOSE_TIMEOUT,
                connection.call("Browser.close", json!({}), None),
            )
            .await;
        }

        if let Some(mut child) = self.child.take() {
            if timeout(CLOSE_TIMEOUT, child.wait()).await.is_err() {
                warn!("Login browser did not exit; killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill login browser");
                }
            }
            debug!("Login browser closed");
        }

        if let Some(profile) = self.profile.take() {
            if let Err(e) = profile.close() {
                debug!(error = %e, "Failed to remove browser profile directory");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.child.is_some() || self.connection.is_some()
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A browser-level DevTools WebSocket connection.
///
/// Commands are sent one at a time; events that arrive while waiting for a
/// reply are buffered for [`wait_for_event`](Self::wait_for_event).
pub struct CdpConnection {
    ws: WsStream,
    next_id: u64,
    events: VecDeque<Value>,
}

impl CdpConnection {
    /// Connects to a DevTools WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> IconfontResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| IconfontError::transport(format!("DevTools connection failed: {e}")))?;

        Ok(Self {
            ws,
            next_id: 0,
            events: VecDeque::new(),
        })
    }

    /// Sends a command and returns its `result`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection drops or the browser reports a
    /// protocol error.
    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> IconfontResult<Value> {
        self.next_id += 1;
        let id = self.next_id;

        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            message["sessionId"] = Value::from(session_id);
        }

        self.ws
            .send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| IconfontError::transport(format!("DevTools send failed: {e}")))?;

        loop {
            let reply = self.read_message().await?;

            if reply.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(error) = reply.get("error") {
                    let detail = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    return Err(IconfontError::transport(format!("{method} failed: {detail}")));
                }
                return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
            }

            if reply.get("method").is_some() && self.events.len() < MAX_BUFFERED_EVENTS {
                self.events.push_back(reply);
            }
        }
    }

    /// Waits up to `within` for an event satisfying `matches`.
    ///
    /// Buffered events are checked first. Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection drops.
    pub async fn wait_for_event<F>(
        &mut self,
        matches: F,
        within: Duration,
    ) -> IconfontResult<Option<Value>>
    where
        F: Fn(&Value) -> bool + Send,
    {
        if let Some(index) = self.events.iter().position(&matches) {
            return Ok(self.events.remove(index));
        }

        let deadline = Instant::now() + within;
        loop {
            match timeout_at(deadline, self.read_message()).await {
                Err(_) => return Ok(None),
                Ok(message) => {
                    let message = message?;
                    if matches(&message) {
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    async fn read_message(&mut self) -> IconfontResult<Value> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map_err(|source| IconfontError::Decode { source });
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(IconfontError::transport("DevTools connection closed"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(IconfontError::transport(format!("DevTools receive failed: {e}")));
                }
            }
        }
    }
}
