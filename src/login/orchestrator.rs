//! Interactive auto-login.
//!
//! ```text
//! Idle ──▶ Launching ──▶ WaitingForToken ──┬──▶ Succeeded
//!                                          ├──▶ TimedOut
//!                                          └──▶ Failed
//! ```
//!
//! Launching first tries the scriptable browser. If that is unavailable
//! the login page is handed to the system browser instead, and the token is
//! detected by probing the API for a session cookie rather than reading the
//! browser's cookie jar.
//!
//! The scriptable browser, when one was launched, is closed on every exit
//! path before [`AutoLogin::run`] returns. If the user closes it before
//! logging in, the attempt ends as [`LoginState::Failed`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::iconfont::{IconfontError, IconfontResult, SESSION_COOKIE_NAME};
use crate::login::browser::{BrowserAutomation, BrowserSession, UrlOpener};
use crate::login::poll::{poll_until, PollOnce, PollSchedule};
use crate::login::SessionProbe;

/// Default overall login timeout: 2 minutes.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest overall login timeout accepted: 10 minutes.
pub const MAX_LOGIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Default interval between cookie checks: 3 seconds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default wait before the first probe on the fallback path: 5 seconds.
pub const DEFAULT_FALLBACK_GRACE: Duration = Duration::from_secs(5);

/// Timing of an auto-login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSettings {
    /// Overall budget for receiving a token.
    pub timeout: Duration,
    /// Wait between cookie checks.
    pub poll_interval: Duration,
    /// Wait before the first probe when the system browser is used.
    pub fallback_grace: Duration,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOGIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_grace: DEFAULT_FALLBACK_GRACE,
        }
    }
}

/// Progress of an auto-login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Not started.
    Idle,
    /// Opening a browser at the login page.
    Launching,
    /// Waiting for the user to finish logging in.
    WaitingForToken,
    /// A session token was received.
    Succeeded,
    /// No token arrived before the timeout.
    TimedOut,
    /// The attempt failed for another reason.
    Failed,
}

/// How the login page was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginChannel {
    /// Scriptable browser; cookies read directly.
    Scriptable,
    /// System default browser; cookies detected by probing the API.
    SystemBrowser,
}

/// Reads the session cookie from a scriptable browser.
///
/// Read failures are absorbed while the browser is still running. Once it
/// has exited the failure ends the wait.
struct CookieJarPoll<'a> {
    browser: &'a mut dyn BrowserSession,
}

#[async_trait]
impl<'a> PollOnce for CookieJarPoll<'a> {
    type Output = IconfontResult<String>;

    async fn poll_once(&mut self) -> Option<IconfontResult<String>> {
        match self.browser.cookie(SESSION_COOKIE_NAME).await {
            Ok(token) => token.map(Ok),
            Err(e) if !self.browser.is_running() => Some(Err(e)),
            Err(e) => {
                debug!(error = %e, "Cookie jar check failed");
                None
            }
        }
    }
}

/// Probes the API for a session cookie.
struct ProbePoll<'a> {
    probe: &'a dyn SessionProbe,
}

#[async_trait]
impl<'a> PollOnce for ProbePoll<'a> {
    type Output = String;

    async fn poll_once(&mut self) -> Option<String> {
        match self.probe.probe_session_cookie().await {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "Session probe failed");
                None
            }
        }
    }
}

/// One auto-login attempt.
pub struct AutoLogin<'a> {
    automation: &'a dyn BrowserAutomation,
    opener: &'a dyn UrlOpener,
    probe: &'a dyn SessionProbe,
    settings: LoginSettings,
    state: LoginState,
    channel: Option<LoginChannel>,
}

impl<'a> AutoLogin<'a> {
    /// Creates an attempt using the given capabilities.
    #[must_use]
    pub fn new(
        automation: &'a dyn BrowserAutomation,
        opener: &'a dyn UrlOpener,
        probe: &'a dyn SessionProbe,
        settings: LoginSettings,
    ) -> Self {
        Self {
            automation,
            opener,
            probe,
            settings,
            state: LoginState::Idle,
            channel: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> LoginState {
        self.state
    }

    /// Returns how the login page was opened, once launched.
    #[must_use]
    pub const fn channel(&self) -> Option<LoginChannel> {
        self.channel
    }

    fn transition(&mut self, next: LoginState) {
        debug!(from = ?self.state, to = ?next, "Auto-login state change");
        self.state = next;
    }

    /// Opens `login_url` and waits for a session token.
    ///
    /// The caller stores the returned token.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::LoginTimedOut`] if no token arrives in time,
    /// [`IconfontError::Transport`] if the scriptable browser exits first,
    /// or [`IconfontError::ValidationFailed`] if this attempt already ran.
    /// A rejected rerun leaves [`state`](Self::state) at the first outcome.
    pub async fn run(&mut self, login_url: &str) -> IconfontResult<String> {
        if self.state != LoginState::Idle {
            return Err(IconfontError::validation("auto-login attempt already used"));
        }

        self.transition(LoginState::Launching);
        let browser = match self.automation.launch(login_url).await {
            Ok(browser) => {
                info!("Login page opened in scriptable browser");
                Some(browser)
            }
            Err(e) => {
                warn!(error = %e, "Browser automation unavailable; falling back to system browser");
                if let Err(e) = self.opener.open(login_url) {
                    warn!(error = %e, url = %login_url, "Could not open system browser; open the URL manually");
                } else {
                    info!(url = %login_url, "Login page opened in system browser");
                }
                None
            }
        };

        self.transition(LoginState::WaitingForToken);
        let result = match browser {
            Some(mut browser) => {
                self.channel = Some(LoginChannel::Scriptable);
                let schedule = PollSchedule {
                    initial_delay: Duration::ZERO,
                    interval: self.settings.poll_interval,
                    timeout: self.settings.timeout,
                };
                let result = poll_until(
                    &schedule,
                    &mut CookieJarPoll {
                        browser: browser.as_mut(),
                    },
                )
                .await;
                browser.close().await;
                match result {
                    Ok(Err(e)) => {
                        self.transition(LoginState::Failed);
                        warn!(error = %e, "Login browser exited before a token arrived");
                        return Err(e);
                    }
                    Ok(Ok(token)) => Ok(token),
                    Err(timed_out) => Err(timed_out),
                }
            }
            None => {
                self.channel = Some(LoginChannel::SystemBrowser);
                let schedule = PollSchedule {
                    initial_delay: self.settings.fallback_grace,
                    interval: self.settings.poll_interval,
                    timeout: self.settings.timeout,
                };
                poll_until(&schedule, &mut ProbePoll { probe: self.probe }).await
            }
        };

        match result {
            Ok(token) => {
                self.transition(LoginState::Succeeded);
                info!(channel = ?self.channel, "Auto-login received a session token");
                Ok(token)
            }
            Err(timed_out) => {
                self.transition(LoginState::TimedOut);
                warn!(attempts = timed_out.attempts, "Auto-login timed out");
                Err(IconfontError::LoginTimedOut {
                    timeout_ms: u64::try_from(self.settings.timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            }
        }
    }
}
