//! Browser-driven login.
//!
//! [`AutoLogin`] opens the iconfont.cn login page and waits for the user to
//! finish logging in, then returns the session token. The browser and the
//! network are reached only through traits, so the flow can be exercised
//! with fakes:
//!
//! - [`BrowserAutomation`] / [`BrowserSession`]: scriptable browser
//! - [`UrlOpener`]: system default browser
//! - [`SessionProbe`]: unauthenticated request that may hand out a cookie
//!
//! Waiting is done by [`poll_until`], which runs on Tokio's clock.

mod browser;
mod chrome;
mod orchestrator;
pub mod poll;

use async_trait::async_trait;

use crate::iconfont::IconfontResult;

pub use browser::{BrowserAutomation, BrowserSession, SystemUrlOpener, UrlOpener};
pub use chrome::{CdpConnection, ChromeAutomation};
pub use orchestrator::{
    AutoLogin, LoginChannel, LoginSettings, LoginState, DEFAULT_FALLBACK_GRACE,
    DEFAULT_LOGIN_TIMEOUT, DEFAULT_POLL_INTERVAL, MAX_LOGIN_TIMEOUT,
};
pub use poll::{poll_until, PollOnce, PollSchedule, PollTimedOut};

/// Detects a session handed out by the service without a browser.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Makes one unauthenticated request and returns the session cookie
    /// value if the response set one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn probe_session_cookie(&self) -> IconfontResult<Option<String>>;
}
