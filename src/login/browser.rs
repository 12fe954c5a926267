//! Browser capabilities used by the auto-login flow.
//!
//! Two capabilities are abstracted so the orchestrator can be tested
//! without a real browser:
//!
//! - [`BrowserAutomation`]: launches a browser whose cookie jar can be read
//!   ([`ChromeAutomation`](super::ChromeAutomation) in production)
//! - [`UrlOpener`]: hands a URL to the operating system's default browser
//!   ([`SystemUrlOpener`] in production)

use async_trait::async_trait;

use crate::iconfont::IconfontResult;

/// Launches a scriptable browser.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Opens a visible browser window at `url` and waits for the page to
    /// settle.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::AutomationUnavailable`](crate::iconfont::IconfontError::AutomationUnavailable)
    /// when no browser can be launched or controlled.
    async fn launch(&self, url: &str) -> IconfontResult<Box<dyn BrowserSession>>;
}

/// A running, scriptable browser.
#[async_trait]
pub trait BrowserSession: Send {
    /// Reads the cookie jar and returns the value of cookie `name`, if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot be queried.
    async fn cookie(&mut self, name: &str) -> IconfontResult<Option<String>>;

    /// Closes the browser. Calling this again is a no-op.
    async fn close(&mut self);

    /// Returns `true` until [`close`](Self::close) has run.
    fn is_running(&self) -> bool;
}

/// Opens a URL in the user's default browser.
pub trait UrlOpener: Send + Sync {
    /// Hands `url` to the system URL handler.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler could be invoked.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// [`UrlOpener`] backed by the `open` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that_detached(url)
    }
}
