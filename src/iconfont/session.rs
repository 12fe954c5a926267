//! In-memory session token store.
//!
//! The store holds at most one iconfont.cn session token for the lifetime of
//! the process. It is never written to disk. Whether the token is still
//! accepted by the service is only discovered by the next API call.

use serde::Serialize;
use tracing::debug;

/// Environment variable that seeds the initial session token.
pub const TOKEN_ENV_VAR: &str = "ICONFONT_TOKEN";

/// Snapshot of the login state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Whether a session is considered active.
    pub logged_in: bool,
    /// Whether a token is stored.
    pub has_token: bool,
}

/// Holds the current session token.
///
/// "Logged in" is derived from the token being non-empty; there is no
/// separate flag that could drift out of sync.
#[derive(Default)]
pub struct SessionStore {
    token: String,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            token: String::new(),
        }
    }

    /// Creates a store seeded with `token` (blank input leaves it empty).
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        let mut store = Self::new();
        store.set_token(token);
        store
    }

    /// Creates a store seeded from [`TOKEN_ENV_VAR`] if it is set.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(TOKEN_ENV_VAR).map_or_else(
            |_| Self::new(),
            |token| {
                debug!(var = TOKEN_ENV_VAR, "Seeding session token from environment");
                Self::with_token(&token)
            },
        )
    }

    /// Replaces the stored token unconditionally.
    pub fn set_token(&mut self, token: &str) {
        token.trim().clone_into(&mut self.token);
    }

    /// Returns the stored token, or an empty string.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Resolves the token for a call: a non-empty override always wins.
    #[must_use]
    pub fn effective_token<'a>(&'a self, override_token: Option<&'a str>) -> &'a str {
        match override_token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => &self.token,
        }
    }

    /// Returns the current login state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let present = !self.token.is_empty();
        SessionStatus {
            logged_in: present,
            has_token: present,
        }
    }
}

// Manual Debug implementation to avoid exposing the token
impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("token", &if self.token.is_empty() { "" } else { "[REDACTED]" })
            .finish()
    }
}
