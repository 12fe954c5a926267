//! iconfont.cn service layer.
//!
//! This module provides everything between the MCP tools and the network:
//!
//! - [`SessionStore`]: the current session token
//! - [`DetailCache`]: time-bounded cache of project details
//! - [`IconfontClient`]: one request per call against the JSON API
//! - [`ServiceContext`]: owns the three above and implements the tool
//!   operations (credential resolution, cache policy, SVG downloads)
//!
//! # Credential Resolution
//!
//! Every authenticated operation resolves its token as: explicit per-call
//! override if non-empty, otherwise the stored session token. Operations
//! that need a token fail with [`IconfontError::AuthenticationRequired`]
//! before touching the network when neither is available.

pub mod cache;
pub mod client;
pub mod context;
pub mod cookie;
mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use cache::{CacheEntry, Clock, DetailCache, ManualClock, SystemClock, DETAIL_CACHE_MAX_AGE_MS};
pub use client::{IconfontClient, DEFAULT_BASE_URL, LOGIN_PATH};
pub use context::{DetailSource, ServiceContext, MAX_PAGE_SIZE};
pub use cookie::SESSION_COOKIE_NAME;
pub use error::{IconfontError, IconfontResult};
pub use models::{
    Icon, IconDownload, IconType, Project, ProjectDetail, ProjectSearchResult, SearchResult,
};
pub use session::{SessionStatus, SessionStore, TOKEN_ENV_VAR};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};
