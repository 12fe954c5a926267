//! iconfont.cn API client.
//!
//! Each method issues exactly one request and decodes the `{ code, data }`
//! envelope the service wraps every response in. Nothing here caches or
//! retries; see [`ServiceContext`](crate::iconfont::ServiceContext) for the
//! cache-aware operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::iconfont::cookie::extract_session_cookie;
use crate::iconfont::error::{IconfontError, IconfontResult};
use crate::iconfont::models::{Icon, IconType, Project, ProjectDetail, SearchResult};
use crate::iconfont::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::login::SessionProbe;

/// Default iconfont.cn origin.
pub const DEFAULT_BASE_URL: &str = "https://www.iconfont.cn";

/// Icon search endpoint (form POST).
pub const SEARCH_PATH: &str = "/api/icon/search.json";
/// Single icon endpoint.
pub const ICON_INFO_PATH: &str = "/api/icon/iconInfo.json";
/// Projects owned by or shared with the current account.
pub const MY_PROJECTS_PATH: &str = "/api/user/myprojects.json";
/// Project detail endpoint.
pub const PROJECT_DETAIL_PATH: &str = "/api/project/detail.json";
/// Login page opened by auto-login.
pub const LOGIN_PATH: &str = "/login";

/// Success code inside the response envelope.
const ENVELOPE_OK: i64 = 200;

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    icons: Vec<Icon>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyProjectsData {
    #[serde(default)]
    own_projects: Vec<Project>,
    #[serde(default)]
    corp_projects: Vec<Project>,
}

/// Decodes an API response, mapping failure statuses and error envelopes.
fn decode_data<T: DeserializeOwned>(response: &ApiResponse, what: &str) -> IconfontResult<T> {
    if !response.is_success() {
        return Err(IconfontError::from_status(response.status));
    }

    let envelope: Value = serde_json::from_str(&response.body)
        .map_err(|source| IconfontError::Decode { source })?;

    if let Some(code) = envelope.get("code").and_then(Value::as_i64) {
        if code != ENVELOPE_OK {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(match code {
                401 | 403 => IconfontError::AuthenticationFailed {
                    status: u16::try_from(code).unwrap_or(401),
                },
                404 => IconfontError::not_found(what),
                _ => IconfontError::Remote { code, message },
            });
        }
    }

    match envelope.get("data") {
        None | Some(Value::Null) => Err(IconfontError::not_found(what)),
        Some(data) => {
            T::deserialize(data).map_err(|source| IconfontError::Decode { source })
        }
    }
}

/// Thin client for the iconfont.cn JSON API.
#[derive(Clone)]
pub struct IconfontClient {
    transport: Arc<dyn HttpTransport>,
}

impl IconfontClient {
    /// Creates a client sending requests through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Searches the public icon catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn search_icons(
        &self,
        query: &str,
        icon_type: IconType,
        page: u32,
        page_size: u32,
        token: &str,
    ) -> IconfontResult<SearchResult> {
        let request = ApiRequest::post(SEARCH_PATH)
            .param("q", query)
            .param("sortType", "updated_at")
            .param("page", page)
            .param("pageSize", page_size)
            .param("fromCollection", -1)
            .param("fills", icon_type.as_param())
            .token(token);

        let response = self.transport.send(request).await?;
        let data: SearchData = decode_data(&response, &format!("icons matching '{query}'"))?;

        debug!(query = %query, total = data.count, returned = data.icons.len(), "Icon search complete");

        Ok(SearchResult {
            total: data.count,
            page,
            page_size,
            icons: data.icons,
        })
    }

    /// Fetches one icon, including its SVG markup.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::NotFound`] if the icon does not exist.
    pub async fn icon_detail(&self, icon_id: &str, token: &str) -> IconfontResult<Icon> {
        let request = ApiRequest::get(ICON_INFO_PATH)
            .param("id", icon_id)
            .token(token);

        let response = self.transport.send(request).await?;
        decode_data(&response, &format!("icon {icon_id}"))
    }

    /// Lists the projects owned by or shared with the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or the request fails.
    pub async fn list_projects(&self, token: &str) -> IconfontResult<Vec<Project>> {
        let request = ApiRequest::get(MY_PROJECTS_PATH)
            .param("page", 1)
            .param("isown_create", 3)
            .token(token);

        let response = self.transport.send(request).await?;
        let data: MyProjectsData = decode_data(&response, "project list")?;

        let mut projects = data.own_projects;
        projects.extend(data.corp_projects);
        Ok(projects)
    }

    /// Fetches a project and its icons.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::NotFound`] if the project does not exist.
    pub async fn project_detail(
        &self,
        project_id: &str,
        token: &str,
    ) -> IconfontResult<ProjectDetail> {
        let request = ApiRequest::get(PROJECT_DETAIL_PATH)
            .param("pid", project_id)
            .token(token);

        let response = self.transport.send(request).await?;
        decode_data(&response, &format!("project {project_id}"))
    }
}

#[async_trait]
impl SessionProbe for IconfontClient {
    /// Requests an account-scoped endpoint without credentials and looks for
    /// a session cookie handed out in the response.
    async fn probe_session_cookie(&self) -> IconfontResult<Option<String>> {
        let response = self
            .transport
            .send(ApiRequest::get(MY_PROJECTS_PATH))
            .await?;

        let token = extract_session_cookie(response.set_cookies.iter().map(String::as_str));
        if token.is_none() && !response.set_cookies.is_empty() {
            warn!(
                cookies = response.set_cookies.len(),
                "Probe response set cookies but none was the session cookie"
            );
        }
        Ok(token)
    }
}
