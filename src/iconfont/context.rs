//! Process-wide service state and the operations the tools call.
//!
//! A single [`ServiceContext`] is built by `main` and owned by the MCP
//! server. It holds the session token, the project detail cache and the
//! API client; every tool handler goes through it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::iconfont::cache::{Clock, DetailCache, SystemClock};
use crate::iconfont::client::IconfontClient;
use crate::iconfont::error::{IconfontError, IconfontResult};
use crate::iconfont::models::{
    IconDownload, IconType, Project, ProjectDetail, ProjectSearchResult, SearchResult,
};
use crate::iconfont::session::{SessionStatus, SessionStore};
use crate::iconfont::transport::HttpTransport;

/// Largest page size accepted by the search tools.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Whether a project detail came from the cache or the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailSource {
    /// Served from a fresh cache entry.
    Cache,
    /// Fetched from iconfont.cn (and cached).
    Remote,
}

/// Session, cache and client for one server process.
pub struct ServiceContext {
    session: SessionStore,
    cache: DetailCache<ProjectDetail>,
    client: IconfontClient,
}

impl ServiceContext {
    /// Creates a context with the wall clock.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, session: SessionStore) -> Self {
        Self::with_clock(transport, session, Arc::new(SystemClock))
    }

    /// Creates a context whose cache reads time from `clock`.
    #[must_use]
    pub fn with_clock(
        transport: Arc<dyn HttpTransport>,
        session: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            cache: DetailCache::with_clock(clock),
            client: IconfontClient::new(transport),
        }
    }

    /// Returns the session store.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Returns the API client.
    #[must_use]
    pub const fn client(&self) -> &IconfontClient {
        &self.client
    }

    /// Returns the project detail cache.
    #[must_use]
    pub const fn cache(&self) -> &DetailCache<ProjectDetail> {
        &self.cache
    }

    /// Stores a session token and returns the new status.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::ValidationFailed`] for a blank token.
    pub fn login(&mut self, token: &str) -> IconfontResult<SessionStatus> {
        if token.trim().is_empty() {
            return Err(IconfontError::validation("token must not be empty"));
        }
        self.session.set_token(token);
        info!("Session token updated");
        Ok(self.session.status())
    }

    /// Returns the current login state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Drops every cached project detail.
    pub fn clear_cache(&mut self) -> usize {
        let dropped = self.cache.invalidate_all();
        debug!(dropped, "Project detail cache cleared");
        dropped
    }

    /// Resolves the token for an authenticated call.
    fn require_token(&self, override_token: Option<&str>) -> IconfontResult<String> {
        let token = self.session.effective_token(override_token);
        if token.is_empty() {
            return Err(IconfontError::AuthenticationRequired);
        }
        Ok(token.to_string())
    }

    /// Searches the public icon catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty query, an out-of-range page, or a
    /// failed request.
    pub async fn search_icons(
        &self,
        query: &str,
        icon_type: IconType,
        page: u32,
        page_size: u32,
    ) -> IconfontResult<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IconfontError::validation("query must not be empty"));
        }
        validate_paging(page, page_size)?;

        self.client
            .search_icons(query, icon_type, page, page_size, self.session.token())
            .await
    }

    /// Fetches an icon's SVG and optionally writes it to disk.
    ///
    /// `destination` is either a directory (the file is named after the
    /// icon) or a path ending in `.svg`. The caller is responsible for
    /// checking the destination is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the icon is missing, has no SVG, or the write
    /// fails.
    pub async fn download_icon(
        &self,
        icon_id: &str,
        destination: Option<&Path>,
    ) -> IconfontResult<IconDownload> {
        let icon_id = icon_id.trim();
        if icon_id.is_empty() {
            return Err(IconfontError::validation("icon_id must not be empty"));
        }

        let icon = self.client.icon_detail(icon_id, self.session.token()).await?;
        if icon.show_svg.trim().is_empty() {
            return Err(IconfontError::not_found(format!("SVG for icon {icon_id}")));
        }

        let path = match destination {
            Some(dest) => Some(write_svg(dest, &icon.id, &icon.name, &icon.show_svg).await?),
            None => None,
        };

        Ok(IconDownload {
            icon_id: icon.id,
            name: icon.name,
            svg: icon.show_svg,
            path,
        })
    }

    /// Lists the account's projects.
    ///
    /// # Errors
    ///
    /// Returns [`IconfontError::AuthenticationRequired`] before any request
    /// is made if there is no token.
    pub async fn list_projects(&self, override_token: Option<&str>) -> IconfontResult<Vec<Project>> {
        let token = self.require_token(override_token)?;
        self.client.list_projects(&token).await
    }

    /// Returns a project's detail, served from cache while fresh.
    ///
    /// `force_refresh` always goes to the network. A failed fetch leaves
    /// any existing cache entry untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no token or the fetch fails.
    pub async fn project_detail(
        &mut self,
        project_id: &str,
        override_token: Option<&str>,
        force_refresh: bool,
    ) -> IconfontResult<(ProjectDetail, DetailSource)> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(IconfontError::validation("project_id must not be empty"));
        }
        let token = self.require_token(override_token)?;

        if !force_refresh {
            if let Some(entry) = self.cache.get_fresh(project_id) {
                debug!(
                    project_id = %project_id,
                    age_ms = entry.age_ms(self.cache.now_millis()),
                    "Project detail served from cache"
                );
                return Ok((entry.value.clone(), DetailSource::Cache));
            }
        }

        let detail = self.client.project_detail(project_id, &token).await?;
        self.cache.put(project_id, detail.clone());
        debug!(project_id = %project_id, icons = detail.icons.len(), force_refresh, "Project detail fetched");

        Ok((detail, DetailSource::Remote))
    }

    /// Searches the icons of one project by name or font class.
    ///
    /// Uses the cached project detail when it is fresh.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paging, a missing token, or a failed
    /// detail fetch.
    pub async fn search_project_icons(
        &mut self,
        project_id: &str,
        keyword: &str,
        override_token: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> IconfontResult<ProjectSearchResult> {
        validate_paging(page, page_size)?;
        let (detail, _) = self.project_detail(project_id, override_token, false).await?;

        let matches = detail.matching_icons(keyword);
        let start = (page as usize - 1).saturating_mul(page_size as usize);
        let icons = matches
            .iter()
            .skip(start)
            .take(page_size as usize)
            .map(|icon| (*icon).clone())
            .collect();

        Ok(ProjectSearchResult {
            project_id: detail.project.id.clone(),
            project_name: detail.project.name.clone(),
            keyword: keyword.trim().to_string(),
            total: matches.len() as u64,
            page,
            page_size,
            icons,
        })
    }
}

fn validate_paging(page: u32, page_size: u32) -> IconfontResult<()> {
    if page == 0 {
        return Err(IconfontError::validation("page must be 1 or greater"));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(IconfontError::validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Turns an icon name into a safe file stem.
fn file_stem(icon_id: &str, name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        format!("icon_{icon_id}")
    } else {
        stem.to_string()
    }
}

async fn write_svg(dest: &Path, icon_id: &str, name: &str, svg: &str) -> IconfontResult<PathBuf> {
    let is_svg_file = dest
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));

    let path = if is_svg_file {
        dest.to_path_buf()
    } else {
        dest.join(format!("{}.svg", file_stem(icon_id, name)))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| IconfontError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(&path, svg)
        .await
        .map_err(|source| IconfontError::Io {
            path: path.clone(),
            source,
        })?;

    info!(path = %path.display(), "Icon SVG written");
    Ok(path)
}
