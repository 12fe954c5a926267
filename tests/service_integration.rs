//! Integration tests for the service layer.
//!
//! These tests drive [`ServiceContext`] and the MCP tool handlers against a
//! scripted in-memory iconfont.cn and a manually advanced clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use iconfont_mcp::iconfont::client::{ICON_INFO_PATH, MY_PROJECTS_PATH, PROJECT_DETAIL_PATH, SEARCH_PATH};
use iconfont_mcp::iconfont::{
    ApiRequest, ApiResponse, DetailSource, HttpTransport, IconType, IconfontError,
    IconfontResult, ManualClock, ServiceContext, SessionStatus, SessionStore,
};
use iconfont_mcp::mcp::server::{McpServer, ServerOptions};

// =============================================================================
// Fake iconfont.cn
// =============================================================================

/// Serves scripted responses per path and records every request.
#[derive(Default)]
struct FakeIconfont {
    routes: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeIconfont {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn respond(&self, path: &str, response: ApiResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeIconfont {
    async fn send(&self, request: ApiRequest) -> IconfontResult<ApiResponse> {
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);
        self.routes
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| IconfontError::transport(format!("no response scripted for {path}")))
    }
}

fn envelope(data: Value) -> ApiResponse {
    ApiResponse::ok(json!({ "code": 200, "data": data }).to_string())
}

fn project_detail(name: &str) -> ApiResponse {
    envelope(json!({
        "project": {
            "id": 42,
            "name": name,
            "description": "",
            "icon_count": 3,
            "font_family": "iconfont",
            "prefix": "icon-"
        },
        "icons": [
            { "id": 1, "name": "home", "font_class": "home", "unicode": "e601" },
            { "id": 2, "name": "Home filled", "font_class": "home-fill", "unicode": "e602" },
            { "id": 3, "name": "search", "font_class": "search", "unicode": "e603" }
        ]
    }))
}

fn context(fake: &Arc<FakeIconfont>, token: &str, clock: &Arc<ManualClock>) -> ServiceContext {
    ServiceContext::with_clock(fake.clone(), SessionStore::with_token(token), clock.clone())
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn set_token_reports_logged_in() {
    let mut session = SessionStore::new();
    assert_eq!(
        session.status(),
        SessionStatus {
            logged_in: false,
            has_token: false
        }
    );

    session.set_token("abc123");
    assert_eq!(
        session.status(),
        SessionStatus {
            logged_in: true,
            has_token: true
        }
    );
}

#[tokio::test]
async fn override_token_takes_precedence() {
    let fake = FakeIconfont::new();
    fake.respond(MY_PROJECTS_PATH, envelope(json!({ "ownProjects": [], "corpProjects": [] })));
    let ctx = context(&fake, "stored", &Arc::new(ManualClock::new(0)));

    assert_ok!(ctx.list_projects(Some("override")).await);

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].token.as_deref(), Some("override"));
}

#[tokio::test]
async fn list_projects_without_token_makes_no_request() {
    let fake = FakeIconfont::new();
    let ctx = context(&fake, "", &Arc::new(ManualClock::new(0)));

    let err = assert_err!(ctx.list_projects(None).await);
    assert!(matches!(err, IconfontError::AuthenticationRequired));

    // A blank override does not count either
    let err = assert_err!(ctx.list_projects(Some("   ")).await);
    assert!(matches!(err, IconfontError::AuthenticationRequired));

    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn list_projects_merges_own_and_corp() {
    let fake = FakeIconfont::new();
    fake.respond(
        MY_PROJECTS_PATH,
        envelope(json!({
            "ownProjects": [{ "id": 1, "name": "Mine" }],
            "corpProjects": [{ "id": "2", "name": "Team" }]
        })),
    );
    let ctx = context(&fake, "tok", &Arc::new(ManualClock::new(0)));

    let projects = assert_ok!(ctx.list_projects(None).await);
    let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Mine", "Team"]);
    assert_eq!(projects[0].id, "1");
}

// =============================================================================
// Project detail cache
// =============================================================================

#[tokio::test]
async fn detail_is_served_from_cache_while_fresh() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    let clock = Arc::new(ManualClock::new(0));
    let mut ctx = context(&fake, "tok", &clock);

    let (first, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Remote);
    assert_eq!(first.project.id, "42");

    clock.set(120_000);
    let (second, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Cache);
    assert_eq!(second, first);

    assert_eq!(fake.count(PROJECT_DETAIL_PATH), 1);
}

#[tokio::test]
async fn stale_detail_is_refetched_and_replaced() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Old"));
    fake.respond(PROJECT_DETAIL_PATH, project_detail("New"));
    let clock = Arc::new(ManualClock::new(0));
    let mut ctx = context(&fake, "tok", &clock);

    assert_ok!(ctx.project_detail("42", None, false).await);

    clock.set(400_000);
    let (detail, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Remote);
    assert_eq!(detail.project.name, "New");
    assert_eq!(fake.count(PROJECT_DETAIL_PATH), 2);

    let entry = ctx.cache().get("42").unwrap();
    assert_eq!(entry.captured_at_ms, 400_000);
    assert_eq!(entry.value.project.name, "New");
}

#[tokio::test]
async fn detail_exactly_max_age_is_stale() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Old"));
    fake.respond(PROJECT_DETAIL_PATH, project_detail("New"));
    let clock = Arc::new(ManualClock::new(1_000));
    let mut ctx = context(&fake, "tok", &clock);

    assert_ok!(ctx.project_detail("42", None, false).await);

    clock.advance(299_999);
    let (_, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Cache);

    clock.advance(1);
    let (_, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Remote);
}

#[tokio::test]
async fn force_refresh_bypasses_fresh_cache() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Old"));
    fake.respond(PROJECT_DETAIL_PATH, project_detail("New"));
    let clock = Arc::new(ManualClock::new(0));
    let mut ctx = context(&fake, "tok", &clock);

    assert_ok!(ctx.project_detail("42", None, false).await);

    clock.set(10_000);
    let (detail, source) = assert_ok!(ctx.project_detail("42", None, true).await);
    assert_eq!(source, DetailSource::Remote);
    assert_eq!(detail.project.name, "New");
    assert_eq!(ctx.cache().get("42").unwrap().captured_at_ms, 10_000);
}

#[tokio::test]
async fn rejected_token_leaves_cache_untouched() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    fake.respond(PROJECT_DETAIL_PATH, ApiResponse::status(401));
    let clock = Arc::new(ManualClock::new(0));
    let mut ctx = context(&fake, "tok", &clock);

    let (cached, _) = assert_ok!(ctx.project_detail("42", None, false).await);

    clock.set(400_000);
    let err = assert_err!(ctx.project_detail("42", None, false).await);
    assert!(matches!(err, IconfontError::AuthenticationFailed { status: 401 }));

    let entry = ctx.cache().get("42").unwrap();
    assert_eq!(entry.captured_at_ms, 0);
    assert_eq!(entry.value, cached);
    assert_eq!(ctx.cache().len(), 1);
}

#[tokio::test]
async fn rejected_token_on_empty_cache_caches_nothing() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, ApiResponse::status(401));
    let mut ctx = context(&fake, "tok", &Arc::new(ManualClock::new(0)));

    let err = assert_err!(ctx.project_detail("42", None, false).await);
    assert!(err.is_auth_error());
    assert!(ctx.cache().is_empty());
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    let mut ctx = context(&fake, "tok", &Arc::new(ManualClock::new(0)));

    assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(ctx.clear_cache(), 1);
    assert_eq!(ctx.clear_cache(), 0);

    let (_, source) = assert_ok!(ctx.project_detail("42", None, false).await);
    assert_eq!(source, DetailSource::Remote);
}

// =============================================================================
// Searching and downloading
// =============================================================================

#[tokio::test]
async fn search_project_icons_filters_and_paginates_cached_detail() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    let mut ctx = context(&fake, "tok", &Arc::new(ManualClock::new(0)));

    let page1 = assert_ok!(ctx.search_project_icons("42", "HOME", None, 1, 1).await);
    assert_eq!(page1.total, 2);
    assert_eq!(page1.icons.len(), 1);
    assert_eq!(page1.icons[0].name, "home");

    let page2 = assert_ok!(ctx.search_project_icons("42", "home", None, 2, 1).await);
    assert_eq!(page2.icons[0].font_class, "home-fill");

    let page3 = assert_ok!(ctx.search_project_icons("42", "home", None, 3, 1).await);
    assert!(page3.icons.is_empty());

    // All three searches were answered from one fetch
    assert_eq!(fake.count(PROJECT_DETAIL_PATH), 1);
}

#[tokio::test]
async fn search_icons_sends_form_parameters() {
    let fake = FakeIconfont::new();
    fake.respond(
        SEARCH_PATH,
        envelope(json!({
            "count": 1,
            "icons": [{ "id": 9, "name": "arrow", "font_class": "arrow", "unicode": "e609" }]
        })),
    );
    let ctx = context(&fake, "", &Arc::new(ManualClock::new(0)));

    let result = assert_ok!(ctx.search_icons(" arrow ", IconType::Line, 2, 10).await);
    assert_eq!(result.total, 1);
    assert_eq!(result.icons[0].id, "9");

    let request = &fake.requests()[0];
    assert_eq!(request.param_value("q"), Some("arrow"));
    assert_eq!(request.param_value("page"), Some("2"));
    assert_eq!(request.param_value("pageSize"), Some("10"));
    assert_eq!(request.token, None);

    assert_err!(ctx.search_icons("  ", IconType::All, 1, 10).await);
    assert_err!(ctx.search_icons("x", IconType::All, 0, 10).await);
    assert_err!(ctx.search_icons("x", IconType::All, 1, 101).await);
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn download_icon_writes_svg() {
    let fake = FakeIconfont::new();
    fake.respond(
        ICON_INFO_PATH,
        envelope(json!({ "id": 7, "name": "home", "show_svg": "<svg>home</svg>" })),
    );
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&fake, "", &Arc::new(ManualClock::new(0)));

    let download = assert_ok!(ctx.download_icon("7", Some(dir.path())).await);
    let path = download.path.unwrap();
    assert_eq!(path, dir.path().join("home.svg"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), "<svg>home</svg>");
    assert_eq!(fake.requests()[0].param_value("id"), Some("7"));
}

#[tokio::test]
async fn download_icon_without_svg_is_not_found() {
    let fake = FakeIconfont::new();
    fake.respond(ICON_INFO_PATH, envelope(json!({ "id": 7, "name": "home" })));
    let ctx = context(&fake, "", &Arc::new(ManualClock::new(0)));

    let err = assert_err!(ctx.download_icon("7", None).await);
    assert!(matches!(err, IconfontError::NotFound { .. }));
}

#[tokio::test]
async fn remote_error_envelope_is_reported() {
    let fake = FakeIconfont::new();
    fake.respond(
        ICON_INFO_PATH,
        ApiResponse::ok(r#"{"code":500,"message":"busy"}"#),
    );
    let ctx = context(&fake, "", &Arc::new(ManualClock::new(0)));

    let err = assert_err!(ctx.download_icon("7", None).await);
    assert!(matches!(err, IconfontError::Remote { code: 500, .. }));
    assert!(err.to_string().contains("busy"));
}

// =============================================================================
// Tool surface
// =============================================================================

fn server(fake: &Arc<FakeIconfont>, token: &str, options: ServerOptions) -> McpServer {
    let clock = Arc::new(ManualClock::new(0));
    McpServer::new(context(fake, token, &clock), options)
}

#[tokio::test]
async fn project_detail_tool_reports_cache_source() {
    let fake = FakeIconfont::new();
    fake.respond(PROJECT_DETAIL_PATH, project_detail("Demo"));
    let mut server = server(&fake, "tok", ServerOptions::default());

    let first = server
        .call_tool("get_project_detail", &json!({ "project_id": 42, "format": "json" }))
        .await;
    assert!(!first.is_error);
    let value: Value = serde_json::from_str(first.first_text().unwrap()).unwrap();
    assert_eq!(value["fromCache"], false);
    assert_eq!(value["project"]["name"], "Demo");

    let second = server
        .call_tool("get_project_detail", &json!({ "project_id": "42" }))
        .await;
    assert!(!second.is_error);
    assert!(second.first_text().unwrap().contains("Source: cache"));
}

#[tokio::test]
async fn download_tool_refuses_paths_outside_allowed_dirs() {
    let fake = FakeIconfont::new();
    let allowed = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let mut server = server(
        &fake,
        "",
        ServerOptions {
            allowed_paths: vec![allowed.path().to_path_buf()],
            ..ServerOptions::default()
        },
    );

    let result = server
        .call_tool(
            "download_icon",
            &json!({ "icon_id": "7", "save_path": outside.path().to_str().unwrap() }),
        )
        .await;
    assert!(result.is_error);
    assert!(result.first_text().unwrap().contains("Access denied"));
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn download_tool_writes_named_file() {
    let fake = FakeIconfont::new();
    fake.respond(
        ICON_INFO_PATH,
        envelope(json!({ "id": 7, "name": "home", "show_svg": "<svg/>" })),
    );
    let allowed = tempfile::tempdir().unwrap();
    let target = allowed.path().join("out").join("custom.svg");
    let mut server = server(
        &fake,
        "",
        ServerOptions {
            allowed_paths: vec![allowed.path().to_path_buf()],
            ..ServerOptions::default()
        },
    );

    let result = server
        .call_tool(
            "download_icon",
            &json!({ "icon_id": 7, "save_path": target.to_str().unwrap() }),
        )
        .await;
    assert!(!result.is_error, "{:?}", result.first_text());
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "<svg/>");
}

#[tokio::test]
async fn login_then_list_projects_tool() {
    let fake = FakeIconfont::new();
    fake.respond(
        MY_PROJECTS_PATH,
        envelope(json!({ "ownProjects": [{ "id": 1, "name": "Mine" }] })),
    );
    let mut server = server(&fake, "", ServerOptions::default());

    let result = server.call_tool("list_projects", &json!({})).await;
    assert!(result.is_error);
    assert!(fake.requests().is_empty());

    let result = server.call_tool("login", &json!({ "token": "abc123" })).await;
    assert!(!result.is_error);
    assert!(server.context().status().logged_in);

    let result = server.call_tool("list_projects", &json!({})).await;
    assert!(!result.is_error);
    assert!(result.first_text().unwrap().contains("| 1 | Mine |"));
    assert_eq!(fake.requests()[0].token.as_deref(), Some("abc123"));
}
