//! HTTP transport used by the API client.
//!
//! [`HttpTransport`] is the seam between the iconfont.cn client and the
//! network. [`ReqwestTransport`] is the production implementation; tests
//! substitute a scripted fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use tracing::debug;

use crate::iconfont::cookie::cookie_header;
use crate::iconfont::error::{IconfontError, IconfontResult};

/// Default per-request timeout: 30 seconds.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CLIENT_USER_AGENT: &str = concat!("iconfont-mcp/", env!("CARGO_PKG_VERSION"));

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET` with parameters in the query string.
    Get,
    /// `POST` with parameters form-encoded in the body.
    Post,
}

/// A request to the iconfont.cn API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, starting with `/`.
    pub path: String,
    /// Query (GET) or form (POST) parameters.
    pub params: Vec<(String, String)>,
    /// Session token to send as a cookie.
    pub token: Option<String>,
}

impl ApiRequest {
    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            token: None,
        }
    }

    /// Creates a form POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Attaches a session token; blank tokens are not sent.
    #[must_use]
    pub fn token(mut self, token: &str) -> Self {
        self.token = (!token.is_empty()).then(|| token.to_string());
        self
    }

    /// Returns the value of parameter `key`, if present.
    #[must_use]
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw response from the iconfont.cn API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Every `Set-Cookie` header value, in order.
    pub set_cookies: Vec<String>,
    /// Response body.
    pub body: String,
}

impl ApiResponse {
    /// Creates a 200 response with a body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            set_cookies: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates a response with only a status.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            set_cookies: Vec::new(),
            body: String::new(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends requests to the iconfont.cn API.
///
/// Implementations return every HTTP status as a response; only
/// connection-level failures are errors. Timeouts must surface as
/// [`IconfontError::RequestTimedOut`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns the raw response.
    async fn send(&self, request: ApiRequest) -> IconfontResult<ApiResponse>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend
    /// initialisation failure).
    pub fn new(base_url: &str, timeout: Duration) -> IconfontResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IconfontError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_reqwest_error(e: reqwest::Error) -> IconfontError {
    if e.is_timeout() {
        IconfontError::RequestTimedOut
    } else {
        // Drop the URL so query parameters never reach error messages
        IconfontError::transport(e.without_url().to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> IconfontResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = ?request.method, path = %request.path, authenticated = request.token.is_some(), "Sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url).query(&request.params),
            Method::Post => self.client.post(&url).form(&request.params),
        };
        builder = builder.header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(token) = &request.token {
            builder = builder.header(COOKIE, cookie_header(token));
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(status, bytes = body.len(), "Received response");

        Ok(ApiResponse {
            status,
            set_cookies,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the raw request text.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    #[test]
    fn request_builder() {
        let req = ApiRequest::post("/api/icon/search.json")
            .param("q", "home")
            .param("page", 2)
            .token("");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.param_value("q"), Some("home"));
        assert_eq!(req.param_value("page"), Some("2"));
        assert!(req.token.is_none());
    }

    #[tokio::test]
    async fn sends_cookie_and_collects_set_cookie() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: application/json\r\n\
             Set-Cookie: ctoken=abc; path=/\r\n\
             Set-Cookie: EGG_SESS_ICONFONT=fresh; path=/; httponly\r\n\
             Content-Length: 12\r\n\
             Connection: close\r\n\r\n\
             {\"code\":200}",
        )
        .await;

        let transport = ReqwestTransport::new(&base, DEFAULT_REQUEST_TIMEOUT).unwrap();
        let response = transport
            .send(ApiRequest::get("/api/user/myprojects.json").param("page", 1).token("tok"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"code\":200}");
        assert_eq!(response.set_cookies.len(), 2);
        assert!(response.set_cookies[1].starts_with("EGG_SESS_ICONFONT=fresh"));

        let raw_request = server.await.unwrap();
        assert!(raw_request.starts_with("GET /api/user/myprojects.json?page=1 "));
        assert!(raw_request
            .to_lowercase()
            .contains("cookie: egg_sess_iconfont=tok"));
    }

    #[tokio::test]
    async fn returns_error_statuses_as_responses() {
        let (base, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = ReqwestTransport::new(&base, DEFAULT_REQUEST_TIMEOUT).unwrap();
        let response = transport
            .send(ApiRequest::get("/api/user/myprojects.json"))
            .await
            .unwrap();
        assert_eq!(response.status, 401);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn timeout_maps_to_request_timed_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never answer
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport =
            ReqwestTransport::new(&format!("http://{addr}"), Duration::from_millis(100)).unwrap();
        let err = transport
            .send(ApiRequest::get("/slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, IconfontError::RequestTimedOut));
    }
}
