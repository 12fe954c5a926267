//! MCP server implementation for the iconfont.cn icon library.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! # Architecture
//!
//! Tool handlers are thin: they validate arguments, call into the
//! [`ServiceContext`] and render the structured result with
//! [`render`](crate::mcp::format::render).

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::iconfont::{
    IconType, IconfontError, ServiceContext, DEFAULT_BASE_URL, LOGIN_PATH, MAX_PAGE_SIZE,
};
use crate::login::{
    AutoLogin, BrowserAutomation, ChromeAutomation, LoginSettings, SystemUrlOpener, UrlOpener,
    MAX_LOGIN_TIMEOUT,
};
use crate::mcp::format::{
    render, CacheClearReport, OutputFormat, ProjectDetailReport, StatusReport,
};
use crate::mcp::protocol::{
    ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, OutgoingNotification, RequestId, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::mcp::transport::StdioTransport;

/// Default page size for the search tools.
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest `timeout_seconds` accepted by `auto_login`.
const MAX_LOGIN_TIMEOUT_SECS: u64 = MAX_LOGIN_TIMEOUT.as_secs();

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Request metadata attached by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Token to attach to progress notifications for this request.
    #[serde(default)]
    pub progress_token: Option<Value>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
    /// Optional request metadata.
    #[serde(rename = "_meta", default)]
    pub meta: Option<RequestMeta>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Creates an error result describing a failed iconfont operation.
    #[must_use]
    pub fn from_iconfont_error(error: &IconfontError) -> Self {
        if error.is_auth_error() {
            Self::error(format!(
                "Error: {error}. Use the login tool with a session token, or auto_login to log in through the browser."
            ))
        } else {
            Self::error(format!("Error: {error}"))
        }
    }

    /// Returns the text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|content| match content {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// Server-level settings taken from the configuration file.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Full URL of the iconfont.cn login page.
    pub login_url: String,
    /// Auto-login timing.
    pub login: LoginSettings,
    /// Directories icon downloads may be written into.
    pub allowed_paths: Vec<PathBuf>,
    /// Output format used when a call does not specify one.
    pub default_format: OutputFormat,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            login_url: format!("{DEFAULT_BASE_URL}{LOGIN_PATH}"),
            login: LoginSettings::default(),
            allowed_paths: Vec::new(),
            default_format: OutputFormat::default(),
        }
    }
}

/// The MCP server for the iconfont.cn icon library.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: StdioTransport,
    /// Session, cache and API client.
    context: ServiceContext,
    /// Server-level settings.
    options: ServerOptions,
    /// Scriptable browser used by `auto_login`.
    automation: Box<dyn BrowserAutomation>,
    /// System browser used when automation is unavailable.
    opener: Box<dyn UrlOpener>,
}

impl McpServer {
    /// Creates a new MCP server around `context`.
    ///
    /// Auto-login uses a Chrome found on the system and the system URL
    /// handler; see [`with_browser`](Self::with_browser) to replace them.
    #[must_use]
    pub fn new(context: ServiceContext, options: ServerOptions) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport: StdioTransport::new(),
            context,
            options,
            automation: Box::new(ChromeAutomation::new(None)),
            opener: Box::new(SystemUrlOpener),
        }
    }

    /// Replaces the browser capabilities used by `auto_login`.
    #[must_use]
    pub fn with_browser(
        mut self,
        automation: Box<dyn BrowserAutomation>,
        opener: Box<dyn UrlOpener>,
    ) -> Self {
        self.automation = automation;
        self.opener = opener;
        self
    }

    /// Replaces the stdio transport, for example with an in-memory pipe.
    #[must_use]
    pub fn with_transport(mut self, transport: StdioTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the service context.
    #[must_use]
    pub const fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Validates that a download destination is within an allowed path.
    ///
    /// With no allowed paths configured, only the current working
    /// directory is allowed. The destination need not exist yet; the
    /// nearest existing ancestor is resolved instead.
    ///
    /// Returns the resolved absolute path, or an error message.
    fn validate_path(&self, filepath: &str) -> Result<PathBuf, String> {
        let path = Path::new(filepath);

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!(
                "Invalid path '{}': '..' components are not allowed",
                path.display()
            ));
        }

        let cwd = std::env::current_dir()
            .map_err(|e| format!("Failed to resolve the working directory: {e}"))?;
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };

        // Resolve the nearest existing ancestor, then re-append the rest.
        let mut existing = absolute.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                return Err(format!("Invalid path '{}'", path.display()));
            };
            missing.push(name.to_os_string());
            existing = parent;
        }
        let mut canonical_path = existing
            .canonicalize()
            .map_err(|e| format!("Failed to resolve path '{}': {e}", path.display()))?;
        for name in missing.iter().rev() {
            canonical_path.push(name);
        }

        let allowed_paths = if self.options.allowed_paths.is_empty() {
            std::slice::from_ref(&cwd)
        } else {
            self.options.allowed_paths.as_slice()
        };

        for allowed in allowed_paths {
            let Ok(canonical_allowed) = allowed.canonicalize() else {
                continue;
            };

            if canonical_path.starts_with(&canonical_allowed) {
                return Ok(canonical_path);
            }
        }

        // Don't echo the configured directories back to the client
        Err("Access denied: path is outside the configured allowed directories".to_string())
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        if self.state == ServerState::ShuttingDown {
            return Ok(true);
        }

        Ok(false)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        use crate::mcp::protocol::parse_message;

        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                self.transport.write_error(&error).await?;
                Ok(())
            }
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                Ok(())
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.write_response(&resp).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        tracing::info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = %params.protocol_version,
            "Client initialising"
        );

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let tools = Self::get_tool_definitions();

        let result = json!({
            "tools": tools,
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &mut self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        if params.name == "auto_login" {
            if let Some(token) = params.meta.as_ref().and_then(|m| m.progress_token.as_ref()) {
                let notification = OutgoingNotification::progress(
                    token,
                    0,
                    None,
                    Some("Waiting for the iconfont.cn login to complete in the browser"),
                );
                if let Err(e) = self.transport.write_notification(&notification).await {
                    tracing::warn!(error = %e, "Failed to send progress notification");
                }
            }
        }

        let result = self.call_tool(&params.name, &params.arguments).await;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InternalError,
                    "Internal error: failed to serialise result",
                ),
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Runs one tool by name.
    ///
    /// Failures are reported inside the result (`is_error`), never as a
    /// protocol error.
    pub async fn call_tool(&mut self, name: &str, arguments: &Value) -> ToolCallResult {
        let format = match self.output_format(arguments) {
            Ok(format) => format,
            Err(message) => return ToolCallResult::error(message),
        };

        tracing::debug!(tool = %name, format = format.as_str(), "Tool call");

        match name {
            // Public catalogue
            "search_icons" => self.call_search_icons(arguments, format).await,
            "download_icon" => self.call_download_icon(arguments, format).await,
            // Account projects
            "list_projects" => self.call_list_projects(arguments, format).await,
            "get_project_detail" => self.call_get_project_detail(arguments, format).await,
            "search_project_icons" => self.call_search_project_icons(arguments, format).await,
            "clear_cache" => self.call_clear_cache(format),
            // Session
            "login" => self.call_login(arguments, format),
            "auto_login" => self.call_auto_login(arguments, format).await,
            "check_login" => self.call_check_login(format),
            // Unknown tool
            _ => ToolCallResult::error(format!("Unknown tool: {name}")),
        }
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    /// Reads the optional `format` argument.
    fn output_format(&self, arguments: &Value) -> Result<OutputFormat, String> {
        match arguments.get("format") {
            None | Some(Value::Null) => Ok(self.options.default_format),
            Some(Value::String(name)) => OutputFormat::parse(name).ok_or_else(|| {
                format!(
                    "Invalid format '{name}'. Must be one of: {}",
                    OutputFormat::NAMES.join(", ")
                )
            }),
            Some(_) => Err("Invalid format: expected a string".to_string()),
        }
    }

    /// Returns the list of available tools.
    #[allow(clippy::too_many_lines)]
    fn get_tool_definitions() -> Vec<ToolDefinition> {
        let format_schema = json!({
            "type": "string",
            "enum": OutputFormat::NAMES,
            "description": "Optional: output format (default from configuration, normally markdown)"
        });
        let token_schema = json!({
            "type": "string",
            "description": "Optional: session token for this call only (defaults to the stored token)"
        });

        vec![
            // === Public Catalogue ===
            ToolDefinition {
                name: "search_icons".to_string(),
                description: Some(
                    "Search the public iconfont.cn icon library by keyword. \
                     Returns matching icons with their IDs, names, font classes and unicode \
                     code points. Use download_icon with an ID to fetch the SVG."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search keyword"
                        },
                        "icon_type": {
                            "type": "string",
                            "enum": IconType::NAMES,
                            "description": "Optional: icon style filter (default: all)"
                        },
                        "page": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Optional: page number starting at 1 (default: 1)"
                        },
                        "page_size": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PAGE_SIZE,
                            "description": "Optional: icons per page (default: 20)"
                        },
                        "format": format_schema
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: "download_icon".to_string(),
                description: Some(
                    "Fetch an icon's SVG by ID. If save_path is given the SVG is also written \
                     to disk: a path ending in .svg is used as the file name, otherwise it is \
                     treated as a directory and the file is named after the icon. \
                     save_path must be inside the configured allowed directories."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "icon_id": {
                            "type": ["string", "integer"],
                            "description": "Icon ID from search results"
                        },
                        "save_path": {
                            "type": "string",
                            "description": "Optional: directory or .svg file to write"
                        },
                        "format": format_schema
                    },
                    "required": ["icon_id"]
                }),
            },
            // === Account Projects ===
            ToolDefinition {
                name: "list_projects".to_string(),
                description: Some(
                    "List the icon projects owned by or shared with the logged-in account. \
                     Requires a session (see login / auto_login)."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "token": token_schema,
                        "format": format_schema
                    }
                }),
            },
            ToolDefinition {
                name: "get_project_detail".to_string(),
                description: Some(
                    "Get a project's metadata and all of its icons. Results are cached for \
                     5 minutes; set force_refresh to bypass the cache. Requires a session."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "project_id": {
                            "type": ["string", "integer"],
                            "description": "Project ID from list_projects"
                        },
                        "token": token_schema,
                        "force_refresh": {
                            "type": "boolean",
                            "description": "Optional: fetch from iconfont.cn even if cached (default: false)"
                        },
                        "format": format_schema
                    },
                    "required": ["project_id"]
                }),
            },
            ToolDefinition {
                name: "search_project_icons".to_string(),
                description: Some(
                    "Search the icons of one project by name or font class \
                     (case-insensitive substring). Uses the cached project detail when fresh. \
                     Requires a session."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "project_id": {
                            "type": ["string", "integer"],
                            "description": "Project ID from list_projects"
                        },
                        "keyword": {
                            "type": "string",
                            "description": "Text to look for in icon names and font classes"
                        },
                        "token": token_schema,
                        "page": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Optional: page number starting at 1 (default: 1)"
                        },
                        "page_size": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PAGE_SIZE,
                            "description": "Optional: icons per page (default: 20)"
                        },
                        "format": format_schema
                    },
                    "required": ["project_id", "keyword"]
                }),
            },
            ToolDefinition {
                name: "clear_cache".to_string(),
                description: Some(
                    "Drop all cached project details so the next request fetches fresh data."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "format": format_schema
                    }
                }),
            },
            // === Session ===
            ToolDefinition {
                name: "login".to_string(),
                description: Some(
                    "Store a session token (the value of the EGG_SESS_ICONFONT cookie from a \
                     logged-in browser) for later calls."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "token": {
                            "type": "string",
                            "description": "Session cookie value"
                        },
                        "format": format_schema
                    },
                    "required": ["token"]
                }),
            },
            ToolDefinition {
                name: "auto_login".to_string(),
                description: Some(
                    "Open the iconfont.cn login page in a browser and wait for the user to log \
                     in, then store the session token. Uses Chrome when available and falls \
                     back to the system browser."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "timeout_seconds": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LOGIN_TIMEOUT_SECS,
                            "description": "Optional: how long to wait for the login (default: 120)"
                        },
                        "format": format_schema
                    }
                }),
            },
            ToolDefinition {
                name: "check_login".to_string(),
                description: Some("Report whether a session token is stored.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "format": format_schema
                    }
                }),
            },
        ]
    }

    /// Searches the public icon catalogue.
    async fn call_search_icons(&self, arguments: &Value, format: OutputFormat) -> ToolCallResult {
        let Some(query) = arguments.get("query").and_then(Value::as_str) else {
            return ToolCallResult::error("Missing required parameter: query");
        };

        let icon_type = match arguments.get("icon_type").and_then(Value::as_str) {
            None => IconType::default(),
            Some(name) => match IconType::parse(name) {
                Some(icon_type) => icon_type,
                None => {
                    return ToolCallResult::error(format!(
                        "Invalid icon_type '{name}'. Must be one of: {}",
                        IconType::NAMES.join(", ")
                    ))
                }
            },
        };

        let (page, page_size) = match paging(arguments) {
            Ok(paging) => paging,
            Err(e) => return ToolCallResult::error(e),
        };

        match self
            .context
            .search_icons(query, icon_type, page, page_size)
            .await
        {
            Ok(result) => ToolCallResult::text(render(&result, format)),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Fetches an icon's SVG, optionally saving it.
    async fn call_download_icon(&self, arguments: &Value, format: OutputFormat) -> ToolCallResult {
        let Some(icon_id) = id_argument(arguments, "icon_id") else {
            return ToolCallResult::error("Missing required parameter: icon_id");
        };

        let destination = match arguments.get("save_path").and_then(Value::as_str) {
            None => None,
            Some(save_path) if save_path.trim().is_empty() => None,
            Some(save_path) => match self.validate_path(save_path) {
                Ok(path) => Some(path),
                Err(e) => return ToolCallResult::error(e),
            },
        };

        match self
            .context
            .download_icon(&icon_id, destination.as_deref())
            .await
        {
            Ok(download) => ToolCallResult::text(render(&download, format)),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Lists the account's projects.
    async fn call_list_projects(&self, arguments: &Value, format: OutputFormat) -> ToolCallResult {
        let token = arguments.get("token").and_then(Value::as_str);

        match self.context.list_projects(token).await {
            Ok(projects) => ToolCallResult::text(render(&projects, format)),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Returns a project's detail, cache-aware.
    async fn call_get_project_detail(
        &mut self,
        arguments: &Value,
        format: OutputFormat,
    ) -> ToolCallResult {
        let Some(project_id) = id_argument(arguments, "project_id") else {
            return ToolCallResult::error("Missing required parameter: project_id");
        };
        let token = arguments.get("token").and_then(Value::as_str);
        let force_refresh = arguments
            .get("force_refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match self
            .context
            .project_detail(&project_id, token, force_refresh)
            .await
        {
            Ok((detail, source)) => {
                let report = ProjectDetailReport {
                    detail: &detail,
                    from_cache: source == crate::iconfont::DetailSource::Cache,
                };
                ToolCallResult::text(render(&report, format))
            }
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Searches within one project.
    async fn call_search_project_icons(
        &mut self,
        arguments: &Value,
        format: OutputFormat,
    ) -> ToolCallResult {
        let Some(project_id) = id_argument(arguments, "project_id") else {
            return ToolCallResult::error("Missing required parameter: project_id");
        };
        let Some(keyword) = arguments.get("keyword").and_then(Value::as_str) else {
            return ToolCallResult::error("Missing required parameter: keyword");
        };
        let token = arguments.get("token").and_then(Value::as_str);

        let (page, page_size) = match paging(arguments) {
            Ok(paging) => paging,
            Err(e) => return ToolCallResult::error(e),
        };

        match self
            .context
            .search_project_icons(&project_id, keyword, token, page, page_size)
            .await
        {
            Ok(result) => ToolCallResult::text(render(&result, format)),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Drops all cached project details.
    fn call_clear_cache(&mut self, format: OutputFormat) -> ToolCallResult {
        let dropped = self.context.clear_cache();
        ToolCallResult::text(render(&CacheClearReport { dropped }, format))
    }

    /// Stores a session token supplied by the user.
    fn call_login(&mut self, arguments: &Value, format: OutputFormat) -> ToolCallResult {
        let Some(token) = arguments.get("token").and_then(Value::as_str) else {
            return ToolCallResult::error("Missing required parameter: token");
        };

        match self.context.login(token) {
            Ok(status) => ToolCallResult::text(render(
                &StatusReport {
                    message: "Login successful: session token stored.",
                    status,
                },
                format,
            )),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Logs in through a browser and stores the received token.
    async fn call_auto_login(&mut self, arguments: &Value, format: OutputFormat) -> ToolCallResult {
        let mut settings = self.options.login;
        match arguments.get("timeout_seconds") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_u64() {
                Some(secs) if (1..=MAX_LOGIN_TIMEOUT_SECS).contains(&secs) => {
                    settings.timeout = std::time::Duration::from_secs(secs);
                }
                _ => {
                    return ToolCallResult::error(format!(
                        "Invalid timeout_seconds: must be an integer between 1 and {MAX_LOGIN_TIMEOUT_SECS}"
                    ))
                }
            },
        }

        let outcome = {
            let mut attempt = AutoLogin::new(
                self.automation.as_ref(),
                self.opener.as_ref(),
                self.context.client(),
                settings,
            );
            attempt.run(&self.options.login_url).await
        };

        let token = match outcome {
            Ok(token) => token,
            Err(e @ IconfontError::LoginTimedOut { .. }) => {
                return ToolCallResult::error(format!(
                    "{e}. Log in at {} and try again, or copy the EGG_SESS_ICONFONT cookie and use the login tool.",
                    self.options.login_url
                ))
            }
            Err(e) => return ToolCallResult::from_iconfont_error(&e),
        };

        match self.context.login(&token) {
            Ok(status) => ToolCallResult::text(render(
                &StatusReport {
                    message: "Auto-login successful: session token stored.",
                    status,
                },
                format,
            )),
            Err(e) => ToolCallResult::from_iconfont_error(&e),
        }
    }

    /// Reports the current login state.
    fn call_check_login(&self, format: OutputFormat) -> ToolCallResult {
        let status = self.context.status();
        let message = if status.logged_in {
            "Logged in."
        } else {
            "Not logged in. Use the login or auto_login tool."
        };
        ToolCallResult::text(render(&StatusReport { message, status }, format))
    }
}

/// Reads an ID argument given either as a string or a number.
fn id_argument(arguments: &Value, key: &str) -> Option<String> {
    match arguments.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an optional positive integer argument.
fn optional_u32(arguments: &Value, key: &str, default: u32) -> Result<u32, String> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("Invalid {key}: expected a non-negative integer")),
    }
}

/// Reads `page` and `page_size`.
fn paging(arguments: &Value) -> Result<(u32, u32), String> {
    let page = optional_u32(arguments, "page", 1)?;
    let page_size = optional_u32(arguments, "page_size", DEFAULT_PAGE_SIZE)?;
    Ok((page, page_size))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::iconfont::{ApiRequest, ApiResponse, HttpTransport, IconfontResult, SessionStore};

    /// Transport that fails every request.
    struct Offline;

    #[async_trait]
    impl HttpTransport for Offline {
        async fn send(&self, _request: ApiRequest) -> IconfontResult<ApiResponse> {
            Err(IconfontError::transport("offline"))
        }
    }

    fn server_with(options: ServerOptions) -> McpServer {
        let context = ServiceContext::new(Arc::new(Offline), SessionStore::new());
        McpServer::new(context, options)
    }

    fn server() -> McpServer {
        server_with(ServerOptions::default())
    }

    #[test]
    fn server_initial_state() {
        let server = server();
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(!server.context().status().logged_in);
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = McpServer::get_tool_definitions();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "search_icons",
                "download_icon",
                "list_projects",
                "get_project_detail",
                "search_project_icons",
                "clear_cache",
                "login",
                "auto_login",
                "check_login",
            ]
        );

        for tool in &tools {
            assert!(tool.input_schema.is_object());
            assert!(
                tool.input_schema["properties"]["format"].is_object(),
                "{} has no format property",
                tool.name
            );
        }
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.first_text(), Some("Hello, world!"));
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Something went wrong"),
        }
    }

    #[test]
    fn auth_errors_suggest_login() {
        let result = ToolCallResult::from_iconfont_error(&IconfontError::AuthenticationRequired);
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("auto_login"));

        let result = ToolCallResult::from_iconfont_error(&IconfontError::RequestTimedOut);
        assert!(!result.first_text().unwrap().contains("auto_login"));
    }

    #[test]
    fn tool_call_params_read_progress_token() {
        let params: ToolCallParams = serde_json::from_value(json!({
            "name": "auto_login",
            "arguments": {},
            "_meta": { "progressToken": "abc" }
        }))
        .unwrap();
        assert_eq!(
            params.meta.and_then(|m| m.progress_token),
            Some(json!("abc"))
        );
    }

    #[test]
    fn id_argument_accepts_strings_and_numbers() {
        let args = json!({ "a": "42", "b": 42, "c": "  ", "d": true });
        assert_eq!(id_argument(&args, "a").as_deref(), Some("42"));
        assert_eq!(id_argument(&args, "b").as_deref(), Some("42"));
        assert_eq!(id_argument(&args, "c"), None);
        assert_eq!(id_argument(&args, "d"), None);
        assert_eq!(id_argument(&args, "missing"), None);
    }

    #[test]
    fn paging_defaults_and_errors() {
        assert_eq!(paging(&json!({})), Ok((1, DEFAULT_PAGE_SIZE)));
        assert_eq!(paging(&json!({ "page": 3, "page_size": 50 })), Ok((3, 50)));
        assert!(paging(&json!({ "page": -1 })).is_err());
        assert!(paging(&json!({ "page_size": "ten" })).is_err());
    }

    #[test]
    fn validate_path_inside_allowed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(ServerOptions {
            allowed_paths: vec![dir.path().to_path_buf()],
            ..ServerOptions::default()
        });

        let target = dir.path().join("icons").join("home.svg");
        let resolved = server.validate_path(target.to_str().unwrap()).unwrap();
        assert!(resolved.ends_with("icons/home.svg"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn validate_path_rejects_outside_and_parent_components() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let server = server_with(ServerOptions {
            allowed_paths: vec![allowed.path().to_path_buf()],
            ..ServerOptions::default()
        });

        let err = server
            .validate_path(other.path().join("x.svg").to_str().unwrap())
            .unwrap_err();
        assert!(err.contains("Access denied"));

        let sneaky = format!("{}/../x.svg", allowed.path().display());
        let err = server.validate_path(&sneaky).unwrap_err();
        assert!(err.contains(".."));
    }

    #[tokio::test]
    async fn check_login_and_login_tools() {
        let mut server = server();

        let result = server.call_tool("check_login", &json!({})).await;
        assert!(!result.is_error);
        assert!(result.first_text().unwrap().contains("Not logged in"));

        let result = server.call_tool("login", &json!({ "token": "  " })).await;
        assert!(result.is_error);

        let result = server
            .call_tool("login", &json!({ "token": "tok", "format": "json" }))
            .await;
        assert!(!result.is_error);
        let value: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert_eq!(value["loggedIn"], true);
        assert!(!result.first_text().unwrap().contains("\"tok\""));
    }

    #[tokio::test]
    async fn invalid_format_is_rejected() {
        let mut server = server();
        let result = server
            .call_tool("check_login", &json!({ "format": "yaml" }))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("markdown, json"));
    }

    #[tokio::test]
    async fn account_tools_require_token() {
        let mut server = server();
        let result = server.call_tool("list_projects", &json!({})).await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("login"));
    }

    #[tokio::test]
    async fn transport_errors_become_tool_errors() {
        let mut server = server();
        let result = server
            .call_tool("search_icons", &json!({ "query": "home" }))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn unknown_tool() {
        let mut server = server();
        let result = server.call_tool("no_such_tool", &json!({})).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("Unknown tool: no_such_tool"));
    }

    #[tokio::test]
    async fn clear_cache_reports_count() {
        let mut server = server();
        let result = server.call_tool("clear_cache", &json!({})).await;
        assert!(!result.is_error);
        assert!(result.first_text().unwrap().contains("Cleared 0"));
    }

    #[tokio::test]
    async fn auto_login_rejects_bad_timeout() {
        let mut server = server();
        let result = server
            .call_tool("auto_login", &json!({ "timeout_seconds": 0 }))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("timeout_seconds"));
    }
}
