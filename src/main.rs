//! iconfont-mcp: MCP server for the iconfont.cn icon library
//!
//! Exposes icon search, SVG download, account projects and browser login as
//! MCP tools over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use iconfont_mcp::config;
use iconfont_mcp::iconfont::{ReqwestTransport, ServiceContext, SessionStore, LOGIN_PATH};
use iconfont_mcp::login::{ChromeAutomation, SystemUrlOpener};
use iconfont_mcp::mcp::format::OutputFormat;
use iconfont_mcp::mcp::server::{McpServer, ServerOptions};

/// MCP server for the iconfont.cn icon library.
///
/// Provides icon search, SVG download, project browsing and login tools
/// to AI assistants.
#[derive(Parser, Debug)]
#[command(name = "iconfont-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the iconfont-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting iconfont-mcp server"
    );

    let base_url = cfg.api.base_url.trim_end_matches('/').to_string();
    let transport = match ReqwestTransport::new(&base_url, cfg.api.timeout()) {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let session = SessionStore::from_env();
    info!(
        logged_in = session.status().logged_in,
        base_url = %base_url,
        "Session initialised"
    );

    let context = ServiceContext::new(Arc::new(transport), session);
    let options = ServerOptions {
        login_url: format!("{base_url}{LOGIN_PATH}"),
        login: cfg.login.settings(),
        allowed_paths: cfg.download.allowed_paths,
        // Validated by load_config
        default_format: OutputFormat::parse(&cfg.output.default_format).unwrap_or_default(),
    };

    info!(
        allowed_paths = ?options.allowed_paths,
        "Allowed download paths configured"
    );

    // Create MCP server
    let mut server = McpServer::new(context, options).with_browser(
        Box::new(ChromeAutomation::new(cfg.login.browser_executable)),
        Box::new(SystemUrlOpener),
    );

    info!("MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(server.run());

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
