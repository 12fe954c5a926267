//! iconfont-mcp: MCP server for the iconfont.cn icon library
//!
//! This library lets AI assistants search and download icons from
//! [iconfont.cn](https://www.iconfont.cn), browse the projects of a
//! logged-in account, and obtain a session through a browser login.
//!
//! # Architecture
//!
//! - **Session**: the current token, seeded from `ICONFONT_TOKEN`
//! - **Detail cache**: project details kept for five minutes
//! - **Auto-login**: opens the login page and waits for the session cookie
//!
//! All three live in one [`ServiceContext`](iconfont::ServiceContext)
//! owned by the MCP server.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Configuration error types
//! - [`iconfont`]: API client, session, cache and service operations
//! - [`login`]: Browser-driven login
//! - [`mcp`]: MCP protocol implementation

pub mod config;
pub mod error;
pub mod iconfont;
pub mod login;
pub mod mcp;
