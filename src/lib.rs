//! # wordpress-mcp-rs
//!
//! MCP server that publishes articles to several WordPress sites through the
//! REST API, with optional AI-generated featured images.
//!
//! The assistant client talks JSON-RPC 2.0 over stdio (or TCP); every tool
//! call is routed through [`handlers::WordPressHandler`] to the
//! [`publish::Publisher`], which drives the [`wordpress::WordPressClient`] and
//! the [`image::ImageGenerator`].

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handlers;
pub mod image;
pub mod logging;
pub mod mcp;
pub mod publish;
pub mod registry;
pub mod wordpress;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use handlers::WordPressHandler;
pub use mcp::McpServer;
pub use publish::{ImageOutcome, PostRequest, PublishResult, Publisher};
pub use registry::{Site, SiteRegistry};
