//! Tool handlers exposed through the MCP server.

pub mod wordpress;

pub use wordpress::*;
