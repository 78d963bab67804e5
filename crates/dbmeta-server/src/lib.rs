//! Read-only MySQL schema metadata served over MCP
//!
//! The [`ToolDispatcher`] owns the call pipeline; [`MetadataServer`] adapts
//! it to MCP, and [`http::create_router`] mounts it behind axum.

pub mod dispatcher;
pub mod http;
pub mod mcp;
pub mod tools;

// Re-exports
pub use dispatcher::{JsonObject, ToolDispatcher, ToolError};
pub use http::{create_router, serve};
pub use mcp::{MetadataServer, mcp_tools};
pub use tools::{ToolDefinition, ToolSchema, tool_definitions};
