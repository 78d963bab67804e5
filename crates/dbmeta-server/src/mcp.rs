//! MCP server handler exposing the metadata tools

use crate::dispatcher::ToolDispatcher;
use crate::tools::tool_definitions;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use std::sync::Arc;

const INSTRUCTIONS: &str = "Read-only access to MySQL schema metadata. Use list_tables to \
    discover tables, get_table_metadata or get_tables_metadata for DDL-level detail, and \
    get_schema_overview for the relationships within a schema.";

/// Tool descriptors in MCP form
pub fn mcp_tools() -> Vec<Tool> {
    tool_definitions()
        .into_iter()
        .map(|def| Tool::new(def.name, def.description, Arc::new(def.input_schema)))
        .collect()
}

/// MCP-facing wrapper around the shared [`ToolDispatcher`]
#[derive(Clone)]
pub struct MetadataServer {
    dispatcher: Arc<ToolDispatcher>,
}

impl MetadataServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }
}

impl ServerHandler for MetadataServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(mcp_tools()))
    }

    /// Every outcome, rejections included, is a successful MCP result whose
    /// text is either the metadata or an `{"error": ...}` envelope.
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client_id = context
            .peer
            .peer_info()
            .map(|info| info.client_info.name.clone());
        let args = request.arguments.unwrap_or_default();

        let body = self
            .dispatcher
            .dispatch(&request.name, &args, client_id.as_deref())
            .await;
        Ok(CallToolResult::success(vec![Content::text(body)]))
    }
}
