//! Span attribute names

pub const SERVICE_NAME: &str = "dbmeta";

pub const TOOL_NAME: &str = "dbmeta.tool.name";
pub const CLIENT_ID: &str = "dbmeta.client.id";
pub const CALL_OUTCOME: &str = "dbmeta.call.outcome";
