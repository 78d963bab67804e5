//! dbmeta: read-only MySQL schema metadata for MCP clients
//!
//! Facade over the workspace crates, used by the workspace-level tests.

pub use dbmeta_catalog as catalog;
pub use dbmeta_core as core;
pub use dbmeta_guard as guard;
pub use dbmeta_server as server;
pub use dbmeta_telemetry as telemetry;
