//! Logging, spans and audit records for dbmeta
//!
//! This crate provides:
//! - Subscriber setup for `tracing` (text or JSON lines on stderr)
//! - Span helpers for tool calls
//! - Audit sinks that persist one record per tool call

pub mod attributes;
pub mod audit;
pub mod spans;
pub mod tracer;

pub use audit::{
    AuditRecord, AuditSink, AuditStatus, InMemoryAuditSink, JsonLineAuditSink, NoopAuditSink,
    sink_from_config,
};
pub use spans::{record_outcome, safe_serialize, tool_call_span};
pub use tracer::{env_filter, init_telemetry};
