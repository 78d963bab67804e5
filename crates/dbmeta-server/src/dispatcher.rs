//! Tool dispatcher
//!
//! Runs every call through the same linear pipeline:
//! validate, rate-check, admit through the gate, assemble, audit, render.
//! Any failure short-circuits to the audit step and an error envelope.
//! Exactly one audit record is written per call, whatever the outcome.

use crate::tools::{
    GET_SCHEMA_OVERVIEW, GET_TABLE_METADATA, GET_TABLES_METADATA, LIST_TABLES, SCHEMA_NAME,
    TABLE_NAME, TABLE_NAMES,
};
use dbmeta_catalog::{
    CatalogError, CatalogSource, MetadataAssembler, MetadataError, SchemaOverview,
    TableDescriptor, TableMetadataEntry, TableSummary,
};
use dbmeta_core::{LimitsConfig, panic_message};
use dbmeta_guard::{
    ConcurrencyGate, IdentifierValidator, RateLimitExceeded, RateLimiter, ValidationError,
};
use dbmeta_telemetry::{AuditRecord, AuditSink, record_outcome, safe_serialize, tool_call_span};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

pub type JsonObject = serde_json::Map<String, Value>;

/// Why a call was rejected
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("processing error: {0}")]
    Processing(String),
}

impl ToolError {
    /// Stable audit label
    pub fn reason(&self) -> &'static str {
        match self {
            ToolError::Validation(_) | ToolError::UnknownTool(_) => "validation_failed",
            ToolError::RateLimited(_) => "rate_limit_exceeded",
            ToolError::Metadata(MetadataError::TableNotFound { .. }) => "not_found",
            ToolError::Metadata(MetadataError::Catalog(_)) => "db_error",
            ToolError::Processing(_) => "error",
        }
    }

    /// JSON error envelope returned to the client
    pub fn to_body(&self) -> String {
        let envelope = serde_json::json!({ "error": self.to_string() });
        serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string())
    }
}

impl From<CatalogError> for ToolError {
    fn from(err: CatalogError) -> Self {
        ToolError::Metadata(MetadataError::Catalog(err))
    }
}

/// Audit identity of one call
struct CallInfo<'a> {
    tool: &'a str,
    /// Raw argument, before trimming
    schema: Option<String>,
    table: Option<String>,
    client_id: Option<&'a str>,
}

impl<'a> CallInfo<'a> {
    fn new(tool: &'a str, args: &JsonObject, client_id: Option<&'a str>) -> Self {
        Self {
            tool,
            schema: raw_string(args, SCHEMA_NAME),
            table: None,
            client_id,
        }
    }

    fn with_table(mut self, args: &JsonObject) -> Self {
        self.table = raw_string(args, TABLE_NAME);
        self
    }

    fn record(&self, outcome: &Result<Option<usize>, ToolError>) -> AuditRecord {
        let record = match outcome {
            Ok(table_count) => {
                let record = AuditRecord::success(self.tool);
                match table_count {
                    Some(count) => record.with_table_count(*count),
                    None => record,
                }
            }
            Err(err) => AuditRecord::rejected(self.tool, err.reason()),
        };
        record
            .with_schema(self.schema.clone())
            .with_table(self.table.clone())
            .with_client_id(self.client_id.map(str::to_string))
    }
}

fn raw_string(args: &JsonObject, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Routes tool calls through validation, rate limiting and the
/// concurrency gate before assembling metadata
pub struct ToolDispatcher {
    validator: IdentifierValidator,
    limiter: Arc<RateLimiter>,
    gate: ConcurrencyGate,
    assembler: MetadataAssembler,
    audit: Arc<dyn AuditSink>,
}

impl ToolDispatcher {
    pub fn new(
        validator: IdentifierValidator,
        limiter: Arc<RateLimiter>,
        gate: ConcurrencyGate,
        assembler: MetadataAssembler,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            validator,
            limiter,
            gate,
            assembler,
            audit,
        }
    }

    /// Wire every guard from the configured limits
    pub fn from_config(
        limits: &LimitsConfig,
        source: Arc<dyn CatalogSource>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            IdentifierValidator::from_limits(limits),
            Arc::new(RateLimiter::new(limits.rate_limit_rpm)),
            ConcurrencyGate::new(limits.max_concurrent_requests),
            MetadataAssembler::new(source, limits.max_list_tables_result),
            audit,
        )
    }

    pub fn assembler(&self) -> &MetadataAssembler {
        &self.assembler
    }

    /// Route a named call. Unknown names are rejected like invalid input.
    pub async fn dispatch(&self, tool: &str, args: &JsonObject, client_id: Option<&str>) -> String {
        tracing::debug!(tool = %tool, args = %safe_serialize(args), "Dispatching tool call");

        match tool {
            LIST_TABLES => self.list_tables(args, client_id).await,
            GET_TABLE_METADATA => self.get_table_metadata(args, client_id).await,
            GET_TABLES_METADATA => self.get_tables_metadata(args, client_id).await,
            GET_SCHEMA_OVERVIEW => self.get_schema_overview(args, client_id).await,
            other => {
                let call = CallInfo::new(other, args, client_id);
                let unknown = async { Err::<(), _>(ToolError::UnknownTool(other.to_string())) };
                self.complete(call, unknown, |_| None).await
            }
        }
    }

    pub async fn list_tables(&self, args: &JsonObject, client_id: Option<&str>) -> String {
        let call = CallInfo::new(LIST_TABLES, args, client_id);
        self.complete(call, self.run_list_tables(args), |_| None).await
    }

    pub async fn get_table_metadata(&self, args: &JsonObject, client_id: Option<&str>) -> String {
        let call = CallInfo::new(GET_TABLE_METADATA, args, client_id).with_table(args);
        self.complete(call, self.run_get_table_metadata(args), |_| None)
            .await
    }

    pub async fn get_tables_metadata(&self, args: &JsonObject, client_id: Option<&str>) -> String {
        let call = CallInfo::new(GET_TABLES_METADATA, args, client_id);
        self.complete(call, self.run_get_tables_metadata(args), |entries| {
            Some(entries.len())
        })
        .await
    }

    pub async fn get_schema_overview(&self, args: &JsonObject, client_id: Option<&str>) -> String {
        let call = CallInfo::new(GET_SCHEMA_OVERVIEW, args, client_id);
        self.complete(call, self.run_get_schema_overview(args), |_| None)
            .await
    }

    async fn run_list_tables(&self, args: &JsonObject) -> Result<Vec<TableSummary>, ToolError> {
        let schema = self.validator.validate_schema(args.get(SCHEMA_NAME))?;
        self.guarded(self.assembler.list_tables(schema.as_deref())).await
    }

    async fn run_get_table_metadata(&self, args: &JsonObject) -> Result<TableDescriptor, ToolError> {
        let schema = self.validator.require_schema(args.get(SCHEMA_NAME))?;
        let table = self.validator.validate_table(args.get(TABLE_NAME))?;
        self.guarded(self.assembler.get_table_metadata(&schema, &table))
            .await
    }

    async fn run_get_tables_metadata(
        &self,
        args: &JsonObject,
    ) -> Result<Vec<TableMetadataEntry>, ToolError> {
        let schema = self.validator.require_schema(args.get(SCHEMA_NAME))?;
        let tables = self.validator.validate_table_list(args.get(TABLE_NAMES))?;
        let batch = async {
            Ok::<_, MetadataError>(self.assembler.get_tables_metadata(&schema, &tables).await)
        };
        self.guarded(batch).await
    }

    async fn run_get_schema_overview(&self, args: &JsonObject) -> Result<SchemaOverview, ToolError> {
        let schema = self.validator.require_schema(args.get(SCHEMA_NAME))?;
        self.guarded(self.assembler.get_schema_overview(&schema)).await
    }

    /// Rate-check, hold a gate slot for the whole assembly, and turn a
    /// panic inside it into a processing error. The permit is released on
    /// every exit path when it drops.
    async fn guarded<T, F>(&self, work: F) -> Result<T, ToolError>
    where
        F: Future<Output = Result<T, MetadataError>>,
    {
        self.limiter.check_and_consume()?;

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ToolError::Processing(e.to_string()))?;

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => Ok(result?),
            Err(payload) => {
                let cause = panic_message(payload.as_ref());
                tracing::error!(cause = %cause, "Metadata assembly panicked");
                Err(ToolError::Processing(cause))
            }
        }
    }

    /// Render the body and write the single audit record for a call
    async fn complete<T, F, C>(&self, call: CallInfo<'_>, work: F, count: C) -> String
    where
        T: Serialize,
        F: Future<Output = Result<T, ToolError>>,
        C: FnOnce(&T) -> Option<usize>,
    {
        let span = tool_call_span(call.tool, call.client_id);
        let result = work.instrument(span.clone()).await;

        span.in_scope(|| {
            let rendered = result.and_then(|value| {
                let table_count = count(&value);
                serde_json::to_string_pretty(&value)
                    .map(|body| (body, table_count))
                    .map_err(|e| ToolError::Processing(e.to_string()))
            });

            let (body, outcome) = match rendered {
                Ok((body, table_count)) => {
                    record_outcome(&span, "success");
                    tracing::info!(tool = %call.tool, "Tool call succeeded");
                    (body, Ok(table_count))
                }
                Err(err) => {
                    let reason = err.reason();
                    record_outcome(&span, reason);
                    match &err {
                        ToolError::Metadata(MetadataError::Catalog(_)) | ToolError::Processing(_) => {
                            tracing::warn!(tool = %call.tool, reason, error = %err, "Tool call failed")
                        }
                        _ => tracing::info!(tool = %call.tool, reason, error = %err, "Tool call rejected"),
                    }
                    (err.to_body(), Err(err))
                }
            };

            if let Err(e) = self.audit.record(&call.record(&outcome)) {
                tracing::warn!(tool = %call.tool, error = %e, "Failed to write audit record");
            }
            body
        })
    }
}
