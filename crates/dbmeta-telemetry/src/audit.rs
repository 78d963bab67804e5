//! Audit records
//!
//! Every tool call produces exactly one [`AuditRecord`], written as a JSON
//! line by an [`AuditSink`]. Records carry identifiers and outcome only,
//! never metadata payloads or credentials.

use chrono::{DateTime, Utc};
use dbmeta_core::{AuditConfig, AuditFormat, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Timestamp layout of [`AuditRecord::ts`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Rejected,
}

/// One audited tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC, second precision
    pub ts: String,
    pub tool: String,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_count: Option<usize>,
    /// Stable rejection label, set only for rejected calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl AuditRecord {
    pub fn new(tool: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            ts: format_timestamp(Utc::now()),
            tool: tool.into(),
            status,
            schema: None,
            table: None,
            table_count: None,
            reason: None,
            client_id: None,
        }
    }

    pub fn success(tool: impl Into<String>) -> Self {
        Self::new(tool, AuditStatus::Success)
    }

    pub fn rejected(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(tool, AuditStatus::Rejected)
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_table(mut self, table: Option<String>) -> Self {
        self.table = table;
        self
    }

    pub fn with_table_count(mut self, count: usize) -> Self {
        self.table_count = Some(count);
        self
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Writes one JSON object per line to a file or stderr
pub struct JsonLineAuditSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLineAuditSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Append to `path`, creating the file and its parent directories
    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl AuditSink for JsonLineAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let line = record.to_json_line()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Discards everything; used when auditing is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory for inspection
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Build the sink described by the audit configuration
pub fn sink_from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        tracing::debug!("Audit logging disabled");
        return Ok(Arc::new(NoopAuditSink));
    }

    // JSON lines are the only encoding.
    let AuditFormat::Json = config.format;

    match &config.log_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Writing audit log to file");
            Ok(Arc::new(JsonLineAuditSink::file(path)?))
        }
        None => Ok(Arc::new(JsonLineAuditSink::stderr())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-09T07:05:01Z");
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let record = AuditRecord::success("list_tables");
        let value: serde_json::Value = serde_json::from_str(&record.to_json_line().unwrap()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(value["tool"], "list_tables");
        assert_eq!(value["status"], "success");
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_rejected_record_fields() {
        let record = AuditRecord::rejected("get_table_metadata", "not_found")
            .with_schema(Some("shop".to_string()))
            .with_table(Some("ghost".to_string()))
            .with_client_id(Some("inspector".to_string()));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], json!("rejected"));
        assert_eq!(value["reason"], json!("not_found"));
        assert_eq!(value["schema"], json!("shop"));
        assert_eq!(value["table"], json!("ghost"));
        assert_eq!(value["client_id"], json!("inspector"));
        assert!(value.get("table_count").is_none());
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let sink = JsonLineAuditSink::file(&path).unwrap();
        sink.record(&AuditRecord::success("list_tables")).unwrap();
        sink.record(&AuditRecord::success("get_tables_metadata").with_table_count(2))
            .unwrap();
        drop(sink);

        // Reopening appends rather than truncating.
        let sink = JsonLineAuditSink::file(&path).unwrap();
        sink.record(&AuditRecord::rejected("get_schema_overview", "validation_failed"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let records: Vec<AuditRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].table_count, Some(2));
        assert_eq!(records[2].status, AuditStatus::Rejected);
    }

    #[test]
    fn test_in_memory_sink() {
        let sink = InMemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(&AuditRecord::success("list_tables")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].tool, "list_tables");
    }

    #[test]
    fn test_sink_from_config() {
        let disabled = AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        };
        assert!(sink_from_config(&disabled).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let to_file = AuditConfig {
            log_path: Some(path.clone()),
            ..AuditConfig::default()
        };
        let sink = sink_from_config(&to_file).unwrap();
        sink.record(&AuditRecord::success("list_tables")).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"list_tables\""));
    }
}
