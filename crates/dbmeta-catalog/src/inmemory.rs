//! In-memory catalog
//!
//! A [`CatalogSource`] backed by plain maps. It answers the same questions as
//! the MySQL catalog with the same filters and orderings, and can be told to
//! fail, stall or panic so callers can exercise their error paths.

use crate::error::{CatalogError, CatalogResult};
use crate::source::{
    CatalogSession, CatalogSource, CheckConstraintRow, ColumnRow, ForeignKeyColumnRow,
    IndexColumnRow, KeyColumnRow, KeyConstraintType, RelationshipRow, TableRow, TableScope,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type TableKey = (String, String);

fn key(schema: &str, table: &str) -> TableKey {
    (schema.to_string(), table.to_string())
}

#[derive(Debug, Clone)]
struct StoredTable {
    row: TableRow,
    is_view: bool,
    columns: Vec<ColumnRow>,
    key_columns: Vec<KeyColumnRow>,
    index_columns: Vec<IndexColumnRow>,
    foreign_key_columns: Vec<ForeignKeyColumnRow>,
    check_constraints: Vec<CheckConstraintRow>,
}

impl StoredTable {
    fn new(schema: &str, name: &str, comment: &str, is_view: bool) -> Self {
        let (engine, collation, row_format) = if is_view {
            (None, None, None)
        } else {
            (
                Some("InnoDB".to_string()),
                Some("utf8mb4_0900_ai_ci".to_string()),
                Some("Dynamic".to_string()),
            )
        };
        Self {
            row: TableRow {
                schema: schema.to_string(),
                table_name: name.to_string(),
                table_comment: comment.to_string(),
                engine,
                table_collation: collation,
                row_format,
            },
            is_view,
            columns: Vec::new(),
            key_columns: Vec::new(),
            index_columns: Vec::new(),
            foreign_key_columns: Vec::new(),
            check_constraints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogData {
    tables: BTreeMap<TableKey, StoredTable>,
    no_check_constraints_view: bool,
    failing_check_constraints_detection: bool,
    failing_check_constraints: bool,
    case_insensitive_names: bool,
    failing_connections: bool,
    failing_tables: HashMap<TableKey, CatalogError>,
    panicking_tables: HashSet<TableKey>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: Arc<CatalogData>,
    counters: Arc<SessionCounters>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn data_mut(&mut self) -> &mut CatalogData {
        Arc::make_mut(&mut self.data)
    }

    /// Stored table, created as a base table when missing
    fn table_mut(&mut self, schema: &str, table: &str) -> &mut StoredTable {
        self.data_mut()
            .tables
            .entry(key(schema, table))
            .or_insert_with(|| StoredTable::new(schema, table, "", false))
    }

    /// Add a base table with InnoDB defaults
    pub fn with_table(mut self, schema: &str, table: &str, comment: &str) -> Self {
        self.data_mut()
            .tables
            .insert(key(schema, table), StoredTable::new(schema, table, comment, false));
        self
    }

    /// Override the storage attributes of a table
    pub fn with_table_attributes(
        mut self,
        schema: &str,
        table: &str,
        engine: Option<&str>,
        collation: Option<&str>,
        row_format: Option<&str>,
    ) -> Self {
        let stored = self.table_mut(schema, table);
        stored.row.engine = engine.map(str::to_string);
        stored.row.table_collation = collation.map(str::to_string);
        stored.row.row_format = row_format.map(str::to_string);
        self
    }

    /// Add a view; views never appear in any listing
    pub fn with_view(mut self, schema: &str, name: &str) -> Self {
        self.data_mut()
            .tables
            .insert(key(schema, name), StoredTable::new(schema, name, "VIEW", true));
        self
    }

    pub fn with_column(
        mut self,
        schema: &str,
        table: &str,
        name: &str,
        column_type: &str,
        nullable: bool,
    ) -> Self {
        self.table_mut(schema, table).columns.push(ColumnRow {
            column_name: name.to_string(),
            column_type: column_type.to_string(),
            is_nullable: if nullable { "YES" } else { "NO" }.to_string(),
            column_default: None,
            extra: String::new(),
            column_comment: String::new(),
        });
        self
    }

    pub fn with_column_row(mut self, schema: &str, table: &str, row: ColumnRow) -> Self {
        self.table_mut(schema, table).columns.push(row);
        self
    }

    /// Primary key plus its backing `PRIMARY` index
    pub fn with_primary_key(mut self, schema: &str, table: &str, columns: &[&str]) -> Self {
        let stored = self.table_mut(schema, table);
        for (position, column) in columns.iter().enumerate() {
            let position = position as i64 + 1;
            stored.key_columns.push(KeyColumnRow {
                constraint_name: "PRIMARY".to_string(),
                constraint_type: KeyConstraintType::PrimaryKey,
                column_name: column.to_string(),
                ordinal_position: position,
            });
            stored.index_columns.push(IndexColumnRow {
                index_name: "PRIMARY".to_string(),
                column_name: column.to_string(),
                seq_in_index: position,
                non_unique: false,
            });
        }
        self
    }

    /// Unique constraint plus its backing index of the same name
    pub fn with_unique_key(mut self, schema: &str, table: &str, name: &str, columns: &[&str]) -> Self {
        let stored = self.table_mut(schema, table);
        for (position, column) in columns.iter().enumerate() {
            let position = position as i64 + 1;
            stored.key_columns.push(KeyColumnRow {
                constraint_name: name.to_string(),
                constraint_type: KeyConstraintType::Unique,
                column_name: column.to_string(),
                ordinal_position: position,
            });
            stored.index_columns.push(IndexColumnRow {
                index_name: name.to_string(),
                column_name: column.to_string(),
                seq_in_index: position,
                non_unique: false,
            });
        }
        self
    }

    /// Raw key-column row, stored in the order given
    pub fn with_key_column(mut self, schema: &str, table: &str, row: KeyColumnRow) -> Self {
        self.table_mut(schema, table).key_columns.push(row);
        self
    }

    /// Non-unique secondary index
    pub fn with_index(mut self, schema: &str, table: &str, name: &str, columns: &[&str]) -> Self {
        let stored = self.table_mut(schema, table);
        for (position, column) in columns.iter().enumerate() {
            stored.index_columns.push(IndexColumnRow {
                index_name: name.to_string(),
                column_name: column.to_string(),
                seq_in_index: position as i64 + 1,
                non_unique: true,
            });
        }
        self
    }

    /// Raw index-column row, stored in the order given
    pub fn with_index_column(mut self, schema: &str, table: &str, row: IndexColumnRow) -> Self {
        self.table_mut(schema, table).index_columns.push(row);
        self
    }

    /// Foreign key with `RESTRICT` rules
    #[allow(clippy::too_many_arguments)]
    pub fn with_foreign_key(
        mut self,
        schema: &str,
        table: &str,
        name: &str,
        columns: &[&str],
        referenced_schema: &str,
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        let stored = self.table_mut(schema, table);
        for (position, (column, referenced)) in columns.iter().zip(referenced_columns).enumerate() {
            stored.foreign_key_columns.push(ForeignKeyColumnRow {
                constraint_name: name.to_string(),
                column_name: column.to_string(),
                ordinal_position: position as i64 + 1,
                referenced_schema: referenced_schema.to_string(),
                referenced_table: referenced_table.to_string(),
                referenced_column: referenced.to_string(),
                update_rule: "RESTRICT".to_string(),
                delete_rule: "RESTRICT".to_string(),
            });
        }
        self
    }

    /// Raw foreign-key row, stored in the order given
    pub fn with_foreign_key_column(mut self, schema: &str, table: &str, row: ForeignKeyColumnRow) -> Self {
        self.table_mut(schema, table).foreign_key_columns.push(row);
        self
    }

    pub fn with_check_constraint(mut self, schema: &str, table: &str, name: &str, clause: &str) -> Self {
        self.table_mut(schema, table).check_constraints.push(CheckConstraintRow {
            constraint_name: name.to_string(),
            check_clause: clause.to_string(),
        });
        self
    }

    /// Behave like a server predating the CHECK_CONSTRAINTS view
    pub fn without_check_constraints_view(mut self) -> Self {
        self.data_mut().no_check_constraints_view = true;
        self
    }

    /// Detecting whether the CHECK_CONSTRAINTS view exists fails
    pub fn failing_check_constraints_detection(mut self) -> Self {
        self.data_mut().failing_check_constraints_detection = true;
        self
    }

    /// Match schema and table names ignoring ASCII case, like a server
    /// running with `lower_case_table_names` set
    pub fn case_insensitive_names(mut self) -> Self {
        self.data_mut().case_insensitive_names = true;
        self
    }

    /// The CHECK_CONSTRAINTS view exists but querying it fails
    pub fn failing_check_constraints(mut self) -> Self {
        self.data_mut().failing_check_constraints = true;
        self
    }

    /// Every `open` fails with a connection error
    pub fn failing_connections(mut self) -> Self {
        self.data_mut().failing_connections = true;
        self
    }

    /// Column queries for this table fail with `error`
    pub fn failing_table(mut self, schema: &str, table: &str, error: CatalogError) -> Self {
        self.data_mut().failing_tables.insert(key(schema, table), error);
        self
    }

    /// Column queries for this table panic
    pub fn panicking_table(mut self, schema: &str, table: &str) -> Self {
        self.data_mut().panicking_tables.insert(key(schema, table));
        self
    }

    /// Delay every session open by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.data_mut().latency = Some(latency);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Highest number of sessions open at the same time
    pub fn peak_open_sessions(&self) -> usize {
        self.counters.peak_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn open(&self) -> CatalogResult<Box<dyn CatalogSession>> {
        if self.data.failing_connections {
            return Err(CatalogError::Connect("connection refused".to_string()));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let open_now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_open.fetch_max(open_now, Ordering::SeqCst);

        // Counted as open while stalling so concurrency is observable.
        if let Some(latency) = self.data.latency {
            tokio::time::sleep(latency).await;
        }

        Ok(Box::new(InMemorySession {
            data: self.data.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct InMemorySession {
    data: Arc<CatalogData>,
    counters: Arc<SessionCounters>,
}

impl InMemorySession {
    fn same_name(&self, stored: &str, requested: &str) -> bool {
        if self.data.case_insensitive_names {
            stored.eq_ignore_ascii_case(requested)
        } else {
            stored == requested
        }
    }

    fn in_scope(&self, scope: &TableScope, schema: &str) -> bool {
        match scope {
            TableScope::Schema(name) => self.same_name(schema, name),
            TableScope::UserSchemas => scope.includes(schema),
        }
    }

    fn base_table(&self, schema: &str, table: &str) -> Option<&StoredTable> {
        let found = if self.data.case_insensitive_names {
            self.data.tables.values().find(|stored| {
                self.same_name(&stored.row.schema, schema)
                    && self.same_name(&stored.row.table_name, table)
            })
        } else {
            self.data.tables.get(&key(schema, table))
        };
        found.filter(|stored| !stored.is_view)
    }

    fn fault(&self, schema: &str, table: &str) -> CatalogResult<()> {
        let table_key = key(schema, table);
        if self.data.panicking_tables.contains(&table_key) {
            panic!("catalog fault while reading {}.{}", schema, table);
        }
        match self.data.failing_tables.get(&table_key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogSession for InMemorySession {
    async fn base_tables(&mut self, scope: &TableScope) -> CatalogResult<Vec<TableRow>> {
        Ok(self
            .data
            .tables
            .values()
            .filter(|stored| !stored.is_view && self.in_scope(scope, &stored.row.schema))
            .map(|stored| stored.row.clone())
            .collect())
    }

    async fn find_base_table(&mut self, schema: &str, table: &str) -> CatalogResult<Option<TableRow>> {
        Ok(self.base_table(schema, table).map(|stored| stored.row.clone()))
    }

    async fn columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<ColumnRow>> {
        self.fault(schema, table)?;
        Ok(self
            .base_table(schema, table)
            .map(|stored| stored.columns.clone())
            .unwrap_or_default())
    }

    async fn key_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<KeyColumnRow>> {
        Ok(self
            .base_table(schema, table)
            .map(|stored| stored.key_columns.clone())
            .unwrap_or_default())
    }

    async fn index_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<IndexColumnRow>> {
        Ok(self
            .base_table(schema, table)
            .map(|stored| stored.index_columns.clone())
            .unwrap_or_default())
    }

    async fn foreign_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<ForeignKeyColumnRow>> {
        Ok(self
            .base_table(schema, table)
            .map(|stored| stored.foreign_key_columns.clone())
            .unwrap_or_default())
    }

    async fn supports_check_constraints(&mut self) -> CatalogResult<bool> {
        if self.data.failing_check_constraints_detection {
            return Err(CatalogError::Query(
                "SELECT command denied to user for table 'TABLES'".to_string(),
            ));
        }
        Ok(!self.data.no_check_constraints_view)
    }

    async fn check_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<CheckConstraintRow>> {
        if self.data.no_check_constraints_view || self.data.failing_check_constraints {
            return Err(CatalogError::Query(
                "Table 'information_schema.CHECK_CONSTRAINTS' doesn't exist".to_string(),
            ));
        }
        Ok(self
            .base_table(schema, table)
            .map(|stored| stored.check_constraints.clone())
            .unwrap_or_default())
    }

    async fn schema_relationships(&mut self, schema: &str) -> CatalogResult<Vec<RelationshipRow>> {
        let mut edges = Vec::new();
        for stored in self.data.tables.values() {
            if !self.same_name(&stored.row.schema, schema) {
                continue;
            }
            let mut rows = stored.foreign_key_columns.clone();
            rows.sort_by(|a, b| {
                (a.constraint_name.as_str(), a.ordinal_position)
                    .cmp(&(b.constraint_name.as_str(), b.ordinal_position))
            });
            edges.extend(rows.into_iter().map(|row| RelationshipRow {
                from_table: stored.row.table_name.clone(),
                from_column: row.column_name,
                to_table: row.referenced_table,
                to_column: row.referenced_column,
                constraint_name: row.constraint_name,
            }));
        }
        Ok(edges)
    }

    async fn close(self: Box<Self>) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}
