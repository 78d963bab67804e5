//! Metadata assembly
//!
//! Joins the rows of several catalog views into [`TableDescriptor`]s and
//! [`SchemaOverview`]s. Every public operation opens its own session and
//! closes it before returning, whatever the outcome.

use crate::error::{CatalogError, MetadataError};
use crate::source::{
    CatalogSession, CatalogSource, ColumnRow, ForeignKeyColumnRow, IndexColumnRow,
    KeyColumnRow, KeyConstraintType, RelationshipRow, TableRow, TableScope,
};
use crate::types::{
    CheckConstraint, ColumnDescriptor, ForeignKeyGroup, IndexGroup, Relationship,
    SchemaOverview, SchemaTable, TableAttributes, TableDescriptor, TableFailure,
    TableMetadataEntry, TableSummary, UniqueKeyGroup,
};
use dbmeta_core::panic_message;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Index name MySQL gives the primary key
const PRIMARY_INDEX: &str = "PRIMARY";

/// Builds metadata descriptions from a catalog source
#[derive(Clone)]
pub struct MetadataAssembler {
    source: Arc<dyn CatalogSource>,
    /// 0 = unbounded
    max_list_tables_result: usize,
}

impl MetadataAssembler {
    pub fn new(source: Arc<dyn CatalogSource>, max_list_tables_result: usize) -> Self {
        Self {
            source,
            max_list_tables_result,
        }
    }

    /// List base tables of one schema, or of every non-system schema.
    ///
    /// Results beyond `max_list_tables_result` are dropped without any
    /// indication in the response.
    pub async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableSummary>, MetadataError> {
        let scope = match schema {
            Some(name) => TableScope::Schema(name.to_string()),
            None => TableScope::UserSchemas,
        };

        let mut session = self.source.open().await?;
        let rows = session.base_tables(&scope).await;
        session.close().await;

        // Scope matching is left to the catalog, whose collation may fold case.
        let mut tables: Vec<TableSummary> = rows?
            .into_iter()
            .map(|row| TableSummary {
                schema: row.schema,
                table_name: row.table_name,
                table_comment: row.table_comment,
            })
            .collect();

        tables.sort_by(|a, b| {
            (a.schema.as_str(), a.table_name.as_str()).cmp(&(b.schema.as_str(), b.table_name.as_str()))
        });

        if self.max_list_tables_result > 0 && tables.len() > self.max_list_tables_result {
            tracing::debug!(
                total = tables.len(),
                limit = self.max_list_tables_result,
                "Truncating table list"
            );
            tables.truncate(self.max_list_tables_result);
        }

        Ok(tables)
    }

    /// Full description of one base table
    pub async fn get_table_metadata(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<TableDescriptor, MetadataError> {
        let mut session = self.source.open().await?;
        let result = describe_table(session.as_mut(), schema, table).await;
        session.close().await;
        result
    }

    /// Describe several tables. A failure for one table becomes an error
    /// element at its position and never affects the others.
    pub async fn get_tables_metadata(&self, schema: &str, tables: &[String]) -> Vec<TableMetadataEntry> {
        let mut entries = Vec::with_capacity(tables.len());

        for table in tables {
            let outcome = AssertUnwindSafe(self.get_table_metadata(schema, table))
                .catch_unwind()
                .await;

            let entry = match outcome {
                Ok(Ok(descriptor)) => TableMetadataEntry::Found(Box::new(descriptor)),
                Ok(Err(err)) => {
                    tracing::debug!(schema = %schema, table = %table, error = %err, "Table lookup failed");
                    TableMetadataEntry::Failed(TableFailure {
                        error: err.to_string(),
                        schema: schema.to_string(),
                        table_name: table.clone(),
                    })
                }
                Err(payload) => {
                    let cause = panic_message(payload.as_ref());
                    tracing::error!(schema = %schema, table = %table, cause = %cause, "Table assembly panicked");
                    TableMetadataEntry::Failed(TableFailure {
                        error: format!("processing error: {}", cause),
                        schema: schema.to_string(),
                        table_name: table.clone(),
                    })
                }
            };
            entries.push(entry);
        }

        entries
    }

    /// Tables and foreign-key relationships of one schema
    pub async fn get_schema_overview(&self, schema: &str) -> Result<SchemaOverview, MetadataError> {
        let mut session = self.source.open().await?;
        let result = overview(session.as_mut(), schema).await;
        session.close().await;
        result
    }

    /// Open and close one session; used for readiness checks
    pub async fn ping(&self) -> Result<(), CatalogError> {
        let session = self.source.open().await?;
        session.close().await;
        Ok(())
    }
}

async fn describe_table(
    session: &mut dyn CatalogSession,
    schema: &str,
    table: &str,
) -> Result<TableDescriptor, MetadataError> {
    let table_row = session
        .find_base_table(schema, table)
        .await?
        .ok_or_else(|| MetadataError::TableNotFound {
            schema: schema.to_string(),
            table: table.to_string(),
        })?;

    let columns = session.columns(schema, table).await?;
    let key_rows = session.key_columns(schema, table).await?;
    let index_rows = session.index_columns(schema, table).await?;
    let fk_rows = session.foreign_key_columns(schema, table).await?;
    let check_constraints = check_constraints(session, schema, table).await?;

    let (primary_key, unique_keys) = group_keys(key_rows);
    let indexes = group_indexes(index_rows, &unique_keys);
    let foreign_keys = group_foreign_keys(fk_rows);

    Ok(TableDescriptor {
        table: table_attributes(table_row),
        columns: columns.into_iter().map(column_descriptor).collect(),
        primary_key,
        unique_keys,
        indexes,
        foreign_keys,
        check_constraints,
    })
}

/// Older catalogs have no CHECK_CONSTRAINTS view. Its absence, or a failure
/// detecting or querying it, yields an empty list instead of failing the table.
async fn check_constraints(
    session: &mut dyn CatalogSession,
    schema: &str,
    table: &str,
) -> Result<Vec<CheckConstraint>, MetadataError> {
    match session.supports_check_constraints().await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Catalog has no CHECK_CONSTRAINTS view");
            return Ok(Vec::new());
        }
        Err(err) => {
            tracing::warn!(schema = %schema, table = %table, error = %err, "Skipping check constraints");
            return Ok(Vec::new());
        }
    }

    match session.check_constraints(schema, table).await {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|row| CheckConstraint {
                constraint_name: row.constraint_name,
                check_clause: row.check_clause,
            })
            .collect()),
        Err(err) => {
            tracing::warn!(schema = %schema, table = %table, error = %err, "Skipping check constraints");
            Ok(Vec::new())
        }
    }
}

async fn overview(session: &mut dyn CatalogSession, schema: &str) -> Result<SchemaOverview, MetadataError> {
    let scope = TableScope::Schema(schema.to_string());
    let mut table_rows: Vec<TableRow> = session.base_tables(&scope).await?;
    table_rows.sort_by(|a, b| a.table_name.cmp(&b.table_name));

    let relationship_rows = session.schema_relationships(schema).await?;

    Ok(SchemaOverview {
        schema: schema.to_string(),
        tables: table_rows
            .into_iter()
            .map(|row| SchemaTable {
                table_name: row.table_name,
                table_comment: row.table_comment,
            })
            .collect(),
        relationships: dedup_relationships(relationship_rows),
    })
}

fn table_attributes(row: TableRow) -> TableAttributes {
    TableAttributes {
        table_name: row.table_name,
        engine: row.engine,
        table_collation: row.table_collation,
        table_comment: row.table_comment,
        row_format: row.row_format,
    }
}

fn column_descriptor(row: ColumnRow) -> ColumnDescriptor {
    ColumnDescriptor {
        nullable: row.is_nullable.eq_ignore_ascii_case("YES"),
        column_name: row.column_name,
        data_type: row.column_type,
        default_value: row.column_default,
        extra: row.extra,
        column_comment: row.column_comment,
    }
}

/// Groups keyed by name, in first-seen order
struct OrderedGroups<T> {
    groups: Vec<T>,
    positions: HashMap<String, usize>,
}

impl<T> OrderedGroups<T> {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn entry(&mut self, name: &str, create: impl FnOnce() -> T) -> &mut T {
        let index = match self.positions.get(name) {
            Some(&index) => index,
            None => {
                self.groups.push(create());
                self.positions.insert(name.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    fn into_vec(self) -> Vec<T> {
        self.groups
    }
}

/// Columns tagged with their catalog position, sorted on the way out
type Positioned<T> = Vec<(i64, T)>;

fn sorted_by_position<T>(mut items: Positioned<T>) -> Vec<T> {
    items.sort_by_key(|(position, _)| *position);
    items.into_iter().map(|(_, item)| item).collect()
}

fn group_keys(rows: Vec<KeyColumnRow>) -> (Vec<String>, Vec<UniqueKeyGroup>) {
    let mut primary: Positioned<String> = Vec::new();
    let mut unique: OrderedGroups<(String, Positioned<String>)> = OrderedGroups::new();

    for row in rows {
        match row.constraint_type {
            KeyConstraintType::PrimaryKey => primary.push((row.ordinal_position, row.column_name)),
            KeyConstraintType::Unique => {
                let (_, columns) = unique.entry(&row.constraint_name, || {
                    (row.constraint_name.clone(), Vec::new())
                });
                columns.push((row.ordinal_position, row.column_name));
            }
        }
    }

    let unique_keys = unique
        .into_vec()
        .into_iter()
        .map(|(constraint_name, columns)| UniqueKeyGroup {
            constraint_name,
            columns: sorted_by_position(columns),
        })
        .collect();

    (sorted_by_position(primary), unique_keys)
}

/// Secondary indexes, skipping the primary key and indexes that back a
/// unique constraint already reported in `unique_keys`
fn group_indexes(rows: Vec<IndexColumnRow>, unique_keys: &[UniqueKeyGroup]) -> Vec<IndexGroup> {
    let unique_names: HashSet<&str> = unique_keys
        .iter()
        .map(|key| key.constraint_name.as_str())
        .collect();

    let mut groups: OrderedGroups<(String, bool, Positioned<String>)> = OrderedGroups::new();
    for row in rows {
        if row.index_name == PRIMARY_INDEX || unique_names.contains(row.index_name.as_str()) {
            continue;
        }
        let (_, _, columns) = groups.entry(&row.index_name, || {
            (row.index_name.clone(), row.non_unique, Vec::new())
        });
        columns.push((row.seq_in_index, row.column_name));
    }

    groups
        .into_vec()
        .into_iter()
        .map(|(index_name, non_unique, columns)| IndexGroup {
            index_name,
            columns: sorted_by_position(columns),
            non_unique,
        })
        .collect()
}

fn group_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Vec<ForeignKeyGroup> {
    let mut groups: OrderedGroups<(ForeignKeyGroup, Positioned<(String, String)>)> =
        OrderedGroups::new();

    for row in rows {
        let (_, pairs) = groups.entry(&row.constraint_name, || {
            (
                ForeignKeyGroup {
                    constraint_name: row.constraint_name.clone(),
                    columns: Vec::new(),
                    referenced_schema: row.referenced_schema.clone(),
                    referenced_table: row.referenced_table.clone(),
                    referenced_columns: Vec::new(),
                    update_rule: row.update_rule.clone(),
                    delete_rule: row.delete_rule.clone(),
                },
                Vec::new(),
            )
        });
        pairs.push((row.ordinal_position, (row.column_name, row.referenced_column)));
    }

    groups
        .into_vec()
        .into_iter()
        .map(|(mut key, pairs)| {
            let (columns, referenced_columns): (Vec<String>, Vec<String>) =
                sorted_by_position(pairs).into_iter().unzip();
            key.columns = columns;
            key.referenced_columns = referenced_columns;
            key
        })
        .collect()
}

/// Drop edges repeating an earlier (from_table, from_column, to_table,
/// to_column); the first constraint name wins.
fn dedup_relationships(rows: Vec<RelationshipRow>) -> Vec<Relationship> {
    let mut seen: HashSet<(String, String, String, String)> = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            seen.insert((
                row.from_table.clone(),
                row.from_column.clone(),
                row.to_table.clone(),
                row.to_column.clone(),
            ))
        })
        .map(|row| Relationship {
            from_table: row.from_table,
            from_column: row.from_column,
            to_table: row.to_table,
            to_column: row.to_column,
            constraint_name: row.constraint_name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, kind: KeyConstraintType, column: &str, pos: i64) -> KeyColumnRow {
        KeyColumnRow {
            constraint_name: name.to_string(),
            constraint_type: kind,
            column_name: column.to_string(),
            ordinal_position: pos,
        }
    }

    fn index(name: &str, column: &str, seq: i64, non_unique: bool) -> IndexColumnRow {
        IndexColumnRow {
            index_name: name.to_string(),
            column_name: column.to_string(),
            seq_in_index: seq,
            non_unique,
        }
    }

    fn fk(name: &str, column: &str, pos: i64, ref_table: &str, ref_column: &str) -> ForeignKeyColumnRow {
        ForeignKeyColumnRow {
            constraint_name: name.to_string(),
            column_name: column.to_string(),
            ordinal_position: pos,
            referenced_schema: "shop".to_string(),
            referenced_table: ref_table.to_string(),
            referenced_column: ref_column.to_string(),
            update_rule: "CASCADE".to_string(),
            delete_rule: "RESTRICT".to_string(),
        }
    }

    fn edge(from: (&str, &str), to: (&str, &str), name: &str) -> RelationshipRow {
        RelationshipRow {
            from_table: from.0.to_string(),
            from_column: from.1.to_string(),
            to_table: to.0.to_string(),
            to_column: to.1.to_string(),
            constraint_name: name.to_string(),
        }
    }

    #[test]
    fn test_group_keys_splits_primary_and_unique() {
        let rows = vec![
            key("PRIMARY", KeyConstraintType::PrimaryKey, "tenant_id", 1),
            key("PRIMARY", KeyConstraintType::PrimaryKey, "id", 2),
            key("uq_email", KeyConstraintType::Unique, "email", 1),
            key("uq_name", KeyConstraintType::Unique, "first", 1),
            key("uq_name", KeyConstraintType::Unique, "last", 2),
        ];
        let (primary, unique) = group_keys(rows);
        assert_eq!(primary, vec!["tenant_id", "id"]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].constraint_name, "uq_email");
        assert_eq!(unique[1].columns, vec!["first", "last"]);
    }

    #[test]
    fn test_group_keys_does_not_depend_on_row_order() {
        // Interleaved rows would split a contiguous-run grouping in two.
        let rows = vec![
            key("uq_name", KeyConstraintType::Unique, "last", 2),
            key("uq_email", KeyConstraintType::Unique, "email", 1),
            key("uq_name", KeyConstraintType::Unique, "first", 1),
        ];
        let (primary, unique) = group_keys(rows);
        assert!(primary.is_empty());
        assert_eq!(
            unique,
            vec![
                UniqueKeyGroup {
                    constraint_name: "uq_name".to_string(),
                    columns: vec!["first".to_string(), "last".to_string()],
                },
                UniqueKeyGroup {
                    constraint_name: "uq_email".to_string(),
                    columns: vec!["email".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_group_indexes_skips_primary_and_unique() {
        let unique = vec![UniqueKeyGroup {
            constraint_name: "uq_email".to_string(),
            columns: vec!["email".to_string()],
        }];
        let rows = vec![
            index("PRIMARY", "id", 1, false),
            index("idx_created", "created_at", 1, true),
            index("idx_status_date", "status", 1, true),
            index("uq_email", "email", 1, false),
            index("idx_status_date", "created_at", 2, true),
        ];
        let indexes = group_indexes(rows, &unique);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].index_name, "idx_created");
        assert_eq!(indexes[1].columns, vec!["status", "created_at"]);
        assert!(indexes.iter().all(|i| i.non_unique));
    }

    #[test]
    fn test_group_foreign_keys_keeps_parallel_columns() {
        let rows = vec![
            fk("fk_line_order", "order_tenant", 1, "orders", "tenant_id"),
            fk("fk_line_product", "product_id", 1, "products", "id"),
            fk("fk_line_order", "order_id", 2, "orders", "id"),
        ];
        let keys = group_foreign_keys(rows);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].constraint_name, "fk_line_order");
        assert_eq!(keys[0].columns, vec!["order_tenant", "order_id"]);
        assert_eq!(keys[0].referenced_columns, vec!["tenant_id", "id"]);
        assert_eq!(keys[0].referenced_table, "orders");
        assert_eq!(keys[0].update_rule, "CASCADE");
        assert_eq!(keys[0].delete_rule, "RESTRICT");
        assert_eq!(keys[1].referenced_table, "products");
    }

    #[test]
    fn test_dedup_relationships_keeps_first() {
        let rows = vec![
            edge(("lines", "order_id"), ("orders", "id"), "fk_a"),
            edge(("lines", "order_id"), ("orders", "id"), "fk_b"),
            edge(("lines", "product_id"), ("products", "id"), "fk_c"),
            edge(("orders", "customer_id"), ("customers", "id"), "fk_d"),
        ];
        let edges = dedup_relationships(rows);
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].constraint_name, "fk_a");
        assert_eq!(edges[1].constraint_name, "fk_c");
        assert_eq!(edges[2].constraint_name, "fk_d");
    }

    #[test]
    fn test_column_nullability() {
        let column = column_descriptor(ColumnRow {
            column_name: "note".to_string(),
            column_type: "text".to_string(),
            is_nullable: "YES".to_string(),
            column_default: None,
            extra: String::new(),
            column_comment: "free text".to_string(),
        });
        assert!(column.nullable);
        assert_eq!(column.data_type, "text");
    }
}
