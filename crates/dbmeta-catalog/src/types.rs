//! Assembled metadata returned by the tools

use serde::{Deserialize, Serialize};

/// One row of `list_tables`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub schema: String,
    pub table_name: String,
    pub table_comment: String,
}

/// Table-level attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttributes {
    pub table_name: String,
    pub engine: Option<String>,
    pub table_collation: Option<String>,
    pub table_comment: String,
    pub row_format: Option<String>,
}

/// Information about a table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    /// Declared type, e.g. `varchar(255)` or `int unsigned`
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub extra: String,
    pub column_comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueKeyGroup {
    pub constraint_name: String,
    pub columns: Vec<String>,
}

/// A secondary index that is neither the primary key nor a unique constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexGroup {
    pub index_name: String,
    pub columns: Vec<String>,
    pub non_unique: bool,
}

/// A foreign key; `columns[i]` references `referenced_columns[i]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyGroup {
    pub constraint_name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub update_rule: String,
    pub delete_rule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub constraint_name: String,
    pub check_clause: String,
}

/// Everything needed to document one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table: TableAttributes,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<UniqueKeyGroup>,
    pub indexes: Vec<IndexGroup>,
    pub foreign_keys: Vec<ForeignKeyGroup>,
    pub check_constraints: Vec<CheckConstraint>,
}

/// Error element placed in a batch result in place of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub error: String,
    pub schema: String,
    pub table_name: String,
}

/// One element of a `get_tables_metadata` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableMetadataEntry {
    Found(Box<TableDescriptor>),
    Failed(TableFailure),
}

impl TableMetadataEntry {
    pub fn is_failed(&self) -> bool {
        matches!(self, TableMetadataEntry::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub table_name: String,
    pub table_comment: String,
}

/// A foreign-key edge between two columns of the same schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

/// Table of contents for a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOverview {
    pub schema: String,
    pub tables: Vec<SchemaTable>,
    pub relationships: Vec<Relationship>,
}
