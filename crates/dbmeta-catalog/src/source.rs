//! The catalog query oracle
//!
//! A [`CatalogSource`] opens short-lived [`CatalogSession`]s. Each session
//! answers the handful of `information_schema` questions the assembler asks
//! and returns plain rows; grouping and joining happen in the assembler.

use crate::error::CatalogResult;
use async_trait::async_trait;

/// Schemas hidden from `list_tables` when no schema is given
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Which schemas a table listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableScope {
    Schema(String),
    /// Every schema except [`SYSTEM_SCHEMAS`]
    UserSchemas,
}

impl TableScope {
    pub fn includes(&self, schema: &str) -> bool {
        match self {
            TableScope::Schema(name) => name == schema,
            TableScope::UserSchemas => !SYSTEM_SCHEMAS.contains(&schema),
        }
    }
}

/// A base table as listed by `information_schema.TABLES`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub schema: String,
    pub table_name: String,
    pub table_comment: String,
    pub engine: Option<String>,
    pub table_collation: Option<String>,
    pub row_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub column_name: String,
    pub column_type: String,
    /// `YES` or `NO`
    pub is_nullable: String,
    pub column_default: Option<String>,
    pub extra: String,
    pub column_comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConstraintType {
    PrimaryKey,
    Unique,
}

impl KeyConstraintType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PRIMARY KEY" => Some(KeyConstraintType::PrimaryKey),
            "UNIQUE" => Some(KeyConstraintType::Unique),
            _ => None,
        }
    }
}

/// One column of a PRIMARY KEY or UNIQUE constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumnRow {
    pub constraint_name: String,
    pub constraint_type: KeyConstraintType,
    pub column_name: String,
    pub ordinal_position: i64,
}

/// One column of an index, from `information_schema.STATISTICS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumnRow {
    pub index_name: String,
    pub column_name: String,
    pub seq_in_index: i64,
    pub non_unique: bool,
}

/// One column pair of a foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumnRow {
    pub constraint_name: String,
    pub column_name: String,
    pub ordinal_position: i64,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub update_rule: String,
    pub delete_rule: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConstraintRow {
    pub constraint_name: String,
    pub check_clause: String,
}

/// A foreign-key edge inside one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRow {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

/// Opens catalog sessions
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn open(&self) -> CatalogResult<Box<dyn CatalogSession>>;
}

/// A single catalog connection. Every method is a read-only query.
#[async_trait]
pub trait CatalogSession: Send {
    /// Base tables in scope (views excluded)
    async fn base_tables(&mut self, scope: &TableScope) -> CatalogResult<Vec<TableRow>>;

    /// The base table with exactly this schema and name, if any
    async fn find_base_table(&mut self, schema: &str, table: &str) -> CatalogResult<Option<TableRow>>;

    /// Columns in ordinal order
    async fn columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<ColumnRow>>;

    /// PRIMARY KEY and UNIQUE constraint columns
    async fn key_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<KeyColumnRow>>;

    async fn index_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<IndexColumnRow>>;

    async fn foreign_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<ForeignKeyColumnRow>>;

    /// Whether the catalog exposes a CHECK_CONSTRAINTS view at all
    async fn supports_check_constraints(&mut self) -> CatalogResult<bool>;

    async fn check_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<CheckConstraintRow>>;

    /// Foreign-key edges between tables of one schema
    async fn schema_relationships(&mut self, schema: &str) -> CatalogResult<Vec<RelationshipRow>>;

    /// Close the connection. Errors while closing are logged, not returned.
    async fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_scope_excludes_system_schemas() {
        let scope = TableScope::UserSchemas;
        for schema in SYSTEM_SCHEMAS {
            assert!(!scope.includes(schema));
        }
        assert!(scope.includes("shop"));
    }

    #[test]
    fn test_schema_scope_is_exact() {
        let scope = TableScope::Schema("shop".to_string());
        assert!(scope.includes("shop"));
        assert!(!scope.includes("Shop"));
        assert!(!scope.includes("shop2"));
    }

    #[test]
    fn test_key_constraint_type_parse() {
        assert_eq!(
            KeyConstraintType::parse("PRIMARY KEY"),
            Some(KeyConstraintType::PrimaryKey)
        );
        assert_eq!(KeyConstraintType::parse("UNIQUE"), Some(KeyConstraintType::Unique));
        assert_eq!(KeyConstraintType::parse("FOREIGN KEY"), None);
    }
}
