//! Catalog access and metadata assembly for dbmeta
//!
//! This crate reads MySQL `information_schema` views through the
//! [`CatalogSource`] seam and joins the rows into table and schema
//! descriptions. Only SELECT statements are ever issued.

pub mod assembler;
pub mod error;
pub mod inmemory;
pub mod mysql;
pub mod source;
pub mod types;

// Re-exports
pub use assembler::MetadataAssembler;
pub use error::{CatalogError, CatalogResult, MetadataError};
pub use inmemory::InMemoryCatalog;
pub use mysql::MySqlCatalog;
pub use source::{CatalogSession, CatalogSource, SYSTEM_SCHEMAS, TableScope};
pub use types::{
    CheckConstraint, ColumnDescriptor, ForeignKeyGroup, IndexGroup, Relationship,
    SchemaOverview, SchemaTable, TableAttributes, TableDescriptor, TableFailure,
    TableMetadataEntry, TableSummary, UniqueKeyGroup,
};
