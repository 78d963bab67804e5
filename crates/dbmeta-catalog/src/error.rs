//! Catalog and metadata error types

use thiserror::Error;

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Failure talking to the catalog. Messages carry driver detail but never
/// connection credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("database connection failed: {0}")]
    Connect(String),

    #[error("database connection or query timed out: {0}")]
    Timeout(String),

    #[error("catalog query failed: {0}")]
    Query(String),
}

/// Failure assembling metadata for a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("schema or table does not exist: {schema}.{table}")]
    TableNotFound { schema: String, table: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::TableNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = MetadataError::TableNotFound {
            schema: "shop".to_string(),
            table: "orders".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "schema or table does not exist: shop.orders"
        );
    }

    #[test]
    fn test_catalog_error_is_transparent() {
        let err = MetadataError::from(CatalogError::Timeout("read".to_string()));
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "database connection or query timed out: read"
        );
    }
}
