//! Identifier validation for schema and table names
//!
//! Raw tool arguments arrive as JSON values. Only plain identifiers made of
//! ASCII letters, digits and underscores reach the catalog; backticks, quotes,
//! whitespace and semicolons are rejected here even though every catalog
//! query binds its parameters.

use dbmeta_core::LimitsConfig;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which identifier is being validated, for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Schema,
    Table,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Schema => write!(f, "schema name"),
            IdentifierKind::Table => write!(f, "table name"),
        }
    }
}

/// Rejected tool argument. Messages are safe to return to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} is required")]
    Missing { kind: IdentifierKind },

    #[error("{kind} must be a string")]
    TypeNotString { kind: IdentifierKind },

    #[error("{kind} must not be empty")]
    EmptyIdentifier { kind: IdentifierKind },

    #[error("{kind} must be at most {max} characters")]
    TooLong { kind: IdentifierKind, max: usize },

    #[error("{kind} may only contain letters, digits and underscores")]
    InvalidCharacters { kind: IdentifierKind },

    #[error("schema is not in the allowed list")]
    SchemaNotAllowed,

    #[error("table_names must be an array")]
    NotAList,

    #[error("at most {max} tables can be requested at once")]
    TooManyTables { max: usize },

    #[error("table_names item {index}: {source}")]
    InvalidListItem {
        /// 1-based position of the offending element
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Validates schema and table identifiers against the configured limits
#[derive(Debug, Clone)]
pub struct IdentifierValidator {
    max_identifier_length: usize,
    max_tables_per_request: usize,
    allowed_schemas: Vec<String>,
}

impl IdentifierValidator {
    pub fn new(
        max_identifier_length: usize,
        max_tables_per_request: usize,
        allowed_schemas: Vec<String>,
    ) -> Self {
        Self {
            max_identifier_length,
            max_tables_per_request,
            allowed_schemas,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(
            limits.max_identifier_length,
            limits.max_tables_per_request,
            limits.allowed_schemas.clone(),
        )
    }

    /// Validate an optional schema. Absent or `null` selects every schema.
    pub fn validate_schema(&self, raw: Option<&Value>) -> Result<Option<String>, ValidationError> {
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.check_schema(value).map(Some),
        }
    }

    /// Validate a schema that must be present
    pub fn require_schema(&self, raw: Option<&Value>) -> Result<String, ValidationError> {
        match raw {
            None | Some(Value::Null) => Err(ValidationError::Missing {
                kind: IdentifierKind::Schema,
            }),
            Some(value) => self.check_schema(value),
        }
    }

    /// Validate a table name; tables are never optional
    pub fn validate_table(&self, raw: Option<&Value>) -> Result<String, ValidationError> {
        match raw {
            None | Some(Value::Null) => Err(ValidationError::Missing {
                kind: IdentifierKind::Table,
            }),
            Some(value) => self.check_identifier(IdentifierKind::Table, value),
        }
    }

    /// Validate a list of table names.
    ///
    /// Returns the trimmed names in request order. Duplicates are kept.
    pub fn validate_table_list(&self, raw: Option<&Value>) -> Result<Vec<String>, ValidationError> {
        let items = match raw {
            Some(Value::Array(items)) => items,
            _ => return Err(ValidationError::NotAList),
        };

        if items.len() > self.max_tables_per_request {
            return Err(ValidationError::TooManyTables {
                max: self.max_tables_per_request,
            });
        }

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.validate_table(Some(item))
                    .map_err(|source| ValidationError::InvalidListItem {
                        index: i + 1,
                        source: Box::new(source),
                    })
            })
            .collect()
    }

    fn check_schema(&self, value: &Value) -> Result<String, ValidationError> {
        let name = self.check_identifier(IdentifierKind::Schema, value)?;
        if !self.allowed_schemas.is_empty() && !self.allowed_schemas.contains(&name) {
            return Err(ValidationError::SchemaNotAllowed);
        }
        Ok(name)
    }

    fn check_identifier(&self, kind: IdentifierKind, value: &Value) -> Result<String, ValidationError> {
        let raw = value
            .as_str()
            .ok_or(ValidationError::TypeNotString { kind })?;

        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyIdentifier { kind });
        }
        if name.chars().count() > self.max_identifier_length {
            return Err(ValidationError::TooLong {
                kind,
                max: self.max_identifier_length,
            });
        }
        if !is_plain_identifier(name) {
            return Err(ValidationError::InvalidCharacters { kind });
        }

        Ok(name.to_string())
    }
}

impl Default for IdentifierValidator {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

/// `^[A-Za-z0-9_]+$`
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> IdentifierValidator {
        IdentifierValidator::new(8, 3, Vec::new())
    }

    #[test]
    fn test_absent_schema_allowed_for_listing() {
        let v = validator();
        assert_eq!(v.validate_schema(None).unwrap(), None);
        assert_eq!(v.validate_schema(Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn test_required_schema_and_table_must_be_present() {
        let v = validator();
        assert_eq!(
            v.require_schema(None),
            Err(ValidationError::Missing {
                kind: IdentifierKind::Schema
            })
        );
        assert_eq!(
            v.validate_table(Some(&Value::Null)),
            Err(ValidationError::Missing {
                kind: IdentifierKind::Table
            })
        );
    }

    #[test]
    fn test_valid_identifiers_are_trimmed() {
        let v = validator();
        assert_eq!(v.require_schema(Some(&json!("  shop_01 "))).unwrap(), "shop_01");
        assert_eq!(v.validate_table(Some(&json!("Orders"))).unwrap(), "Orders");
    }

    #[test]
    fn test_non_string_rejected() {
        let v = validator();
        assert_eq!(
            v.validate_table(Some(&json!(42))),
            Err(ValidationError::TypeNotString {
                kind: IdentifierKind::Table
            })
        );
        assert_eq!(
            v.validate_schema(Some(&json!(["shop"]))),
            Err(ValidationError::TypeNotString {
                kind: IdentifierKind::Schema
            })
        );
    }

    #[test]
    fn test_empty_after_trim_rejected() {
        let v = validator();
        assert_eq!(
            v.validate_schema(Some(&json!("   "))),
            Err(ValidationError::EmptyIdentifier {
                kind: IdentifierKind::Schema
            })
        );
    }

    #[test]
    fn test_length_boundary() {
        let v = validator();
        assert!(v.validate_table(Some(&json!("abcdefgh"))).is_ok());
        assert_eq!(
            v.validate_table(Some(&json!("abcdefghi"))),
            Err(ValidationError::TooLong {
                kind: IdentifierKind::Table,
                max: 8
            })
        );
    }

    #[test]
    fn test_invalid_characters() {
        let v = validator();
        for bad in ["a-b", "a b", "`t`", "t;drop", "t'", "tä", "t.x"] {
            assert_eq!(
                v.validate_table(Some(&json!(bad))),
                Err(ValidationError::InvalidCharacters {
                    kind: IdentifierKind::Table
                }),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_length_checked_before_characters() {
        let v = validator();
        assert!(matches!(
            v.validate_table(Some(&json!("bad-name-too-long"))),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_allow_list() {
        let v = IdentifierValidator::new(64, 50, vec!["shop".to_string()]);
        assert_eq!(v.require_schema(Some(&json!(" shop "))).unwrap(), "shop");
        assert_eq!(
            v.require_schema(Some(&json!("billing"))),
            Err(ValidationError::SchemaNotAllowed)
        );
        // The allow-list only applies to schemas.
        assert!(v.validate_table(Some(&json!("billing"))).is_ok());
    }

    #[test]
    fn test_table_list_must_be_array() {
        let v = validator();
        assert_eq!(v.validate_table_list(None), Err(ValidationError::NotAList));
        assert_eq!(
            v.validate_table_list(Some(&json!("orders"))),
            Err(ValidationError::NotAList)
        );
    }

    #[test]
    fn test_table_list_too_many_regardless_of_content() {
        let v = validator();
        let err = v
            .validate_table_list(Some(&json!(["a", "b", "c", 7])))
            .unwrap_err();
        assert_eq!(err, ValidationError::TooManyTables { max: 3 });
    }

    #[test]
    fn test_table_list_reports_first_bad_index() {
        let v = validator();
        let err = v
            .validate_table_list(Some(&json!(["orders", "bad name", 3])))
            .unwrap_err();
        match &err {
            ValidationError::InvalidListItem { index, source } => {
                assert_eq!(*index, 2);
                assert!(matches!(
                    **source,
                    ValidationError::InvalidCharacters { .. }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("table_names item 2:"));
    }

    #[test]
    fn test_table_list_preserves_order_and_duplicates() {
        let v = validator();
        let names = v
            .validate_table_list(Some(&json!([" b", "a ", "b"])))
            .unwrap();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert!(v.validate_table_list(Some(&json!([]))).unwrap().is_empty());
    }
}
