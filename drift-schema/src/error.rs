//! Error types for schema construction and validation.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building or validating a schema.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Invalid collection definition.
    #[error("invalid collection `{name}`: {message}")]
    #[diagnostic(code(drift::schema::invalid_collection))]
    InvalidCollection { name: String, message: String },

    /// Invalid field definition.
    #[error("invalid field `{collection}.{field}`: {message}")]
    #[diagnostic(code(drift::schema::invalid_field))]
    InvalidField {
        collection: String,
        field: String,
        message: String,
    },

    /// Invalid relation definition.
    #[error("invalid relation `{collection}.{field}`: {message}")]
    #[diagnostic(code(drift::schema::invalid_relation))]
    InvalidRelation {
        collection: String,
        field: String,
        message: String,
    },

    /// Duplicate definition.
    #[error("duplicate {kind} `{name}`")]
    #[diagnostic(code(drift::schema::duplicate))]
    Duplicate { kind: String, name: String },

    /// Invalid access rule.
    #[error("invalid {slot} rule on `{collection}`: {message}")]
    #[diagnostic(code(drift::schema::invalid_rule))]
    InvalidRule {
        collection: String,
        slot: String,
        message: String,
    },

    /// Validation error with multiple issues.
    #[error("schema validation failed with {count} error(s)")]
    #[diagnostic(code(drift::schema::validation_failed))]
    ValidationFailed {
        count: usize,
        #[related]
        errors: Vec<SchemaError>,
    },
}

impl SchemaError {
    /// Create an invalid collection error.
    pub fn invalid_collection(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCollection {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        collection: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            collection: collection.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid relation error.
    pub fn invalid_relation(
        collection: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            collection: collection.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an invalid rule error.
    pub fn invalid_rule(
        collection: impl Into<String>,
        slot: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRule {
            collection: collection.into(),
            slot: slot.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_result_type() {
        let ok_result: SchemaResult<i32> = Ok(42);
        assert!(ok_result.is_ok());

        let err_result: SchemaResult<i32> = Err(SchemaError::duplicate("collection", "posts"));
        assert!(err_result.is_err());
    }

    // ==================== Error Constructor Tests ====================

    #[test]
    fn test_invalid_collection_error() {
        let err = SchemaError::invalid_collection("posts", "empty name");

        match err {
            SchemaError::InvalidCollection { name, message } => {
                assert_eq!(name, "posts");
                assert_eq!(message, "empty name");
            }
            _ => panic!("Expected InvalidCollection"),
        }
    }

    #[test]
    fn test_invalid_field_error() {
        let err = SchemaError::invalid_field("posts", "title", "bad options");

        match err {
            SchemaError::InvalidField {
                collection,
                field,
                message,
            } => {
                assert_eq!(collection, "posts");
                assert_eq!(field, "title");
                assert_eq!(message, "bad options");
            }
            _ => panic!("Expected InvalidField"),
        }
    }

    #[test]
    fn test_invalid_relation_error() {
        let err = SchemaError::invalid_relation("posts", "author", "unknown target");

        match err {
            SchemaError::InvalidRelation {
                collection, field, ..
            } => {
                assert_eq!(collection, "posts");
                assert_eq!(field, "author");
            }
            _ => panic!("Expected InvalidRelation"),
        }
    }

    // ==================== Error Display Tests ====================

    #[test]
    fn test_invalid_field_display() {
        let err = SchemaError::invalid_field("posts", "title", "min exceeds max");
        let display = format!("{}", err);
        assert!(display.contains("posts.title"));
        assert!(display.contains("min exceeds max"));
    }

    #[test]
    fn test_duplicate_display() {
        let err = SchemaError::duplicate("index", "idx_title");
        let display = format!("{}", err);
        assert!(display.contains("duplicate"));
        assert!(display.contains("index"));
        assert!(display.contains("idx_title"));
    }

    #[test]
    fn test_invalid_rule_display() {
        let err = SchemaError::invalid_rule("stats", "create", "views are read-only");
        let display = format!("{}", err);
        assert!(display.contains("stats"));
        assert!(display.contains("create"));
    }

    #[test]
    fn test_validation_failed_display() {
        let err = SchemaError::ValidationFailed {
            count: 3,
            errors: vec![],
        };
        let display = format!("{}", err);
        assert!(display.contains("3"));
    }

    #[test]
    fn test_error_debug() {
        let err = SchemaError::invalid_collection("posts", "test");
        let debug = format!("{:?}", err);
        assert!(debug.contains("InvalidCollection"));
        assert!(debug.contains("posts"));
    }
}
