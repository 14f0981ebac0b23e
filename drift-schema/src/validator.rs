//! Schema validation and semantic analysis.
//!
//! This module validates a schema for semantic correctness:
//! - Collection and field names are well-formed
//! - Relation targets exist
//! - Type-specific options are coherent
//! - Rules and indexes respect the collection kind

use regex_lite::Regex;
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::model::{Collection, CollectionKind, Field, FieldType, RuleSlot, Schema};

/// Schema validator for semantic analysis.
#[derive(Debug, Default)]
pub struct Validator {
    /// Collected validation errors.
    errors: Vec<SchemaError>,
}

impl Validator {
    /// Create a new validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a schema, collecting every issue before failing.
    pub fn validate(&mut self, schema: &Schema) -> SchemaResult<()> {
        self.errors.clear();

        for collection in schema.collections.values() {
            self.validate_collection(collection, schema);
        }

        debug!(
            "Validated schema: {} collections, {} errors",
            schema.collections.len(),
            self.errors.len()
        );

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed {
                count: self.errors.len(),
                errors: std::mem::take(&mut self.errors),
            })
        }
    }

    /// Validate a single collection.
    fn validate_collection(&mut self, collection: &Collection, schema: &Schema) {
        let name = collection.name();

        if !is_identifier(name) {
            self.errors.push(SchemaError::invalid_collection(
                name,
                "name must start with a letter or underscore and contain only letters, digits, and underscores",
            ));
        }

        for field in collection.fields.values() {
            self.validate_field(field, name, schema);
        }

        let mut seen = std::collections::HashSet::new();
        for index in &collection.indexes {
            if !seen.insert(index.as_str()) {
                self.errors.push(SchemaError::duplicate("index", index));
            }
        }

        match collection.kind {
            CollectionKind::View => {
                if !collection.indexes.is_empty() {
                    self.errors.push(SchemaError::invalid_collection(
                        name,
                        "view collections cannot define indexes",
                    ));
                }
                for slot in [
                    RuleSlot::Create,
                    RuleSlot::Update,
                    RuleSlot::Delete,
                    RuleSlot::Manage,
                ] {
                    if !collection.rules.get(slot).is_unset() {
                        self.errors.push(SchemaError::invalid_rule(
                            name,
                            slot.as_str(),
                            "view collections only support list and view rules",
                        ));
                    }
                }
            }
            CollectionKind::Base => {
                if !collection.rules.get(RuleSlot::Manage).is_unset() {
                    self.errors.push(SchemaError::invalid_rule(
                        name,
                        "manage",
                        "manage rules apply to auth collections only",
                    ));
                }
            }
            CollectionKind::Auth => {}
        }
    }

    /// Validate a single field definition.
    fn validate_field(&mut self, field: &Field, collection: &str, schema: &Schema) {
        let name = field.name();

        if !is_identifier(name) {
            self.errors.push(SchemaError::invalid_field(
                collection,
                name,
                "name must start with a letter or underscore and contain only letters, digits, and underscores",
            ));
        }

        match &field.field_type {
            FieldType::Text(opts) => {
                if let Some(min) = opts.min
                    && let Some(max) = opts.max
                    && min > max
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        format!("min length {} exceeds max length {}", min, max),
                    ));
                }
                if let Some(pattern) = &opts.pattern
                    && Regex::new(pattern).is_err()
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        format!("pattern `{}` is not a valid regular expression", pattern),
                    ));
                }
            }
            FieldType::Number(opts) => {
                if let Some(min) = opts.min
                    && let Some(max) = opts.max
                    && min > max
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        format!("min value {} exceeds max value {}", min, max),
                    ));
                }
            }
            FieldType::Select(opts) => {
                if opts.values.is_empty() {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        "select fields need at least one allowed value",
                    ));
                }
                if let Some(max_select) = opts.max_select
                    && max_select == 0
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        "maxSelect must be at least 1",
                    ));
                }
            }
            FieldType::File(opts) => {
                if let Some(max_select) = opts.max_select
                    && max_select == 0
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        "maxSelect must be at least 1",
                    ));
                }
                if let Some(max_size) = opts.max_size
                    && max_size == 0
                {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        "maxSize must be at least 1 byte",
                    ));
                }
            }
            FieldType::Relation(opts) => {
                if !schema.has_collection(&opts.collection) {
                    self.errors.push(SchemaError::invalid_relation(
                        collection,
                        name,
                        format!("target collection `{}` does not exist", opts.collection),
                    ));
                }
                if let Some(min) = opts.min_select
                    && let Some(max) = opts.max_select
                    && min > max
                {
                    self.errors.push(SchemaError::invalid_relation(
                        collection,
                        name,
                        format!("minSelect {} exceeds maxSelect {}", min, max),
                    ));
                }
            }
            FieldType::Autodate(opts) => {
                if !opts.on_create && !opts.on_update {
                    self.errors.push(SchemaError::invalid_field(
                        collection,
                        name,
                        "autodate fields must set onCreate or onUpdate",
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Validate a schema with a fresh validator.
pub fn validate_schema(schema: &Schema) -> SchemaResult<()> {
    Validator::new().validate(schema)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
