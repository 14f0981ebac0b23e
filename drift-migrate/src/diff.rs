//! Schema diffing for generating migrations.
//!
//! Compares a desired schema against the last applied schema and produces
//! a [`SchemaDiff`] describing what has to change. Matching is by name
//! only: a renamed collection or field shows up as a delete plus a create,
//! never as a rename.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use drift_schema::{Collection, Field, Rule, RuleSlot, Schema};

use crate::error::MigrateResult;

/// A diff between two schemas.
///
/// Deletions and removals carry the full pre-image of what they remove so
/// that revert scripts can restore it without consulting any other source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    /// Collections to create.
    pub create_collections: Vec<Collection>,
    /// Collections to delete, as their last applied definition.
    pub delete_collections: Vec<Collection>,
    /// Collections present on both sides with differences.
    pub modify_collections: Vec<CollectionChange>,
}

impl SchemaDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.create_collections.is_empty()
            && self.delete_collections.is_empty()
            && self.modify_collections.is_empty()
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.create_collections.is_empty() {
            parts.push(format!(
                "Create {} collections",
                self.create_collections.len()
            ));
        }
        if !self.delete_collections.is_empty() {
            parts.push(format!(
                "Delete {} collections",
                self.delete_collections.len()
            ));
        }
        if !self.modify_collections.is_empty() {
            parts.push(format!(
                "Modify {} collections",
                self.modify_collections.len()
            ));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Content fingerprint of the diff.
    ///
    /// Two diffs describing the same set of changes hash identically, so
    /// the generator can recognize an already generated migration.
    pub fn fingerprint(&self) -> MigrateResult<String> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Changes within a collection present on both sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionChange {
    /// Collection name.
    pub name: String,
    /// Fields to add.
    pub add_fields: Vec<Field>,
    /// Fields to remove, as their last applied definition.
    pub remove_fields: Vec<Field>,
    /// Fields present on both sides with changed properties.
    pub modify_fields: Vec<FieldChange>,
    /// Index definitions to add.
    pub add_indexes: Vec<String>,
    /// Index definitions to remove.
    pub remove_indexes: Vec<String>,
    /// Rule slots whose value changed.
    pub rule_changes: Vec<RuleChange>,
}

impl CollectionChange {
    /// Create an empty change set for a collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.add_fields.is_empty()
            && self.remove_fields.is_empty()
            && self.modify_fields.is_empty()
            && self.add_indexes.is_empty()
            && self.remove_indexes.is_empty()
            && self.rule_changes.is_empty()
    }
}

/// Property-level changes of a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    /// Field name.
    pub name: String,
    /// Changed properties.
    pub changes: Vec<PropertyChange>,
}

/// A single changed field property.
///
/// Properties come from the field's flat wire form, so the type tag itself
/// appears as the `type` property. A property absent on one side is
/// recorded as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    /// Property name in wire form, e.g. `required` or `maxSelect`.
    pub property: String,
    /// Last applied value.
    pub old: Value,
    /// Desired value.
    pub new: Value,
}

/// A changed rule slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleChange {
    /// Which slot changed.
    pub slot: RuleSlot,
    /// Last applied rule.
    pub old: Rule,
    /// Desired rule.
    pub new: Rule,
}

/// Schema differ comparing a desired schema against the applied one.
pub struct SchemaDiffer<'a> {
    /// Desired state.
    desired: &'a Schema,
    /// Last applied state, absent on a first run.
    applied: Option<&'a Schema>,
}

impl<'a> SchemaDiffer<'a> {
    /// Create a differ with only the desired schema.
    ///
    /// Without an applied schema every collection diffs as a creation.
    pub fn new(desired: &'a Schema) -> Self {
        Self {
            desired,
            applied: None,
        }
    }

    /// Set the applied schema.
    pub fn with_applied(mut self, applied: &'a Schema) -> Self {
        self.applied = Some(applied);
        self
    }

    /// Compute the diff between the schemas.
    pub fn diff(&self) -> MigrateResult<SchemaDiff> {
        let mut result = SchemaDiff::default();

        // Collections to create, in declaration order.
        for collection in self.desired.collections.values() {
            let known = self
                .applied
                .is_some_and(|applied| applied.has_collection(collection.name()));
            if !known {
                result.create_collections.push(collection.clone());
            }
        }

        if let Some(applied) = self.applied {
            // Collections to delete, carrying their pre-image.
            for collection in applied.collections.values() {
                if !self.desired.has_collection(collection.name()) {
                    result.delete_collections.push(collection.clone());
                }
            }

            // Collections present on both sides.
            for desired in self.desired.collections.values() {
                let Some(old) = applied.get_collection(desired.name()) else {
                    continue;
                };
                if old.kind != desired.kind {
                    // A kind change is a rebuild, not an in-place edit.
                    result.delete_collections.push(old.clone());
                    result.create_collections.push(desired.clone());
                    continue;
                }
                if let Some(change) = diff_collections(old, desired) {
                    result.modify_collections.push(change);
                }
            }
        }

        Ok(result)
    }
}

/// Compare a desired schema against the last applied one.
///
/// Passing `None` for the applied side means no migration history exists
/// yet, and the whole desired schema diffs as creations.
pub fn compare(desired: &Schema, applied: Option<&Schema>) -> MigrateResult<SchemaDiff> {
    let differ = SchemaDiffer::new(desired);
    match applied {
        Some(applied) => differ.with_applied(applied).diff(),
        None => differ.diff(),
    }
}

/// Diff two same-named, same-kind collections.
fn diff_collections(old: &Collection, new: &Collection) -> Option<CollectionChange> {
    let mut change = CollectionChange::new(new.name());

    for field in new.fields.values() {
        match old.get_field(field.name()) {
            None => change.add_fields.push(field.clone()),
            Some(old_field) => {
                if let Some(field_change) = diff_fields(old_field, field) {
                    change.modify_fields.push(field_change);
                }
            }
        }
    }
    for field in old.fields.values() {
        if !new.has_field(field.name()) {
            change.remove_fields.push(field.clone());
        }
    }

    // Index definitions are opaque strings compared as a set.
    for index in &new.indexes {
        if !old.indexes.contains(index) {
            change.add_indexes.push(index.clone());
        }
    }
    for index in &old.indexes {
        if !new.indexes.contains(index) {
            change.remove_indexes.push(index.clone());
        }
    }

    for slot in RuleSlot::ALL {
        let old_rule = old.rules.get(slot);
        let new_rule = new.rules.get(slot);
        if old_rule != new_rule {
            change.rule_changes.push(RuleChange {
                slot,
                old: old_rule.clone(),
                new: new_rule.clone(),
            });
        }
    }

    if change.is_empty() { None } else { Some(change) }
}

/// Diff two same-named fields property by property.
fn diff_fields(old: &Field, new: &Field) -> Option<FieldChange> {
    let old_props = field_properties(old);
    let new_props = field_properties(new);

    let keys: BTreeSet<&String> = old_props.keys().chain(new_props.keys()).collect();
    let mut changes = Vec::new();

    for key in keys {
        let old_value = old_props.get(key).cloned().unwrap_or(Value::Null);
        let new_value = new_props.get(key).cloned().unwrap_or(Value::Null);
        if old_value != new_value {
            changes.push(PropertyChange {
                property: key.clone(),
                old: old_value,
                new: new_value,
            });
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(FieldChange {
            name: new.name().to_string(),
            changes,
        })
    }
}

/// Flatten a field into its wire-form properties, minus the name.
fn field_properties(field: &Field) -> serde_json::Map<String, Value> {
    // Serializing the model cannot fail; the fallback keeps this total.
    let mut props = match serde_json::to_value(field) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    props.remove("name");
    props
}
