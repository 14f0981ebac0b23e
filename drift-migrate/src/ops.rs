//! Migration operations and their replay against a schema.
//!
//! An [`Operation`] is one call in a migration script's apply or revert
//! routine. Replaying a file's apply operations in order against the
//! previous schema yields the next applied schema; no live database is
//! involved.

use serde_json::{Map, Value};

use drift_schema::{Collection, Field, Rule, RuleSlot, Schema};

use crate::error::{MigrateError, MigrateResult};

/// A single schema-changing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a collection from its full definition.
    CreateCollection(Collection),
    /// Delete a collection by name.
    DeleteCollection {
        /// Collection name.
        collection: String,
    },
    /// Add a field from its full definition.
    AddField {
        /// Collection name.
        collection: String,
        /// Field definition.
        field: Field,
    },
    /// Remove a field by name.
    RemoveField {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
    },
    /// Patch properties of an existing field.
    ///
    /// The patch holds wire-form properties; a `null` value removes the
    /// property so it falls back to its default.
    UpdateField {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
        /// Property patch.
        patch: Map<String, Value>,
    },
    /// Add an index definition.
    AddIndex {
        /// Collection name.
        collection: String,
        /// Index definition string.
        index: String,
    },
    /// Remove an index definition.
    RemoveIndex {
        /// Collection name.
        collection: String,
        /// Index definition string.
        index: String,
    },
    /// Set an access rule slot.
    SetRule {
        /// Collection name.
        collection: String,
        /// Which slot to set.
        slot: RuleSlot,
        /// The new rule, including [`Rule::Unset`] to clear the slot.
        rule: Rule,
    },
}

impl Operation {
    /// Replay this operation against a schema.
    pub fn apply(&self, schema: &mut Schema) -> MigrateResult<()> {
        match self {
            Self::CreateCollection(collection) => {
                if schema.has_collection(collection.name()) {
                    return Err(MigrateError::replay(format!(
                        "create collection `{}`: already exists",
                        collection.name()
                    )));
                }
                schema.add_collection(collection.clone());
                Ok(())
            }
            Self::DeleteCollection { collection } => {
                if schema.remove_collection(collection).is_none() {
                    return Err(MigrateError::replay(format!(
                        "delete collection `{collection}`: not found"
                    )));
                }
                Ok(())
            }
            Self::AddField { collection, field } => {
                let target = get_collection(schema, collection)?;
                if target.has_field(field.name()) {
                    return Err(MigrateError::replay(format!(
                        "add field `{}.{}`: already exists",
                        collection,
                        field.name()
                    )));
                }
                target.fields.insert(field.name.clone(), field.clone());
                Ok(())
            }
            Self::RemoveField { collection, field } => {
                let target = get_collection(schema, collection)?;
                if target.fields.shift_remove(field.as_str()).is_none() {
                    return Err(MigrateError::replay(format!(
                        "remove field `{collection}.{field}`: not found"
                    )));
                }
                Ok(())
            }
            Self::UpdateField {
                collection,
                field,
                patch,
            } => update_field(schema, collection, field, patch),
            Self::AddIndex { collection, index } => {
                let target = get_collection(schema, collection)?;
                if target.indexes.contains(index) {
                    return Err(MigrateError::replay(format!(
                        "add index on `{collection}`: already present: {index}"
                    )));
                }
                target.indexes.push(index.clone());
                Ok(())
            }
            Self::RemoveIndex { collection, index } => {
                let target = get_collection(schema, collection)?;
                let Some(pos) = target.indexes.iter().position(|i| i == index) else {
                    return Err(MigrateError::replay(format!(
                        "remove index on `{collection}`: not present: {index}"
                    )));
                };
                target.indexes.remove(pos);
                Ok(())
            }
            Self::SetRule {
                collection,
                slot,
                rule,
            } => {
                let target = get_collection(schema, collection)?;
                target.rules.set(*slot, rule.clone());
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateCollection(c) => write!(f, "create collection `{}`", c.name()),
            Self::DeleteCollection { collection } => {
                write!(f, "delete collection `{collection}`")
            }
            Self::AddField { collection, field } => {
                write!(f, "add field `{}.{}`", collection, field.name())
            }
            Self::RemoveField { collection, field } => {
                write!(f, "remove field `{collection}.{field}`")
            }
            Self::UpdateField {
                collection, field, ..
            } => write!(f, "update field `{collection}.{field}`"),
            Self::AddIndex { collection, .. } => write!(f, "add index on `{collection}`"),
            Self::RemoveIndex { collection, .. } => write!(f, "remove index on `{collection}`"),
            Self::SetRule {
                collection, slot, ..
            } => write!(f, "set {slot} rule on `{collection}`"),
        }
    }
}

/// Replay a sequence of operations in order.
pub fn apply_operations(schema: &mut Schema, operations: &[Operation]) -> MigrateResult<()> {
    for operation in operations {
        operation.apply(schema)?;
    }
    Ok(())
}

fn get_collection<'a>(
    schema: &'a mut Schema,
    collection: &str,
) -> MigrateResult<&'a mut Collection> {
    schema
        .get_collection_mut(collection)
        .ok_or_else(|| MigrateError::replay(format!("collection `{collection}` not found")))
}

/// Patch a field through its wire form.
fn update_field(
    schema: &mut Schema,
    collection: &str,
    field: &str,
    patch: &Map<String, Value>,
) -> MigrateResult<()> {
    let target = get_collection(schema, collection)?;
    let Some(existing) = target.get_field(field) else {
        return Err(MigrateError::replay(format!(
            "update field `{collection}.{field}`: not found"
        )));
    };

    let mut props = match serde_json::to_value(existing)? {
        Value::Object(map) => map,
        _ => {
            return Err(MigrateError::replay(format!(
                "update field `{collection}.{field}`: field has no object form"
            )));
        }
    };
    for (key, value) in patch {
        if value.is_null() {
            props.remove(key);
        } else {
            props.insert(key.clone(), value.clone());
        }
    }

    let updated: Field = serde_json::from_value(Value::Object(props)).map_err(|err| {
        MigrateError::replay(format!("update field `{collection}.{field}`: {err}"))
    })?;
    if updated.name() != field {
        return Err(MigrateError::replay(format!(
            "update field `{collection}.{field}`: a patch cannot change the field name"
        )));
    }

    // Insert on an existing key keeps the field's position.
    target.fields.insert(updated.name.clone(), updated);
    Ok(())
}
