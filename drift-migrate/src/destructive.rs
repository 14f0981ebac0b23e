//! Destructive change classification and diff filtering.
//!
//! Walks a [`SchemaDiff`] and flags every element that can lose data or
//! tighten access when applied. The policy is conservative and
//! deliberately non-exhaustive: new categories can be added without
//! touching the differ or the generator.

use regex_lite::Regex;
use serde_json::Value;

use drift_schema::{Rule, RuleSlot};

use crate::diff::{FieldChange, SchemaDiff};
use crate::error::{MigrateError, MigrateResult};

/// How risky a destructive change is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Reversible or metadata-only loss.
    Low,
    /// Can reject or reshape existing records.
    Medium,
    /// Loses stored data outright.
    High,
}

impl Severity {
    /// The canonical lowercase name of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of destructive change was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCategory {
    /// A collection and all its records go away.
    CollectionDeletion,
    /// A field and its stored values go away.
    FieldRemoval,
    /// A field switches to a different type.
    TypeChange,
    /// A field keeps its type but its constraints tighten.
    TypeNarrowing,
    /// An existing optional field becomes required.
    RequiredTightening,
    /// An index definition is dropped.
    IndexRemoval,
    /// An access rule becomes more restrictive.
    RuleTightening,
}

impl ChangeCategory {
    /// The canonical kebab-case name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionDeletion => "collection-deletion",
            Self::FieldRemoval => "field-removal",
            Self::TypeChange => "type-change",
            Self::TypeNarrowing => "type-narrowing",
            Self::RequiredTightening => "required-tightening",
            Self::IndexRemoval => "index-removal",
            Self::RuleTightening => "rule-tightening",
        }
    }
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single flagged change.
#[derive(Debug, Clone, PartialEq)]
pub struct DestructiveChange {
    /// How risky the change is.
    pub severity: Severity,
    /// What kind of change it is.
    pub category: ChangeCategory,
    /// Human-readable description for review output.
    pub description: String,
    /// The diff element the change came from.
    pub origin: DiffOrigin,
}

impl std::fmt::Display for DestructiveChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.description)
    }
}

/// Points back at the diff element a destructive change came from, so the
/// filter can strip exactly that element.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOrigin {
    /// A collection deletion.
    CollectionDelete {
        /// Collection name.
        collection: String,
    },
    /// A field removal.
    FieldRemove {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
    },
    /// A changed field property.
    FieldChange {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
        /// Wire-form property name.
        property: String,
    },
    /// An index removal.
    IndexRemove {
        /// Collection name.
        collection: String,
        /// Index definition string.
        index: String,
    },
    /// A rule change.
    RuleChange {
        /// Collection name.
        collection: String,
        /// Which rule slot.
        slot: RuleSlot,
    },
}

/// When destructive changes block generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DestructivePolicy {
    /// Gate medium-severity changes behind the override as well.
    pub gate_medium: bool,
}

impl DestructivePolicy {
    /// Create the default policy: only high severity needs an override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate medium-severity changes behind the override as well.
    pub fn gate_medium(mut self, gate: bool) -> Self {
        self.gate_medium = gate;
        self
    }
}

/// Classify every destructive element of a diff.
pub fn classify(diff: &SchemaDiff) -> Vec<DestructiveChange> {
    let mut changes = Vec::new();

    for collection in &diff.delete_collections {
        changes.push(DestructiveChange {
            severity: Severity::High,
            category: ChangeCategory::CollectionDeletion,
            description: format!(
                "delete collection `{}` and all of its records",
                collection.name()
            ),
            origin: DiffOrigin::CollectionDelete {
                collection: collection.name().to_string(),
            },
        });
    }

    for cm in &diff.modify_collections {
        for field in &cm.remove_fields {
            changes.push(DestructiveChange {
                severity: Severity::High,
                category: ChangeCategory::FieldRemoval,
                description: format!(
                    "remove field `{}.{}` and its stored values",
                    cm.name,
                    field.name()
                ),
                origin: DiffOrigin::FieldRemove {
                    collection: cm.name.clone(),
                    field: field.name().to_string(),
                },
            });
        }

        for field_change in &cm.modify_fields {
            classify_field_change(&cm.name, field_change, &mut changes);
        }

        for index in &cm.remove_indexes {
            changes.push(DestructiveChange {
                severity: Severity::Low,
                category: ChangeCategory::IndexRemoval,
                description: format!("drop index on `{}`: {}", cm.name, index),
                origin: DiffOrigin::IndexRemove {
                    collection: cm.name.clone(),
                    index: index.clone(),
                },
            });
        }

        for rule_change in &cm.rule_changes {
            if openness(&rule_change.new) < openness(&rule_change.old) {
                changes.push(DestructiveChange {
                    severity: Severity::Low,
                    category: ChangeCategory::RuleTightening,
                    description: format!(
                        "tighten {} rule on `{}` from {} to {}",
                        rule_change.slot, cm.name, rule_change.old, rule_change.new
                    ),
                    origin: DiffOrigin::RuleChange {
                        collection: cm.name.clone(),
                        slot: rule_change.slot,
                    },
                });
            }
        }
    }

    changes
}

/// Classify the property changes of one field.
fn classify_field_change(
    collection: &str,
    field_change: &FieldChange,
    changes: &mut Vec<DestructiveChange>,
) {
    let type_change = field_change
        .changes
        .iter()
        .find(|c| c.property == "type");

    if let Some(change) = type_change {
        // Option changes across a type switch are not comparable, so the
        // switch itself is the only flag this field gets.
        changes.push(DestructiveChange {
            severity: Severity::Medium,
            category: ChangeCategory::TypeChange,
            description: format!(
                "change type of `{}.{}` from {} to {}",
                collection,
                field_change.name,
                render(&change.old),
                render(&change.new)
            ),
            origin: DiffOrigin::FieldChange {
                collection: collection.to_string(),
                field: field_change.name.clone(),
                property: "type".to_string(),
            },
        });
        return;
    }

    for change in &field_change.changes {
        let narrowed = match change.property.as_str() {
            "required" => {
                if change.old == Value::Bool(false) && change.new == Value::Bool(true) {
                    changes.push(DestructiveChange {
                        severity: Severity::Medium,
                        category: ChangeCategory::RequiredTightening,
                        description: format!(
                            "make existing field `{}.{}` required without a default",
                            collection, field_change.name
                        ),
                        origin: DiffOrigin::FieldChange {
                            collection: collection.to_string(),
                            field: field_change.name.clone(),
                            property: "required".to_string(),
                        },
                    });
                }
                false
            }
            "max" | "maxSelect" | "maxSize" => upper_bound_tightened(&change.old, &change.new),
            "min" | "minSelect" => lower_bound_tightened(&change.old, &change.new),
            "onlyInt" => change.old == Value::Bool(false) && change.new == Value::Bool(true),
            "values" => values_removed(&change.old, &change.new),
            _ => false,
        };

        if narrowed {
            changes.push(DestructiveChange {
                severity: Severity::Medium,
                category: ChangeCategory::TypeNarrowing,
                description: format!(
                    "tighten `{}` on field `{}.{}` from {} to {}",
                    change.property,
                    collection,
                    field_change.name,
                    render(&change.old),
                    render(&change.new)
                ),
                origin: DiffOrigin::FieldChange {
                    collection: collection.to_string(),
                    field: field_change.name.clone(),
                    property: change.property.clone(),
                },
            });
        }
    }
}

/// Whether an upper bound was introduced or lowered.
fn upper_bound_tightened(old: &Value, new: &Value) -> bool {
    if new.is_null() {
        return false;
    }
    if old.is_null() {
        return true;
    }
    match (old.as_f64(), new.as_f64()) {
        (Some(old), Some(new)) => new < old,
        _ => false,
    }
}

/// Whether a lower bound was introduced or raised.
fn lower_bound_tightened(old: &Value, new: &Value) -> bool {
    if new.is_null() {
        return false;
    }
    if old.is_null() {
        return true;
    }
    match (old.as_f64(), new.as_f64()) {
        (Some(old), Some(new)) => new > old,
        _ => false,
    }
}

/// Whether any previously allowed select value disappeared.
fn values_removed(old: &Value, new: &Value) -> bool {
    let (Some(old), Some(new)) = (old.as_array(), new.as_array()) else {
        return false;
    };
    old.iter().any(|value| !new.contains(value))
}

/// How much access a rule grants, for ordering tightness.
///
/// Expression-to-expression changes rank equal; whether one filter is
/// stricter than another is undecidable without evaluating them.
fn openness(rule: &Rule) -> u8 {
    match rule {
        Rule::Filter(expr) if expr.is_empty() => 2,
        Rule::Filter(_) => 1,
        Rule::Locked | Rule::Unset => 0,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a change set needs an explicit override under a policy.
pub fn requires_override(changes: &[DestructiveChange], policy: &DestructivePolicy) -> bool {
    let threshold = if policy.gate_medium {
        Severity::Medium
    } else {
        Severity::High
    };
    changes.iter().any(|change| change.severity >= threshold)
}

/// Options for narrowing a diff before generation.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Glob patterns matched against collection and field names. Empty
    /// means everything passes.
    pub name_patterns: Vec<String>,
    /// Drop destructive elements instead of gating on them.
    pub skip_destructive: bool,
}

impl FilterOptions {
    /// Create options that keep the whole diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name pattern.
    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_patterns.push(pattern.into());
        self
    }

    /// Drop destructive elements instead of gating on them.
    pub fn skip_destructive(mut self, skip: bool) -> Self {
        self.skip_destructive = skip;
        self
    }
}

/// Narrow a diff by name patterns, then strip destructive elements.
///
/// The passes run in that order: a destructive change excluded by name
/// never blocks generation of the rest.
pub fn filter(diff: &SchemaDiff, options: &FilterOptions) -> MigrateResult<SchemaDiff> {
    let mut filtered = diff.clone();

    if !options.name_patterns.is_empty() {
        let patterns = options
            .name_patterns
            .iter()
            .map(|pattern| glob_to_regex(pattern))
            .collect::<MigrateResult<Vec<_>>>()?;
        let matches = |name: &str| patterns.iter().any(|re| re.is_match(name));

        filtered.create_collections.retain(|c| matches(c.name()));
        filtered.delete_collections.retain(|c| matches(c.name()));
        filtered.modify_collections.retain_mut(|cm| {
            if matches(&cm.name) {
                return true;
            }
            // The collection itself was not selected; keep only field
            // entries whose own name matches.
            cm.add_fields.retain(|f| matches(f.name()));
            cm.remove_fields.retain(|f| matches(f.name()));
            cm.modify_fields.retain(|fc| matches(&fc.name));
            cm.add_indexes.clear();
            cm.remove_indexes.clear();
            cm.rule_changes.clear();
            !cm.is_empty()
        });
    }

    if options.skip_destructive {
        let destructive = classify(&filtered);
        strip(&mut filtered, &destructive);
    }

    Ok(filtered)
}

/// Remove the diff elements named by a set of destructive changes.
fn strip(diff: &mut SchemaDiff, changes: &[DestructiveChange]) {
    for change in changes {
        match &change.origin {
            DiffOrigin::CollectionDelete { collection } => {
                diff.delete_collections.retain(|c| c.name() != collection);
            }
            DiffOrigin::FieldRemove { collection, field } => {
                if let Some(cm) = find_change(diff, collection) {
                    cm.remove_fields.retain(|f| f.name() != field);
                }
            }
            DiffOrigin::FieldChange {
                collection,
                field,
                property,
            } => {
                if let Some(cm) = find_change(diff, collection) {
                    if property == "type" {
                        // Leftover option deltas make no sense without the
                        // type switch itself.
                        cm.modify_fields.retain(|fc| &fc.name != field);
                    } else if let Some(fc) = cm.modify_fields.iter_mut().find(|fc| &fc.name == field)
                    {
                        fc.changes.retain(|pc| &pc.property != property);
                    }
                }
            }
            DiffOrigin::IndexRemove { collection, index } => {
                if let Some(cm) = find_change(diff, collection) {
                    cm.remove_indexes.retain(|i| i != index);
                }
            }
            DiffOrigin::RuleChange { collection, slot } => {
                if let Some(cm) = find_change(diff, collection) {
                    cm.rule_changes.retain(|rc| rc.slot != *slot);
                }
            }
        }
    }

    diff.modify_collections.retain_mut(|cm| {
        cm.modify_fields.retain(|fc| !fc.changes.is_empty());
        !cm.is_empty()
    });
}

fn find_change<'a>(
    diff: &'a mut SchemaDiff,
    collection: &str,
) -> Option<&'a mut crate::diff::CollectionChange> {
    diff.modify_collections
        .iter_mut()
        .find(|cm| cm.name == collection)
}

fn glob_to_regex(pattern: &str) -> MigrateResult<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c if "\\.+()[]{}|^$".contains(c) => {
                expr.push('\\');
                expr.push(c);
            }
            c => expr.push(c),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|err| MigrateError::config(format!("invalid name pattern `{pattern}`: {err}")))
}
