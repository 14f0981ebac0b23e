//! Turning a diff into migration files on disk.
//!
//! Generation is the only writing step of the engine. Everything before
//! it is pure: the diff is split into stages, each stage becomes one
//! script with an apply routine, a revert routine that is its structural
//! inverse in reverse order, and a checkpoint of the cumulative schema
//! after the stage. Files are published atomically, so an interrupted
//! run leaves only complete migrations behind.

use std::path::PathBuf;

use serde_json::Map;
use tracing::{debug, info};

use crate::destructive::{DestructivePolicy, classify, requires_override};
use crate::diff::SchemaDiff;
use crate::error::{MigrateError, MigrateResult};
use crate::file::{MigrationDirectory, next_migration_id};
use crate::history::{Checkpoint, HistoryStore};
use crate::ops::{Operation, apply_operations};
use crate::parse::extract_fingerprint;
use crate::script::{render_script, slug_for};
use crate::stage::split_stages;

/// Options of a single generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory the migration files are written to.
    pub migrations_dir: PathBuf,
    /// Write despite destructive changes and duplicate fingerprints.
    pub force: bool,
    /// Which severities refuse to generate without [`force`](Self::force).
    pub policy: DestructivePolicy,
}

impl GenerateOptions {
    /// Create options targeting a migration directory.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            force: false,
            policy: DestructivePolicy::new(),
        }
    }

    /// Set the force flag.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the destructive-change policy.
    pub fn policy(mut self, policy: DestructivePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// What a generation run produced.
#[derive(Debug, Clone, Default)]
pub struct GenerateResult {
    /// Paths of the files written, in apply order.
    pub files: Vec<PathBuf>,
    /// Fingerprint of the diff the files carry.
    pub fingerprint: Option<String>,
    /// The run was suppressed because the newest migration already
    /// carries this fingerprint.
    pub duplicate: bool,
}

impl GenerateResult {
    /// Whether any file was written.
    pub fn has_changes(&self) -> bool {
        !self.files.is_empty()
    }

    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        if self.duplicate {
            "No files written; the newest migration already covers this change".to_string()
        } else if self.files.is_empty() {
            "No schema changes to migrate".to_string()
        } else {
            format!("{} migration file(s) written", self.files.len())
        }
    }
}

/// Generate migration files for a diff.
///
/// The applied schema is reconstructed from the directory itself, so
/// the checkpoint of each written file reflects the cumulative state
/// after that file. Refuses on gated destructive changes and suppresses
/// a diff whose fingerprint matches the newest existing file; the force
/// option lifts both refusals. An empty diff writes nothing and is not
/// an error.
pub fn generate(diff: &SchemaDiff, options: &GenerateOptions) -> MigrateResult<GenerateResult> {
    if diff.is_empty() {
        debug!("Diff is empty; nothing to generate");
        return Ok(GenerateResult::default());
    }

    let destructive = classify(diff);
    if !options.force && requires_override(&destructive, &options.policy) {
        return Err(MigrateError::DestructiveChanges(destructive));
    }

    let fingerprint = diff.fingerprint()?;
    let dir = MigrationDirectory::new(&options.migrations_dir);
    let existing = dir.list()?;

    if !options.force
        && let Some(newest) = existing.last()
    {
        let source = dir.read(newest)?;
        if extract_fingerprint(&source).as_deref() == Some(fingerprint.as_str()) {
            info!(
                "Newest migration {} already covers this change; skipping",
                newest.file_name()
            );
            return Ok(GenerateResult {
                files: Vec::new(),
                fingerprint: Some(fingerprint),
                duplicate: true,
            });
        }
    }

    let mut schema = HistoryStore::new(dir.clone())
        .load_applied_schema()?
        .unwrap_or_default();

    dir.ensure()?;
    let mut last_id = existing.last().map(|file| file.id.clone());
    let mut written = Vec::new();

    for stage in split_stages(diff) {
        let (apply, revert) = stage_operations(&stage);
        apply_operations(&mut schema, &apply)?;
        let checkpoint = Checkpoint::capture(&schema)?;
        let source = render_script(&fingerprint, &apply, &revert, &checkpoint)?;

        let id = next_migration_id(last_id.as_deref());
        let file_name = format!("{}_{}.js", id, slug_for(&stage));
        let path = dir.write_atomic(&file_name, &source)?;
        info!("Wrote migration {}", file_name);
        last_id = Some(id);
        written.push(path);
    }

    Ok(GenerateResult {
        files: written,
        fingerprint: Some(fingerprint),
        duplicate: false,
    })
}

/// Build the apply operations of a stage and the revert operations
/// that undo them.
///
/// Apply runs in phases: index and field removals first, then
/// collection deletes, then creates (already in dependency order),
/// then field additions, property updates, index additions, and rule
/// changes. Deletes precede creates so a kind change, which the differ
/// expresses as a delete and a create of the same name, replays
/// cleanly. The revert list is the inverse of each operation, in
/// reverse order.
fn stage_operations(stage: &SchemaDiff) -> (Vec<Operation>, Vec<Operation>) {
    let mut pairs: Vec<(Operation, Operation)> = Vec::new();

    for change in &stage.modify_collections {
        for index in &change.remove_indexes {
            pairs.push((
                Operation::RemoveIndex {
                    collection: change.name.clone(),
                    index: index.clone(),
                },
                Operation::AddIndex {
                    collection: change.name.clone(),
                    index: index.clone(),
                },
            ));
        }
        for field in &change.remove_fields {
            pairs.push((
                Operation::RemoveField {
                    collection: change.name.clone(),
                    field: field.name().to_string(),
                },
                Operation::AddField {
                    collection: change.name.clone(),
                    field: field.clone(),
                },
            ));
        }
    }

    for collection in &stage.delete_collections {
        pairs.push((
            Operation::DeleteCollection {
                collection: collection.name().to_string(),
            },
            Operation::CreateCollection(collection.clone()),
        ));
    }
    for collection in &stage.create_collections {
        pairs.push((
            Operation::CreateCollection(collection.clone()),
            Operation::DeleteCollection {
                collection: collection.name().to_string(),
            },
        ));
    }

    for change in &stage.modify_collections {
        for field in &change.add_fields {
            pairs.push((
                Operation::AddField {
                    collection: change.name.clone(),
                    field: field.clone(),
                },
                Operation::RemoveField {
                    collection: change.name.clone(),
                    field: field.name().to_string(),
                },
            ));
        }
        for field_change in &change.modify_fields {
            let mut forward = Map::new();
            let mut backward = Map::new();
            for property in &field_change.changes {
                forward.insert(property.property.clone(), property.new.clone());
                backward.insert(property.property.clone(), property.old.clone());
            }
            pairs.push((
                Operation::UpdateField {
                    collection: change.name.clone(),
                    field: field_change.name.clone(),
                    patch: forward,
                },
                Operation::UpdateField {
                    collection: change.name.clone(),
                    field: field_change.name.clone(),
                    patch: backward,
                },
            ));
        }
        for index in &change.add_indexes {
            pairs.push((
                Operation::AddIndex {
                    collection: change.name.clone(),
                    index: index.clone(),
                },
                Operation::RemoveIndex {
                    collection: change.name.clone(),
                    index: index.clone(),
                },
            ));
        }
        for rule_change in &change.rule_changes {
            pairs.push((
                Operation::SetRule {
                    collection: change.name.clone(),
                    slot: rule_change.slot,
                    rule: rule_change.new.clone(),
                },
                Operation::SetRule {
                    collection: change.name.clone(),
                    slot: rule_change.slot,
                    rule: rule_change.old.clone(),
                },
            ));
        }
    }

    let apply = pairs.iter().map(|(forward, _)| forward.clone()).collect();
    let revert = pairs.into_iter().rev().map(|(_, inverse)| inverse).collect();
    (apply, revert)
}
