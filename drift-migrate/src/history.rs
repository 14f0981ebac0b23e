//! Applied-schema reconstruction from the migration history.
//!
//! The applied schema is never read from a live database. It is rebuilt
//! from the migration files themselves: the newest file with a
//! well-formed checkpoint provides the base, and the apply operations of
//! every newer file are replayed on top. Without any usable checkpoint
//! the whole history replays from an empty schema.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use drift_schema::Schema;

use crate::error::{MigrateError, MigrateResult};
use crate::file::MigrationDirectory;
use crate::ops::apply_operations;
use crate::parse::{extract_checkpoint, parse_operations};

/// A content-addressed snapshot of an applied schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// SHA-256 over the canonical JSON of the schema.
    pub digest: String,
    /// The applied schema at this point of the history.
    pub schema: Schema,
}

impl Checkpoint {
    /// Capture a checkpoint of a schema.
    pub fn capture(schema: &Schema) -> MigrateResult<Self> {
        Ok(Self {
            digest: schema_digest(schema)?,
            schema: schema.clone(),
        })
    }

    /// Whether the digest still matches the embedded schema.
    ///
    /// A mismatch means the checkpoint block was edited by hand; such a
    /// checkpoint is not trusted as a replay base.
    pub fn verify(&self) -> bool {
        schema_digest(&self.schema).is_ok_and(|digest| digest == self.digest)
    }
}

fn schema_digest(schema: &Schema) -> MigrateResult<String> {
    let json = serde_json::to_string(schema)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Reconstructs applied schemas from a migration directory.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: MigrationDirectory,
}

impl HistoryStore {
    /// Create a store over a migration directory.
    pub fn new(dir: MigrationDirectory) -> Self {
        Self { dir }
    }

    /// The underlying migration directory.
    pub fn directory(&self) -> &MigrationDirectory {
        &self.dir
    }

    /// Reconstruct the schema the migration history has applied.
    ///
    /// Returns `Ok(None)` when no migration files exist; that is the
    /// first-run state, which is distinct from an empty schema. A
    /// malformed or tampered checkpoint only costs its shortcut: the
    /// scan falls back to an older checkpoint (or an empty base) and
    /// replays more files. An operation log that cannot be parsed or
    /// replayed is fatal, because every newer schema builds on it.
    pub fn load_applied_schema(&self) -> MigrateResult<Option<Schema>> {
        let files = self.dir.list()?;
        if files.is_empty() {
            debug!("No migration files found; treating as first run");
            return Ok(None);
        }

        let mut base: Option<(usize, Schema)> = None;
        for (idx, file) in files.iter().enumerate().rev() {
            let source = self.dir.read(file)?;
            match extract_checkpoint(&source) {
                Ok(Some(checkpoint)) if checkpoint.verify() => {
                    debug!("Using checkpoint from {}", file.file_name());
                    base = Some((idx, checkpoint.schema));
                    break;
                }
                Ok(Some(_)) => {
                    warn!(
                        "Checkpoint digest mismatch in {}; trying an older checkpoint",
                        file.file_name()
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        "Malformed checkpoint in {}: {}; trying an older checkpoint",
                        file.file_name(),
                        err
                    );
                }
            }
        }

        let (mut schema, tail) = match base {
            Some((idx, schema)) => (schema, &files[idx + 1..]),
            None => (Schema::default(), &files[..]),
        };
        let replayed = tail.len();

        for file in tail {
            let source = self.dir.read(file)?;
            let operations = parse_operations(&source)
                .map_err(|err| MigrateError::corruption(&file.path, err.to_string()))?;
            apply_operations(&mut schema, &operations)
                .map_err(|err| MigrateError::corruption(&file.path, err.to_string()))?;
        }

        info!(
            "Reconstructed applied schema from {} files ({} replayed)",
            files.len(),
            replayed
        );
        Ok(Some(schema))
    }

    /// Audit the whole history against its embedded checkpoints.
    ///
    /// Replays every file from an empty schema and compares the result
    /// after each file with the checkpoint that file embeds.
    pub fn verify(&self) -> MigrateResult<VerifyReport> {
        let files = self.dir.list()?;
        let mut report = VerifyReport {
            checked: files.len(),
            missing_checkpoints: Vec::new(),
            mismatches: Vec::new(),
        };

        let mut schema = Schema::default();
        for file in &files {
            let source = self.dir.read(file)?;
            let operations = parse_operations(&source)
                .map_err(|err| MigrateError::corruption(&file.path, err.to_string()))?;
            apply_operations(&mut schema, &operations)
                .map_err(|err| MigrateError::corruption(&file.path, err.to_string()))?;

            match extract_checkpoint(&source) {
                Ok(Some(checkpoint)) if checkpoint.verify() && checkpoint.schema == schema => {}
                Ok(Some(_)) => report.mismatches.push(file.file_name()),
                Ok(None) => report.missing_checkpoints.push(file.file_name()),
                Err(_) => report.mismatches.push(file.file_name()),
            }
        }

        Ok(report)
    }
}

/// Result of auditing a migration history.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// How many files were checked.
    pub checked: usize,
    /// Files carrying no checkpoint block.
    pub missing_checkpoints: Vec<String>,
    /// Files whose checkpoint disagrees with the replayed schema.
    pub mismatches: Vec<String>,
}

impl VerifyReport {
    /// Whether the audit found anything worth flagging.
    pub fn has_issues(&self) -> bool {
        !self.missing_checkpoints.is_empty() || !self.mismatches.is_empty()
    }

    /// Get a human-readable summary of the audit.
    pub fn summary(&self) -> String {
        if !self.has_issues() {
            format!("{} files checked, all checkpoints consistent", self.checked)
        } else {
            format!(
                "{} files checked, {} without checkpoints, {} mismatched",
                self.checked,
                self.missing_checkpoints.len(),
                self.mismatches.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use drift_schema::{Collection, Field};

    use crate::ops::Operation;
    use crate::script::render_script;

    use super::*;

    fn store_in(temp: &tempfile::TempDir) -> HistoryStore {
        HistoryStore::new(MigrationDirectory::new(temp.path()))
    }

    /// Write a migration whose apply creates the given collection, with
    /// a checkpoint of `after`.
    fn write_create(temp: &tempfile::TempDir, name: &str, collection: Collection, after: &Schema) {
        let apply = vec![Operation::CreateCollection(collection.clone())];
        let revert = vec![Operation::DeleteCollection {
            collection: collection.name().to_string(),
        }];
        let checkpoint = Checkpoint::capture(after).unwrap();
        let source = render_script("00", &apply, &revert, &checkpoint).unwrap();
        std::fs::write(temp.path().join(name), source).unwrap();
    }

    #[test]
    fn test_empty_directory_is_first_run() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&temp).load_applied_schema().unwrap(), None);
    }

    #[test]
    fn test_checkpoint_digest_round_trip() {
        let mut schema = Schema::new();
        schema.add_collection(Collection::base("posts"));

        let checkpoint = Checkpoint::capture(&schema).unwrap();
        assert!(checkpoint.verify());
        assert_eq!(checkpoint.digest.len(), 64);

        let mut tampered = checkpoint.clone();
        tampered.schema.add_collection(Collection::base("sneaky"));
        assert!(!tampered.verify());
    }

    #[test]
    fn test_load_from_newest_checkpoint() {
        let temp = tempfile::tempdir().unwrap();

        let mut after_first = Schema::new();
        after_first.add_collection(Collection::base("posts"));
        write_create(
            &temp,
            "20240101000000_create_posts.js",
            Collection::base("posts"),
            &after_first,
        );

        let mut after_second = after_first.clone();
        after_second.add_collection(Collection::auth("users"));
        write_create(
            &temp,
            "20240102000000_create_users.js",
            Collection::auth("users"),
            &after_second,
        );

        let applied = store_in(&temp).load_applied_schema().unwrap().unwrap();
        assert_eq!(applied, after_second);
    }

    #[test]
    fn test_replay_of_files_after_checkpoint() {
        let temp = tempfile::tempdir().unwrap();

        let mut after_first = Schema::new();
        after_first.add_collection(Collection::base("posts"));
        write_create(
            &temp,
            "20240101000000_create_posts.js",
            Collection::base("posts"),
            &after_first,
        );

        // hand-written follow-up without any checkpoint block
        let source = r#"migrate((db) => {
  db.addField("posts", {"name": "title", "type": "text", "required": true});
}, (db) => {
  db.removeField("posts", "title");
});
"#;
        std::fs::write(temp.path().join("20240102000000_add_title.js"), source).unwrap();

        let applied = store_in(&temp).load_applied_schema().unwrap().unwrap();
        let posts = applied.get_collection("posts").unwrap();
        assert!(posts.get_field("title").unwrap().required);
    }

    #[test]
    fn test_tampered_checkpoint_falls_back() {
        let temp = tempfile::tempdir().unwrap();

        let mut after_first = Schema::new();
        after_first.add_collection(Collection::base("posts"));
        write_create(
            &temp,
            "20240101000000_create_posts.js",
            Collection::base("posts"),
            &after_first,
        );

        let mut after_second = after_first.clone();
        after_second.add_collection(Collection::auth("users"));
        let checkpoint = Checkpoint::capture(&after_second).unwrap();
        let source = render_script(
            "00",
            &[Operation::CreateCollection(Collection::auth("users"))],
            &[Operation::DeleteCollection {
                collection: "users".to_string(),
            }],
            &checkpoint,
        )
        .unwrap();
        // flip the digest so the newest checkpoint cannot be trusted
        let tampered = source.replace(&checkpoint.digest, &"0".repeat(64));
        std::fs::write(temp.path().join("20240102000000_create_users.js"), tampered).unwrap();

        // the older checkpoint is used and the newest file is replayed
        let applied = store_in(&temp).load_applied_schema().unwrap().unwrap();
        assert_eq!(applied, after_second);
    }

    #[test]
    fn test_full_replay_without_checkpoints() {
        let temp = tempfile::tempdir().unwrap();

        let first = r#"migrate((db) => {
  db.createCollection({"name": "posts", "type": "base"});
}, (db) => {
  db.deleteCollection("posts");
});
"#;
        let second = r#"migrate((db) => {
  db.addIndex("posts", "CREATE INDEX idx ON posts (title)");
}, (db) => {
  db.removeIndex("posts", "CREATE INDEX idx ON posts (title)");
});
"#;
        std::fs::write(temp.path().join("20240101000000_create_posts.js"), first).unwrap();
        std::fs::write(temp.path().join("20240102000000_add_index.js"), second).unwrap();

        let applied = store_in(&temp).load_applied_schema().unwrap().unwrap();
        assert_eq!(applied.get_collection("posts").unwrap().indexes.len(), 1);
    }

    #[test]
    fn test_unparsable_tail_file_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join("20240101000000_bad.js"),
            "migrate((db) => {\n  db.scramble();\n}, (db) => {});\n",
        )
        .unwrap();

        let err = store_in(&temp).load_applied_schema().unwrap_err();
        match err {
            MigrateError::CheckpointCorruption { path, reason } => {
                assert!(path.ends_with("20240101000000_bad.js"));
                assert!(reason.contains("scramble"));
            }
            other => panic!("expected CheckpointCorruption, got {:?}", other),
        }
    }

    #[test]
    fn test_files_behind_a_checkpoint_are_not_parsed() {
        let temp = tempfile::tempdir().unwrap();

        // an unparsable old file, shadowed by a newer checkpoint
        std::fs::write(
            temp.path().join("20240101000000_legacy.js"),
            "this is not a migration at all",
        )
        .unwrap();

        let mut after = Schema::new();
        after.add_collection(Collection::base("posts"));
        write_create(
            &temp,
            "20240102000000_create_posts.js",
            Collection::base("posts"),
            &after,
        );

        let applied = store_in(&temp).load_applied_schema().unwrap().unwrap();
        assert_eq!(applied, after);
    }

    #[test]
    fn test_replay_failure_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        // deletes a collection that never existed
        std::fs::write(
            temp.path().join("20240101000000_drop_ghost.js"),
            "migrate((db) => {\n  db.deleteCollection(\"ghost\");\n}, (db) => {});\n",
        )
        .unwrap();

        let err = store_in(&temp).load_applied_schema().unwrap_err();
        assert!(matches!(err, MigrateError::CheckpointCorruption { .. }));
    }

    #[test]
    fn test_verify_reports_consistent_history() {
        let temp = tempfile::tempdir().unwrap();

        let mut after = Schema::new();
        after.add_collection(Collection::base("posts"));
        write_create(
            &temp,
            "20240101000000_create_posts.js",
            Collection::base("posts"),
            &after,
        );

        let report = store_in(&temp).verify().unwrap();
        assert_eq!(report.checked, 1);
        assert!(!report.has_issues());
        assert!(report.summary().contains("all checkpoints consistent"));
    }

    #[test]
    fn test_verify_flags_missing_and_mismatched() {
        let temp = tempfile::tempdir().unwrap();

        // checkpoint claims a schema the operations do not produce
        let mut wrong = Schema::new();
        wrong.add_collection(Collection::base("posts").field(Field::text("ghost_field")));
        write_create(
            &temp,
            "20240101000000_create_posts.js",
            Collection::base("posts"),
            &wrong,
        );

        // no checkpoint at all
        std::fs::write(
            temp.path().join("20240102000000_add_index.js"),
            "migrate((db) => {\n  db.addIndex(\"posts\", \"CREATE INDEX idx ON posts (title)\");\n}, (db) => {\n  db.removeIndex(\"posts\", \"CREATE INDEX idx ON posts (title)\");\n});\n",
        )
        .unwrap();

        let report = store_in(&temp).verify().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.mismatches, vec!["20240101000000_create_posts.js"]);
        assert_eq!(report.missing_checkpoints, vec!["20240102000000_add_index.js"]);
        assert!(report.has_issues());
    }
}
