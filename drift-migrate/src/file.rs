//! Migration files and the directory that holds them.
//!
//! File names follow `<id>_<slug>.js` where the id is a 14-digit UTC
//! timestamp (`YYYYMMDDHHMMSS`). Lexicographic order of ids is
//! chronological order, which is the replay order.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime, Utc};
use tempfile::NamedTempFile;

use crate::error::{MigrateError, MigrateResult};

/// Timestamp format of migration ids.
const ID_FORMAT: &str = "%Y%m%d%H%M%S";
/// Length of a migration id.
const ID_LEN: usize = 14;

/// A migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// 14-digit timestamp id.
    pub id: String,
    /// Human-readable slug.
    pub slug: String,
    /// Full path of the file.
    pub path: PathBuf,
}

impl MigrationFile {
    /// The file name, id and slug joined.
    pub fn file_name(&self) -> String {
        format!("{}_{}.js", self.id, self.slug)
    }
}

impl std::fmt::Display for MigrationFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Split a migration file name into id and slug.
pub(crate) fn parse_file_name(name: &str) -> Option<(&str, &str)> {
    let stem = name.strip_suffix(".js")?;
    let (id, rest) = stem.split_at_checked(ID_LEN)?;
    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let slug = rest.strip_prefix('_')?;
    if slug.is_empty()
        || !slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return None;
    }
    Some((id, slug))
}

/// Allocate the id for the next migration file.
///
/// Ids are strictly increasing: when the wall clock has not moved past
/// the newest existing id (same-second generation, or a clock that
/// stepped backwards), the newest id plus one second is used instead.
pub fn next_migration_id(last: Option<&str>) -> String {
    let candidate = Utc::now().format(ID_FORMAT).to_string();
    match last {
        Some(last) if candidate.as_str() <= last => bump_id(last),
        _ => candidate,
    }
}

fn bump_id(last: &str) -> String {
    if let Ok(stamp) = NaiveDateTime::parse_from_str(last, ID_FORMAT)
        && let Some(next) = stamp.checked_add_signed(Duration::seconds(1))
    {
        return next.format(ID_FORMAT).to_string();
    }
    // not a decodable timestamp; fall back to a plain counter
    match last.parse::<u64>() {
        Ok(n) => format!("{:0width$}", n + 1, width = ID_LEN),
        Err(_) => Utc::now().format(ID_FORMAT).to_string(),
    }
}

/// The directory migration files live in.
#[derive(Debug, Clone)]
pub struct MigrationDirectory {
    dir: PathBuf,
}

impl MigrationDirectory {
    /// Create a handle for a directory. Nothing is touched on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> MigrateResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|err| MigrateError::io(&self.dir, err))
    }

    /// List migration files in ascending id order.
    ///
    /// A missing directory lists as empty; that is the first-run state.
    /// Files without a `.js` extension are ignored, but a `.js` file
    /// whose name does not follow the convention is an error.
    pub fn list(&self) -> MigrateResult<Vec<MigrationFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            std::fs::read_dir(&self.dir).map_err(|err| MigrateError::io(&self.dir, err))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MigrateError::io(&self.dir, err))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("js") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some((id, slug)) = parse_file_name(name) else {
                return Err(MigrateError::invalid_migration(format!(
                    "unrecognized migration file name `{name}`; expected `<14-digit id>_<slug>.js`"
                )));
            };
            files.push(MigrationFile {
                id: id.to_string(),
                slug: slug.to_string(),
                path,
            });
        }

        files.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.slug.cmp(&b.slug)));
        Ok(files)
    }

    /// Read a migration file's contents.
    pub fn read(&self, file: &MigrationFile) -> MigrateResult<String> {
        std::fs::read_to_string(&file.path).map_err(|err| MigrateError::io(&file.path, err))
    }

    /// Write a migration file atomically.
    ///
    /// The contents go to a temporary file in the same directory first
    /// and are renamed into place, so a crash mid-write never leaves a
    /// half-written migration behind.
    pub fn write_atomic(&self, file_name: &str, contents: &str) -> MigrateResult<PathBuf> {
        let path = self.dir.join(file_name);
        let mut temp =
            NamedTempFile::new_in(&self.dir).map_err(|err| MigrateError::io(&self.dir, err))?;
        temp.write_all(contents.as_bytes())
            .map_err(|err| MigrateError::io(&path, err))?;
        temp.persist(&path)
            .map_err(|err| MigrateError::io(&path, err.error))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("20240101120000_create_posts.js"),
            Some(("20240101120000", "create_posts"))
        );
        assert_eq!(parse_file_name("20240101120000_x.js"), Some(("20240101120000", "x")));

        // wrong extension, short id, bad separator, bad slug characters
        assert_eq!(parse_file_name("20240101120000_create_posts.sql"), None);
        assert_eq!(parse_file_name("2024_create_posts.js"), None);
        assert_eq!(parse_file_name("20240101120000create_posts.js"), None);
        assert_eq!(parse_file_name("20240101120000_Create-Posts.js"), None);
        assert_eq!(parse_file_name("20240101120000_.js"), None);
        assert_eq!(parse_file_name("2024010112000a_posts.js"), None);
    }

    #[test]
    fn test_next_id_is_a_timestamp() {
        let id = next_migration_id(None);
        assert_eq!(id.len(), 14);
        assert!(id.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_next_id_stays_ahead_of_newest() {
        // a newest id in the far future forces the bump path
        assert_eq!(
            next_migration_id(Some("20990615101530")),
            "20990615101531"
        );
        // second rollover carries into the date
        assert_eq!(
            next_migration_id(Some("20991231235959")),
            "21000101000000"
        );
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = MigrationDirectory::new("/nonexistent/for/sure");
        assert!(dir.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let temp = tempfile::tempdir().unwrap();
        let dir = MigrationDirectory::new(temp.path());

        std::fs::write(temp.path().join("20240202000000_second.js"), "").unwrap();
        std::fs::write(temp.path().join("20240101000000_first.js"), "").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();
        std::fs::write(temp.path().join(".gitkeep"), "").unwrap();

        let files = dir.list().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].slug, "first");
        assert_eq!(files[1].slug, "second");
        assert_eq!(files[0].file_name(), "20240101000000_first.js");
    }

    #[test]
    fn test_list_rejects_malformed_js_names() {
        let temp = tempfile::tempdir().unwrap();
        let dir = MigrationDirectory::new(temp.path());

        std::fs::write(temp.path().join("init.js"), "").unwrap();

        let err = dir.list().unwrap_err();
        assert!(matches!(err, MigrateError::InvalidMigration(_)));
        assert!(err.to_string().contains("init.js"));
    }

    #[test]
    fn test_write_atomic_lands_at_final_path() {
        let temp = tempfile::tempdir().unwrap();
        let dir = MigrationDirectory::new(temp.path());

        let path = dir
            .write_atomic("20240101000000_init.js", "migrate((db) => {}, (db) => {});\n")
            .unwrap();
        assert!(path.ends_with("20240101000000_init.js"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("migrate"));

        // no stray temporary files remain
        let files = dir.list().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_ensure_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("db").join("migrations");
        let dir = MigrationDirectory::new(&nested);

        dir.ensure().unwrap();
        assert!(nested.is_dir());
        // idempotent
        dir.ensure().unwrap();
    }
}
