//! Migration engine implementation.

use std::path::PathBuf;

use drift_schema::{Schema, validate_schema};

use crate::destructive::{
    DestructiveChange, DestructivePolicy, FilterOptions, classify, filter, requires_override,
};
use crate::diff::{SchemaDiff, compare};
use crate::error::{MigrateError, MigrateResult};
use crate::file::MigrationDirectory;
use crate::generate::{GenerateOptions, GenerateResult, generate};
use crate::history::{HistoryStore, VerifyReport};

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Path to the migrations directory, absolute or relative to the
    /// workspace root.
    pub migrations_dir: PathBuf,
    /// Workspace root that relative paths resolve against.
    pub workspace_root: PathBuf,
    /// Whether to generate despite destructive changes and duplicate
    /// fingerprints.
    pub force: bool,
    /// Whether to silently drop destructive changes from the diff.
    pub skip_destructive: bool,
    /// Glob patterns restricting the diff to matching collection and
    /// field names. Empty means no restriction.
    pub name_patterns: Vec<String>,
    /// Whether medium-severity changes also require an override.
    pub gate_medium: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            workspace_root: PathBuf::from("."),
            force: false,
            skip_destructive: false,
            name_patterns: Vec::new(),
            gate_medium: false,
        }
    }
}

impl MigrateConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the workspace root.
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Set the force flag.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Drop destructive changes from planned diffs.
    pub fn skip_destructive(mut self, skip: bool) -> Self {
        self.skip_destructive = skip;
        self
    }

    /// Add a name pattern.
    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_patterns.push(pattern.into());
        self
    }

    /// Gate medium-severity changes behind the override as well.
    pub fn gate_medium(mut self, gate: bool) -> Self {
        self.gate_medium = gate;
        self
    }

    /// The migrations directory with the workspace root applied.
    pub fn resolved_dir(&self) -> PathBuf {
        if self.migrations_dir.is_absolute() {
            self.migrations_dir.clone()
        } else {
            self.workspace_root.join(&self.migrations_dir)
        }
    }

    fn validate(&self) -> MigrateResult<()> {
        let dir = self.resolved_dir();
        if dir.exists() && !dir.is_dir() {
            return Err(MigrateError::config(format!(
                "migrations path {} exists and is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }

    fn filter_options(&self) -> FilterOptions {
        let mut options = FilterOptions::new().skip_destructive(self.skip_destructive);
        for pattern in &self.name_patterns {
            options = options.name_pattern(pattern.clone());
        }
        options
    }

    fn policy(&self) -> DestructivePolicy {
        DestructivePolicy::new().gate_medium(self.gate_medium)
    }
}

/// Everything a single engine run decided before touching disk.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// The schema the migration history has applied, if any.
    pub applied_schema: Option<Schema>,
    /// The filtered diff between desired and applied.
    pub diff: SchemaDiff,
    /// Destructive changes the diff contains.
    pub destructive: Vec<DestructiveChange>,
    /// Whether generation will refuse without the force flag.
    pub requires_override: bool,
}

impl MigrationPlan {
    /// Check if there is anything to generate.
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// Whether no migration file exists yet.
    pub fn is_first_run(&self) -> bool {
        self.applied_schema.is_none()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No schema changes detected".to_string();
        }

        let mut parts = vec![self.diff.summary()];
        if !self.destructive.is_empty() {
            parts.push(format!("{} destructive change(s)", self.destructive.len()));
        }
        if self.requires_override {
            parts.push("override required".to_string());
        }
        parts.join("; ")
    }
}

/// The main migration engine.
///
/// Ties the pieces together for a batch run: reconstruct the applied
/// schema from the migration directory, diff it against the desired
/// schema, filter and classify the result, and write migration files.
#[derive(Debug)]
pub struct MigrationEngine {
    config: MigrateConfig,
}

impl MigrationEngine {
    /// Create a new migration engine.
    pub fn new(config: MigrateConfig) -> MigrateResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    fn store(&self) -> HistoryStore {
        HistoryStore::new(MigrationDirectory::new(self.config.resolved_dir()))
    }

    /// Reconstruct the applied schema from the migration history.
    pub fn load_applied_schema(&self) -> MigrateResult<Option<Schema>> {
        self.store().load_applied_schema()
    }

    /// Plan a migration of the desired schema.
    ///
    /// Validates the desired schema, reconstructs the applied one,
    /// diffs the two, applies the configured name and destructive
    /// filters, and classifies what remains.
    pub fn plan(&self, desired: &Schema) -> MigrateResult<MigrationPlan> {
        validate_schema(desired)?;

        let applied = self.load_applied_schema()?;
        let diff = compare(desired, applied.as_ref())?;
        let diff = filter(&diff, &self.config.filter_options())?;
        let destructive = classify(&diff);
        let requires_override = requires_override(&destructive, &self.config.policy());

        Ok(MigrationPlan {
            applied_schema: applied,
            diff,
            destructive,
            requires_override,
        })
    }

    /// Plan and generate in one step.
    pub fn generate(&self, desired: &Schema) -> MigrateResult<GenerateResult> {
        let plan = self.plan(desired)?;
        self.generate_plan(&plan)
    }

    /// Generate migration files for an already computed plan.
    pub fn generate_plan(&self, plan: &MigrationPlan) -> MigrateResult<GenerateResult> {
        let options = GenerateOptions::new(self.config.resolved_dir())
            .force(self.config.force)
            .policy(self.config.policy());
        generate(&plan.diff, &options)
    }

    /// Audit the migration history against its embedded checkpoints.
    pub fn verify(&self) -> MigrateResult<VerifyReport> {
        self.store().verify()
    }
}
