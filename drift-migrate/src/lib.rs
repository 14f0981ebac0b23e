//! # drift-migrate
//!
//! Migration engine for Drift.
//!
//! This crate provides functionality for:
//! - Schema diffing between a desired Drift schema and the state the
//!   migration history has already applied
//! - Destructive-change classification with severity-based gating
//! - Generation of versioned, reviewable JavaScript migration files
//!   with embedded schema checkpoints
//! - Migration file management on the filesystem
//! - Applied-schema reconstruction by checkpoint plus replay, without a
//!   live data store
//!
//! ## Architecture
//!
//! The engine never connects to a database. It reconstructs what the
//! existing migration files would produce, diffs that against the
//! desired schema, and writes new migration files for the difference.
//!
//! ```text
//! ┌────────────────┐     ┌───────────────┐     ┌───────────────┐
//! │ Desired Schema │────▶│ Schema Differ │────▶│ Classifier /  │
//! └────────────────┘     └───────────────┘     │ Filter        │
//!                                ▲             └───────────────┘
//!                                │                     │
//!                        ┌───────────────┐             ▼
//!                        │ Applied       │     ┌───────────────┐
//!                        │ Schema        │     │ Stage Splitter│
//!                        └───────────────┘     └───────────────┘
//!                                ▲                     │
//!                                │                     ▼
//!                        ┌───────────────┐     ┌───────────────┐
//!                        │ History Store │◀────│ Generator     │
//!                        │ (replay)      │     │ (.js files)   │
//!                        └───────────────┘     └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use drift_migrate::{MigrateConfig, MigrationEngine};
//! use drift_schema::{Collection, Field, Schema};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // Describe the schema you want
//!     let mut desired = Schema::new();
//!     desired.add_collection(
//!         Collection::base("posts")
//!             .field(Field::text("title").required())
//!             .field(Field::bool("published")),
//!     );
//!
//!     // Point the engine at a migration directory
//!     let config = MigrateConfig::new().migrations_dir("./migrations");
//!     let engine = MigrationEngine::new(config)?;
//!
//!     // Plan, review, generate
//!     let plan = engine.plan(&desired)?;
//!     println!("Plan: {}", plan.summary());
//!     let result = engine.generate_plan(&plan)?;
//!     println!("{}", result.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! Migrations are flat JavaScript files named by timestamp and slug:
//!
//! ```text
//! migrations/
//! ├── 20240115120000_create_posts.js
//! ├── 20240116090000_update_posts.js
//! └── 20240116090001_update_posts.js
//! ```
//!
//! Each file defines an apply and a revert routine and embeds a full
//! schema checkpoint in a trailing comment block:
//!
//! ```text
//! // fingerprint: 3f7a…
//! migrate((db) => {
//!   db.addField("posts", { "name": "title", "type": "text", "required": true });
//! }, (db) => {
//!   db.removeField("posts", "title");
//! });
//!
//! // checkpoint:begin
//! // { ... full schema snapshot ... }
//! // checkpoint:end
//! ```
//!
//! The checkpoint lets [`HistoryStore`] rebuild the applied schema from
//! the newest trustworthy snapshot instead of replaying every file.
//!
//! ## Destructive Changes
//!
//! Every diff is classified before generation:
//!
//! - **High**: collection deletions, field removals
//! - **Medium**: type changes, option narrowing, tightening a field to
//!   required without a default
//! - **Low**: index removals, access rule tightening
//!
//! High-severity changes (and medium ones under
//! [`MigrateConfig::gate_medium`]) refuse to generate until the caller
//! passes the force flag; [`MigrateConfig::skip_destructive`] instead
//! drops them from the diff entirely.

pub mod destructive;
pub mod diff;
pub mod engine;
pub mod error;
pub mod file;
pub mod generate;
pub mod history;
pub mod ops;
pub mod parse;
pub mod script;
pub mod stage;

// Re-exports
pub use destructive::{
    ChangeCategory, DestructiveChange, DestructivePolicy, DiffOrigin, FilterOptions, Severity,
    classify, filter, requires_override,
};
pub use diff::{
    CollectionChange, FieldChange, PropertyChange, RuleChange, SchemaDiff, SchemaDiffer, compare,
};
pub use engine::{MigrateConfig, MigrationEngine, MigrationPlan};
pub use error::{MigrateError, MigrateResult};
pub use file::{MigrationDirectory, MigrationFile, next_migration_id};
pub use generate::{GenerateOptions, GenerateResult, generate};
pub use history::{Checkpoint, HistoryStore, VerifyReport};
pub use ops::{Operation, apply_operations};
pub use parse::{
    ParsedScript, extract_checkpoint, extract_fingerprint, parse_operations, parse_script,
};
pub use script::render_script;
pub use stage::split_stages;
