//! # Drift
//!
//! Schema-first migrations for collection-based backends.
//!
//! Drift provides:
//! - A declarative schema model of collections, fields, indexes, and
//!   access rules
//! - A differ that compares the schema you want with the schema your
//!   migration history already produces
//! - Destructive-change classification, so data-losing migrations need
//!   an explicit override
//! - A generator that writes versioned, reviewable JavaScript migration
//!   files with embedded checkpoints, replayable without a live data
//!   store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use drift::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut desired = Schema::new();
//!     desired.add_collection(
//!         Collection::base("posts")
//!             .field(Field::text("title").required())
//!             .field(Field::relation("author", "users"))
//!             .rule(RuleSlot::List, Rule::open()),
//!     );
//!
//!     let engine = MigrationEngine::new(
//!         MigrateConfig::new().migrations_dir("./migrations"),
//!     )?;
//!
//!     let plan = engine.plan(&desired)?;
//!     println!("{}", plan.summary());
//!
//!     let result = engine.generate_plan(&plan)?;
//!     for path in &result.files {
//!         println!("wrote {}", path.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema model, validation, and serialization.
pub mod schema {
    pub use drift_schema::*;
}

/// Diffing, destructive-change gating, history replay, and file
/// generation.
pub mod migrate {
    pub use drift_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        GenerateResult, MigrateConfig, MigrateError, MigrateResult, MigrationEngine, MigrationPlan,
        SchemaDiff,
    };
    pub use crate::schema::{Collection, Field, Rule, RuleSlot, Schema};
}

// Re-export key types at the crate root
pub use migrate::{MigrateConfig, MigrateError, MigrationEngine, SchemaDiff};
pub use schema::{Schema, SchemaError};
