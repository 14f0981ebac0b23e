//! # Drift Schema
//!
//! Typed schema model for collection-based backends.
//!
//! This crate defines the declarative schema that drives migration
//! generation: collections, their fields and type-specific options,
//! opaque index definitions, and API access rules. It also provides a
//! validator that performs semantic analysis over a whole schema.
//!
//! ## Example
//!
//! ```
//! use drift_schema::{Collection, Field, Rule, RuleSlot, Schema, validate_schema};
//!
//! let mut schema = Schema::new();
//! schema.add_collection(Collection::auth("users"));
//! schema.add_collection(
//!     Collection::base("posts")
//!         .field(Field::text("title").required())
//!         .field(Field::relation("author", "users"))
//!         .rule(RuleSlot::List, Rule::open()),
//! );
//!
//! assert!(validate_schema(&schema).is_ok());
//! ```

pub mod error;
pub mod model;
pub mod validator;

pub use error::{SchemaError, SchemaResult};
pub use model::{
    AutodateOptions, Collection, CollectionKind, DateOptions, DomainOptions, EditorOptions, Field,
    FieldType, FileOptions, JsonOptions, NumberOptions, RelationOptions, Rule, RuleSlot, Rules,
    Schema, SchemaStats, SelectOptions, TextOptions,
};
pub use validator::{Validator, validate_schema};
