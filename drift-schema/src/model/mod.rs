//! Typed schema model.
//!
//! This module contains the types that represent a desired or applied
//! collection schema: collections, fields, indexes, and access rules.

mod collection;
mod field;
mod rules;
mod schema;

pub use collection::*;
pub use field::*;
pub use rules::*;
pub use schema::*;
