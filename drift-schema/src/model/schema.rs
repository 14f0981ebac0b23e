//! Top-level schema definition.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;

use super::Collection;

/// A complete collection schema.
///
/// The map order carries no meaning; consumers treat the schema as a set of
/// collections keyed by name. The wire form is an ordered array of
/// collection objects, and decoding rejects duplicate names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// All collections, keyed by name.
    #[serde(
        serialize_with = "collections_to_list",
        deserialize_with = "collections_from_list",
        default
    )]
    pub collections: IndexMap<SmolStr, Collection>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection to the schema. An existing collection with the same
    /// name is replaced.
    pub fn add_collection(&mut self, collection: Collection) {
        self.collections
            .insert(collection.name.clone(), collection);
    }

    /// Get a collection by name.
    pub fn get_collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Get a mutable collection by name.
    pub fn get_collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    /// Remove a collection by name, returning it if present.
    pub fn remove_collection(&mut self, name: &str) -> Option<Collection> {
        self.collections.shift_remove(name)
    }

    /// Whether a collection with the given name exists.
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// All collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(|name| name.as_str())
    }

    /// Whether the schema holds no collections.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Get statistics about the schema.
    pub fn stats(&self) -> SchemaStats {
        SchemaStats {
            collection_count: self.collections.len(),
            field_count: self.collections.values().map(|c| c.fields.len()).sum(),
            index_count: self.collections.values().map(|c| c.indexes.len()).sum(),
            rule_count: self
                .collections
                .values()
                .map(|c| c.rules.specified().count())
                .sum(),
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        write!(
            f,
            "Schema({} collections, {} fields, {} indexes, {} rules)",
            stats.collection_count, stats.field_count, stats.index_count, stats.rule_count
        )
    }
}

fn collections_to_list<S>(
    collections: &IndexMap<SmolStr, Collection>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(collections.values())
}

fn collections_from_list<'de, D>(
    deserializer: D,
) -> Result<IndexMap<SmolStr, Collection>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Collection>::deserialize(deserializer)?;
    let mut collections = IndexMap::with_capacity(list.len());
    for collection in list {
        let name = collection.name.clone();
        if collections.insert(name.clone(), collection).is_some() {
            return Err(D::Error::custom(format!(
                "duplicate collection name `{}`",
                name
            )));
        }
    }
    Ok(collections)
}

/// Schema statistics for debugging/info.
#[derive(Debug, Clone, Default)]
pub struct SchemaStats {
    /// Number of collections.
    pub collection_count: usize,
    /// Total number of fields across all collections.
    pub field_count: usize,
    /// Total number of index definitions.
    pub index_count: usize,
    /// Total number of specified rule slots.
    pub rule_count: usize,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Field, Rule, RuleSlot};

    fn make_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_collection(
            Collection::base("posts")
                .field(Field::text("title").required())
                .field(Field::text("body"))
                .index("CREATE INDEX idx_posts_title ON posts (title)"),
        );
        schema.add_collection(
            Collection::auth("users").rule(RuleSlot::List, Rule::filter("id = @request.auth.id")),
        );
        schema
    }

    #[test]
    fn test_add_and_get() {
        let schema = make_schema();
        assert!(schema.has_collection("posts"));
        assert!(schema.get_collection("users").is_some());
        assert!(schema.get_collection("missing").is_none());
    }

    #[test]
    fn test_remove_collection() {
        let mut schema = make_schema();
        let removed = schema.remove_collection("posts");
        assert!(removed.is_some());
        assert!(!schema.has_collection("posts"));
        assert!(schema.remove_collection("posts").is_none());
    }

    #[test]
    fn test_replacing_collection() {
        let mut schema = make_schema();
        schema.add_collection(Collection::base("posts"));
        assert_eq!(schema.get_collection("posts").unwrap().fields.len(), 0);
        assert_eq!(schema.collections.len(), 2);
    }

    #[test]
    fn test_stats() {
        let stats = make_schema().stats();
        assert_eq!(stats.collection_count, 2);
        assert_eq!(stats.field_count, 2);
        assert_eq!(stats.index_count, 1);
        assert_eq!(stats.rule_count, 1);
    }

    #[test]
    fn test_display() {
        let display = make_schema().to_string();
        assert!(display.contains("2 collections"));
        assert!(display.contains("2 fields"));
    }

    #[test]
    fn test_schema_wire_form_is_a_list() {
        let schema = make_schema();
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["collections"].is_array());
        assert_eq!(json["collections"][0]["name"], "posts");

        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_duplicate_collection_names_rejected_on_decode() {
        let result: Result<Schema, _> = serde_json::from_str(
            r#"{"collections":[{"name":"posts"},{"name":"posts"}]}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate collection name"));
    }
}
