//! Collection definitions.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;

use super::{Field, Rule, RuleSlot, Rules};

/// The kind of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// A regular record collection.
    #[default]
    Base,
    /// A collection whose records are authenticatable accounts.
    Auth,
    /// A read-only collection backed by a query.
    View,
}

impl CollectionKind {
    /// The canonical lowercase name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Auth => "auth",
            Self::View => "view",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named grouping of fields, indexes, and access rules.
///
/// Fields are held in an ordered map keyed by field name; the wire form is
/// an ordered array of field objects, and decoding rejects duplicate names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name, unique within a schema.
    pub name: SmolStr,
    /// Collection kind.
    #[serde(rename = "type", default)]
    pub kind: CollectionKind,
    /// Fields in declaration order, keyed by name.
    #[serde(
        serialize_with = "fields_to_list",
        deserialize_with = "fields_from_list",
        default
    )]
    pub fields: IndexMap<SmolStr, Field>,
    /// Opaque index definition strings, treated as a set.
    #[serde(default)]
    pub indexes: Vec<String>,
    /// API access rules, flattened into the collection object.
    #[serde(flatten)]
    pub rules: Rules,
}

impl Collection {
    /// Create a collection of the given kind.
    pub fn new(name: impl Into<SmolStr>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: IndexMap::new(),
            indexes: Vec::new(),
            rules: Rules::new(),
        }
    }

    /// Create a base collection.
    pub fn base(name: impl Into<SmolStr>) -> Self {
        Self::new(name, CollectionKind::Base)
    }

    /// Create an auth collection.
    pub fn auth(name: impl Into<SmolStr>) -> Self {
        Self::new(name, CollectionKind::Auth)
    }

    /// Create a view collection.
    pub fn view(name: impl Into<SmolStr>) -> Self {
        Self::new(name, CollectionKind::View)
    }

    /// Add a field. A field with the same name is replaced.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Add an index definition.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.indexes.push(index.into());
        self
    }

    /// Set an access rule slot.
    pub fn rule(mut self, slot: RuleSlot, rule: Rule) -> Self {
        self.rules.set(slot, rule);
        self
    }

    /// Collection name as a string slice.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Whether a field with the given name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Names of all fields in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|name| name.as_str())
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} fields, {} indexes)",
            self.name,
            self.kind,
            self.fields.len(),
            self.indexes.len()
        )
    }
}

fn fields_to_list<S>(fields: &IndexMap<SmolStr, Field>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(fields.values())
}

fn fields_from_list<'de, D>(deserializer: D) -> Result<IndexMap<SmolStr, Field>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Field>::deserialize(deserializer)?;
    let mut fields = IndexMap::with_capacity(list.len());
    for field in list {
        let name = field.name.clone();
        if fields.insert(name.clone(), field).is_some() {
            return Err(D::Error::custom(format!("duplicate field name `{}`", name)));
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn make_posts() -> Collection {
        Collection::base("posts")
            .field(Field::text("title").required())
            .field(Field::text("body"))
            .index("CREATE INDEX idx_posts_title ON posts (title)")
            .rule(RuleSlot::List, Rule::open())
    }

    #[test]
    fn test_collection_builder() {
        let posts = make_posts();
        assert_eq!(posts.name(), "posts");
        assert_eq!(posts.kind, CollectionKind::Base);
        assert_eq!(posts.fields.len(), 2);
        assert!(posts.has_field("title"));
        assert_eq!(posts.indexes.len(), 1);
        assert_eq!(posts.rules.get(RuleSlot::List), &Rule::open());
    }

    #[test]
    fn test_field_order_preserved() {
        let posts = make_posts();
        let names: Vec<_> = posts.field_names().collect();
        assert_eq!(names, vec!["title", "body"]);
    }

    #[test]
    fn test_duplicate_field_replaces() {
        let posts = Collection::base("posts")
            .field(Field::text("title"))
            .field(Field::editor("title"));
        assert_eq!(posts.fields.len(), 1);
        assert_eq!(posts.get_field("title").unwrap().type_name(), "editor");
    }

    #[test]
    fn test_collection_display() {
        let display = make_posts().to_string();
        assert!(display.contains("posts"));
        assert!(display.contains("base"));
        assert!(display.contains("2 fields"));
    }

    // ==================== Serde Tests ====================

    #[test]
    fn test_collection_wire_form() {
        let posts = make_posts();
        let json = serde_json::to_value(&posts).unwrap();

        assert_eq!(json["name"], "posts");
        assert_eq!(json["type"], "base");
        assert!(json["fields"].is_array());
        assert_eq!(json["fields"][0]["name"], "title");
        assert_eq!(json["listRule"], "");
        assert!(json.get("viewRule").is_none());
        assert!(json.get("rules").is_none());
    }

    #[test]
    fn test_collection_round_trip() {
        let posts = make_posts();
        let json = serde_json::to_string(&posts).unwrap();
        let back: Collection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, posts);
    }

    #[test]
    fn test_duplicate_field_names_rejected_on_decode() {
        let result: Result<Collection, _> = serde_json::from_str(
            r#"{"name":"posts","type":"base","fields":[
                {"name":"title","type":"text"},
                {"name":"title","type":"editor"}
            ]}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate field name"));
    }

    #[test]
    fn test_kind_defaults_to_base() {
        let collection: Collection = serde_json::from_str(r#"{"name":"notes"}"#).unwrap();
        assert_eq!(collection.kind, CollectionKind::Base);
        assert!(collection.fields.is_empty());
    }

    #[test]
    fn test_auth_kind_round_trip() {
        let users = Collection::auth("users").rule(RuleSlot::Manage, Rule::Locked);
        let json = serde_json::to_value(&users).unwrap();
        assert_eq!(json["type"], "auth");
        assert_eq!(json["manageRule"], serde_json::Value::Null);
    }
}
