//! Field definitions and type-specific options.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single field of a collection.
///
/// The wire form is a flat object: the type tag and its option bag are
/// flattened beside `name`, `required`, and `unique`, so a text field
/// serializes as `{"name":"title","type":"text","required":true,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, unique within its collection.
    pub name: SmolStr,
    /// Type tag plus type-specific options.
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether a value is mandatory.
    #[serde(default)]
    pub required: bool,
    /// Whether values must be unique across records.
    #[serde(default)]
    pub unique: bool,
}

impl Field {
    /// Create a field with an explicit type.
    pub fn new(name: impl Into<SmolStr>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
        }
    }

    /// Create a plain text field.
    pub fn text(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Text(TextOptions::default()))
    }

    /// Create a rich-text editor field.
    pub fn editor(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Editor(EditorOptions::default()))
    }

    /// Create a number field.
    pub fn number(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Number(NumberOptions::default()))
    }

    /// Create a boolean field.
    pub fn bool(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    /// Create an email field.
    pub fn email(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Email(DomainOptions::default()))
    }

    /// Create a URL field.
    pub fn url(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Url(DomainOptions::default()))
    }

    /// Create a date field.
    pub fn date(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Date(DateOptions::default()))
    }

    /// Create an auto-populated timestamp field.
    pub fn autodate(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Autodate(AutodateOptions::default()))
    }

    /// Create a select field with the given allowed values.
    pub fn select<I, S>(name: impl Into<SmolStr>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Select(SelectOptions {
                values: values.into_iter().map(Into::into).collect(),
                max_select: None,
            }),
        )
    }

    /// Create a file field.
    pub fn file(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::File(FileOptions::default()))
    }

    /// Create a relation field targeting another collection.
    pub fn relation(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self::new(
            name,
            FieldType::Relation(RelationOptions {
                collection: target.into(),
                cascade_delete: false,
                min_select: None,
                max_select: None,
            }),
        )
    }

    /// Create a JSON field.
    pub fn json(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Json(JsonOptions::default()))
    }

    /// Create a geographic point field.
    pub fn geo_point(name: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::GeoPoint)
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Field name as a string slice.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical name of the field's type tag.
    pub fn type_name(&self) -> &'static str {
        self.field_type.type_name()
    }

    /// Target collection name, if this is a relation field.
    pub fn relation_target(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Relation(opts) => Some(&opts.collection),
            _ => None,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.type_name())?;
        if self.required {
            write!(f, " required")?;
        }
        if self.unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}

/// Type tag and options of a field.
///
/// Internally tagged so the tag lands in the flat wire form as `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldType {
    Text(TextOptions),
    Editor(EditorOptions),
    Number(NumberOptions),
    Bool,
    Email(DomainOptions),
    Url(DomainOptions),
    Date(DateOptions),
    Autodate(AutodateOptions),
    Select(SelectOptions),
    File(FileOptions),
    Relation(RelationOptions),
    Json(JsonOptions),
    GeoPoint,
}

impl FieldType {
    /// The canonical name of the type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Editor(_) => "editor",
            Self::Number(_) => "number",
            Self::Bool => "bool",
            Self::Email(_) => "email",
            Self::Url(_) => "url",
            Self::Date(_) => "date",
            Self::Autodate(_) => "autodate",
            Self::Select(_) => "select",
            Self::File(_) => "file",
            Self::Relation(_) => "relation",
            Self::Json(_) => "json",
            Self::GeoPoint => "geoPoint",
        }
    }
}

/// Options for text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOptions {
    /// Minimum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    /// Maximum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    /// Validation regex applied to values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Options for editor fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorOptions {
    /// Whether pasted URLs are converted to links.
    #[serde(default)]
    pub convert_urls: bool,
}

/// Options for number fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberOptions {
    /// Minimum value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Restrict values to integers.
    #[serde(default)]
    pub only_int: bool,
}

/// Domain allow/deny lists shared by email and URL fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOptions {
    /// Domains that are rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub except_domains: Vec<String>,
    /// If non-empty, the only domains that are accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_domains: Vec<String>,
}

/// Options for date fields. Bounds are opaque datetime strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

/// Options for autodate fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutodateOptions {
    /// Stamp the field when a record is created.
    #[serde(default)]
    pub on_create: bool,
    /// Stamp the field when a record is updated.
    #[serde(default)]
    pub on_update: bool,
}

/// Options for select fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptions {
    /// Allowed values.
    #[serde(default)]
    pub values: Vec<String>,
    /// Maximum number of selected values; single-select when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<u32>,
}

/// Options for file fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    /// Maximum number of attached files; single-file when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<u32>,
    /// Per-file size limit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Accepted MIME types; everything when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mime_types: Vec<String>,
    /// Thumbnail size specifications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbs: Vec<String>,
}

/// Options for relation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationOptions {
    /// Name of the target collection.
    pub collection: SmolStr,
    /// Delete owning records when the target record is deleted.
    #[serde(default)]
    pub cascade_delete: bool,
    /// Minimum number of linked records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_select: Option<u32>,
    /// Maximum number of linked records; single-relation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<u32>,
}

/// Options for JSON fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonOptions {
    /// Serialized size limit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
}
