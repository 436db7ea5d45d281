use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The six document kinds held by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Director,
    Writer,
    Cast,
    Genre,
    Movie,
    MovieInstance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Movie,
        EntityKind::Director,
        EntityKind::Writer,
        EntityKind::Cast,
        EntityKind::Genre,
        EntityKind::MovieInstance,
    ];

    /// URL segment for this kind (`/movie/:id`, `/movies`).
    pub fn slug(self) -> &'static str {
        match self {
            EntityKind::Director => "director",
            EntityKind::Writer => "writer",
            EntityKind::Cast => "cast",
            EntityKind::Genre => "genre",
            EntityKind::Movie => "movie",
            EntityKind::MovieInstance => "movieinstance",
        }
    }

    /// Director, Writer and Cast share one document shape.
    pub fn is_person(self) -> bool {
        matches!(
            self,
            EntityKind::Director | EntityKind::Writer | EntityKind::Cast
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind '{0}'")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Top-level catalog schema parsed from catalog.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSchema {
    pub kinds: BTreeMap<EntityKind, KindDefinition>,
}

/// Definition of one entity kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindDefinition {
    pub collection: String,
    pub title: String,
    /// Field shown when a document of this kind is listed or offered as a choice
    pub label: String,
    #[serde(default)]
    pub sort: Option<String>,
    /// Projection applied on list pages; empty means every field
    #[serde(default)]
    pub list_fields: Vec<String>,
    /// Field whose value identifies an existing document on create
    #[serde(default)]
    pub unique: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

/// Definition of a single field in a kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub target: Option<EntityKind>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Date,
    Ref,
    List,
}

/// One normalisation or validation step applied to a submitted form value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Trim,
    RequireNonEmpty,
    Escape,
    OptionalNullable,
    Iso8601Date,
    Number,
}
