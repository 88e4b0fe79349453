//! Repository entity structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of entity that get projected into the search index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Container,
    Record,
    File,
}

impl EntityKind {
    /// Prefix of the composite document identifier (`<prefix>_<id>`).
    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::Container => "dataverse",
            EntityKind::Record => "dataset",
            EntityKind::File => "datafile",
        }
    }

    /// Value stored in the document `type` field.
    pub fn type_tag(self) -> &'static str {
        match self {
            EntityKind::Container => "dataverses",
            EntityKind::Record => "datasets",
            EntityKind::File => "files",
        }
    }

    /// Deterministic document identifier for an entity of this kind.
    pub fn document_id(self, id: i64) -> String {
        format!("{}_{}", self.id_prefix(), id)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Container => write!(f, "container"),
            EntityKind::Record => write!(f, "record"),
            EntityKind::File => write!(f, "file"),
        }
    }
}

/// A node in the container tree. The root is the single node without an owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerNode {
    pub id: Option<i64>,
    pub name: String,
    /// Path segment, unique among siblings.
    pub alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub owner: Option<i64>,
}

impl ContainerNode {
    pub fn is_root(&self) -> bool {
        self.owner.is_none()
    }
}

/// Schema element of the dynamic metadata model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDefinition {
    pub id: Option<i64>,
    pub title: String,
    /// Canonical name, used for dispatch when building documents.
    pub name: String,
    /// Whether the field is eligible for advanced/faceted search.
    #[serde(default)]
    pub advanced_search: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldValue {
    pub field: FieldDefinition,
    #[serde(default)]
    pub value: String,
}

impl FieldValue {
    pub fn new(field: FieldDefinition, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Publication state of a record version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    #[default]
    Draft,
    Released,
    Deaccessioned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecordVersion {
    pub id: Option<i64>,
    #[serde(default)]
    pub state: VersionState,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub external_status_label: Option<String>,
    #[serde(default)]
    pub field_values: Vec<FieldValue>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl RecordVersion {
    pub fn is_released(&self) -> bool {
        self.state == VersionState::Released
    }
}

/// A file asset owned by a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFile {
    pub id: Option<i64>,
    pub name: String,
    /// `major/minor` content type.
    pub content_type: String,
}

/// A versioned metadata-bearing unit owned by a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: Option<i64>,
    /// Global persistent identifier (e.g. `doi:10.5072/FK2/ABC123`).
    pub persistent_id: String,
    pub owner: i64,
    /// Draft metadata. Absent when the latest version is released and no
    /// draft exists; see [`Record::metadata_version`].
    #[serde(default)]
    pub edit_version: Option<RecordVersion>,
    #[serde(default)]
    pub latest_version: RecordVersion,
    #[serde(default)]
    pub files: Vec<DataFile>,
    #[serde(default)]
    pub modification_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl Record {
    /// The version whose metadata gets indexed: the draft when one exists,
    /// otherwise the latest (released) version.
    pub fn metadata_version(&self) -> &RecordVersion {
        self.edit_version.as_ref().unwrap_or(&self.latest_version)
    }
}

/// Identifies one indexable entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn container(id: i64) -> Self {
        Self {
            kind: EntityKind::Container,
            id,
        }
    }

    pub fn record(id: i64) -> Self {
        Self {
            kind: EntityKind::Record,
            id,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
