//! Repository data model.

pub mod types;

pub use types::{
    ContainerNode, DataFile, EntityKind, EntityRef, FieldDefinition, FieldValue, Record,
    RecordVersion, VersionState,
};
