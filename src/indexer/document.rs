//! Projection of repository entities onto index documents.
//!
//! Container nodes and files map onto fixed fields. Records additionally
//! carry metadata taken from the search-eligible field values of their edit
//! version; the canonical field name selects a handler from
//! [`METADATA_HANDLERS`]. Eligible fields without a handler are not indexed.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{ContainerNode, DataFile, EntityKind, FieldValue, Record};

/// Document field names understood by the index schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const ENTITY_ID: &str = "entity_id";
    pub const TYPE: &str = "type";
    pub const NAME: &str = "name";
    pub const ORIGINAL_CONTAINER: &str = "original_container";
    pub const DESCRIPTION: &str = "description";
    pub const AFFILIATION: &str = "affiliation";
    pub const PARENT_TYPE: &str = "parent_type";
    pub const PARENT_ID: &str = "parent_id";
    pub const PARENT_NAME: &str = "parent_name";
    pub const SUBTREE: &str = "subtree";
    pub const TITLE: &str = "title";
    pub const AUTHOR_STRING: &str = "author_string";
    pub const KEYWORD: &str = "keyword";
    pub const DISTRIBUTOR: &str = "distributor";
    pub const PRODUCTION_DATE_YEAR_ONLY: &str = "production_date_year_only";
    pub const PRODUCTION_DATE_ORIGINAL: &str = "production_date_original";
    pub const DISTRIBUTION_DATE_YEAR_ONLY: &str = "distribution_date_year_only";
    pub const DISTRIBUTION_DATE_ORIGINAL: &str = "distribution_date_original";
    pub const FILE_TYPE: &str = "file_type";
    pub const FILE_TYPE_GROUP: &str = "file_type_group";
}

/// Canonical metadata field names with dedicated handlers.
pub mod canonical {
    pub const TITLE: &str = "title";
    pub const AUTHOR_NAME: &str = "authorName";
    pub const PRODUCTION_DATE: &str = "productionDate";
    pub const DISTRIBUTION_DATE: &str = "distributionDate";
    pub const KEYWORD_VALUE: &str = "keywordValue";
    pub const DISTRIBUTOR_NAME: &str = "distributorName";
    pub const DESCRIPTION: &str = "dsDescriptionValue";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("content type {0:?} has no major/minor separator")]
    MalformedContentType(String),

    #[error("{0} has no identifier")]
    MissingIdentifier(EntityKind),
}

impl DocumentError {
    pub fn help_message(&self) -> &'static str {
        match self {
            DocumentError::MalformedContentType(_) => {
                "Fix the file's content type to the major/minor form, e.g. text/csv."
            }
            DocumentError::MissingIdentifier(_) => {
                "Assign the entity an identifier before indexing it."
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a four-digit year")]
pub struct YearParseError(pub String);

/// One document in the external index, keyed by `<kind-prefix>_<id>`.
///
/// Fields are kept in a sorted map so that building the same entity twice
/// serializes to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndexDocument {
    fields: BTreeMap<String, Value>,
}

impl IndexDocument {
    pub fn new(kind: EntityKind, entity_id: i64) -> Self {
        let mut doc = Self {
            fields: BTreeMap::new(),
        };
        doc.set_field(fields::ID, kind.document_id(entity_id));
        doc.set_field(fields::ENTITY_ID, entity_id);
        doc.set_field(fields::TYPE, kind.type_tag());
        doc
    }

    /// Add a value; repeated names accumulate into a multi-valued field.
    pub fn add_field(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.get_mut(name) {
            None => {
                self.fields.insert(name.to_string(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }

    /// Replace any existing value.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn id(&self) -> &str {
        self.fields
            .get(fields::ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

type FieldHandler = fn(&mut IndexDocument, &str);

/// Canonical field name -> handler, built once.
pub static METADATA_HANDLERS: Lazy<HashMap<&'static str, FieldHandler>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, FieldHandler> = HashMap::new();
    table.insert(canonical::TITLE, |doc, v| add_text(doc, fields::TITLE, v));
    table.insert(canonical::AUTHOR_NAME, |doc, v| {
        add_text(doc, fields::AUTHOR_STRING, v)
    });
    table.insert(canonical::KEYWORD_VALUE, |doc, v| {
        add_text(doc, fields::KEYWORD, v)
    });
    table.insert(canonical::DISTRIBUTOR_NAME, |doc, v| {
        add_text(doc, fields::DISTRIBUTOR, v)
    });
    table.insert(canonical::DESCRIPTION, |doc, v| {
        add_text(doc, fields::DESCRIPTION, v)
    });
    table.insert(canonical::PRODUCTION_DATE, |doc, v| {
        add_year(
            doc,
            fields::PRODUCTION_DATE_YEAR_ONLY,
            fields::PRODUCTION_DATE_ORIGINAL,
            v,
        )
    });
    table.insert(canonical::DISTRIBUTION_DATE, |doc, v| {
        add_year(
            doc,
            fields::DISTRIBUTION_DATE_YEAR_ONLY,
            fields::DISTRIBUTION_DATE_ORIGINAL,
            v,
        )
    });
    table
});

fn add_text(doc: &mut IndexDocument, field: &str, value: &str) {
    if !value.trim().is_empty() {
        doc.add_field(field, value);
    }
}

fn add_year(doc: &mut IndexDocument, year_field: &str, original_field: &str, value: &str) {
    if value.trim().is_empty() {
        return;
    }
    match parse_year(value) {
        Ok(date) => {
            doc.add_field(year_field, date.year());
            doc.add_field(
                original_field,
                date.format("%Y-%m-%dT00:00:00Z").to_string(),
            );
        }
        Err(e) => debug!(document = doc.id(), error = %e, "skipping unparseable date"),
    }
}

/// Parse a strict four-digit year, independent of locale.
pub fn parse_year(raw: &str) -> Result<NaiveDate, YearParseError> {
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(YearParseError(raw.to_string()));
    }
    raw.parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        .ok_or_else(|| YearParseError(raw.to_string()))
}

/// Substring before the first `/` of a `major/minor` content type.
pub fn content_type_group(content_type: &str) -> Result<&str, DocumentError> {
    match content_type.split_once('/') {
        Some((major, _)) if !major.is_empty() => Ok(major),
        _ => Err(DocumentError::MalformedContentType(
            content_type.to_string(),
        )),
    }
}

/// Builds index documents from entities plus their precomputed subtree paths.
pub struct DocumentBuilder;

impl DocumentBuilder {
    /// Document for a container. `parent` is `None` only for the root.
    pub fn container(
        node: &ContainerNode,
        parent: Option<&ContainerNode>,
        subtree: &[String],
    ) -> Result<IndexDocument, DocumentError> {
        let id = node
            .id
            .ok_or(DocumentError::MissingIdentifier(EntityKind::Container))?;
        let mut doc = IndexDocument::new(EntityKind::Container, id);
        doc.set_field(fields::NAME, node.name.as_str());
        doc.set_field(fields::ORIGINAL_CONTAINER, node.name.as_str());
        doc.set_field(fields::DESCRIPTION, node.description.as_str());
        if let Some(affiliation) = node.affiliation.as_deref()
            && !affiliation.is_empty()
        {
            doc.set_field(fields::AFFILIATION, affiliation);
        }
        if let Some(parent) = parent {
            link_container_parent(&mut doc, parent);
        }
        doc.set_field(fields::SUBTREE, subtree.to_vec());
        Ok(doc)
    }

    /// The record document followed by one document per file. Files without
    /// an identifier are skipped.
    pub fn record(
        record: &Record,
        owner: &ContainerNode,
        subtree: &[String],
    ) -> Result<Vec<IndexDocument>, DocumentError> {
        let id = record
            .id
            .ok_or(DocumentError::MissingIdentifier(EntityKind::Record))?;
        let mut doc = IndexDocument::new(EntityKind::Record, id);

        for value in &record.metadata_version().field_values {
            apply_metadata(&mut doc, value);
        }

        doc.set_field(fields::SUBTREE, subtree.to_vec());
        doc.set_field(fields::ORIGINAL_CONTAINER, owner.name.as_str());
        link_container_parent(&mut doc, owner);

        let mut docs = Vec::with_capacity(record.files.len() + 1);
        docs.push(doc);
        for file in &record.files {
            match Self::file(file, record, owner, subtree) {
                Ok(file_doc) => docs.push(file_doc),
                Err(e) => warn!(record_id = id, file = %file.name, error = %e, "skipping file"),
            }
        }
        Ok(docs)
    }

    /// Document for one file of `record`.
    pub fn file(
        file: &DataFile,
        record: &Record,
        owner: &ContainerNode,
        subtree: &[String],
    ) -> Result<IndexDocument, DocumentError> {
        let id = file
            .id
            .ok_or(DocumentError::MissingIdentifier(EntityKind::File))?;
        let record_id = record
            .id
            .ok_or(DocumentError::MissingIdentifier(EntityKind::Record))?;

        let mut doc = IndexDocument::new(EntityKind::File, id);
        doc.set_field(fields::NAME, file.name.as_str());
        doc.set_field(fields::FILE_TYPE, file.content_type.as_str());
        match content_type_group(&file.content_type) {
            Ok(group) => doc.set_field(fields::FILE_TYPE_GROUP, group),
            Err(e) => warn!(file_id = id, error = %e, "indexing file without type group"),
        }
        doc.set_field(fields::SUBTREE, subtree.to_vec());
        doc.set_field(fields::ORIGINAL_CONTAINER, owner.name.as_str());
        doc.set_field(fields::PARENT_TYPE, EntityKind::Record.type_tag());
        doc.set_field(fields::PARENT_ID, record_id);
        let title = record.latest_version.title.as_str();
        if !title.is_empty() {
            doc.set_field(fields::PARENT_NAME, title);
        }
        Ok(doc)
    }
}

fn link_container_parent(doc: &mut IndexDocument, parent: &ContainerNode) {
    doc.set_field(fields::PARENT_TYPE, EntityKind::Container.type_tag());
    if let Some(parent_id) = parent.id {
        doc.set_field(fields::PARENT_ID, parent_id);
    }
    doc.set_field(fields::PARENT_NAME, parent.name.as_str());
}

fn apply_metadata(doc: &mut IndexDocument, value: &FieldValue) {
    if !value.field.advanced_search {
        return;
    }
    match METADATA_HANDLERS.get(value.field.name.as_str()) {
        Some(handler) => handler(doc, &value.value),
        None => debug!(
            document = doc.id(),
            field = %value.field.name,
            "no index mapping for search-eligible field"
        ),
    }
}
