//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`DocumentId`] - Validated document identifier (draft or published)
//! - [`ArrayKey`] - Unique key of one element in a reference array
//! - [`Reference`] - A `{ _type: "reference", _ref, _key }` array element
//! - [`Document`] - A stored document revision with its JSON fields
//!
//! # Revisions
//!
//! A document exists as at most two revisions. The published revision
//! carries the canonical id; the draft revision carries the same id with
//! the reserved [`DRAFTS_PREFIX`]. Reference fields always store published
//! ids, never draft ids.
//!
//! # Examples
//!
//! ```
//! use refsync::core::types::DocumentId;
//!
//! let id = DocumentId::new("artist-1").unwrap();
//! assert_eq!(id.draft().as_str(), "drafts.artist-1");
//! assert_eq!(id.draft().published(), id);
//!
//! assert!(DocumentId::new("").is_err());
//! assert!(DocumentId::new("has space").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reserved id prefix marking the draft revision of a document.
pub const DRAFTS_PREFIX: &str = "drafts.";

/// `_type` value of a reference array element.
pub const REFERENCE_KIND: &str = "reference";

/// Maximum length of a document id accepted by the content API.
const MAX_ID_LEN: usize = 128;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid document id: {0}")]
    InvalidDocumentId(String),

    #[error("invalid array key: {0}")]
    InvalidArrayKey(String),
}

/// A validated document identifier.
///
/// Ids are opaque except for the draft marker: `drafts.<id>` names the
/// draft revision of the document whose published id is `<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new validated document id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidDocumentId` if the id is empty, too long,
    /// contains whitespace or control characters, or is only the draft marker.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<(), TypeError> {
        if id.is_empty() {
            return Err(TypeError::InvalidDocumentId("id cannot be empty".into()));
        }
        if id.len() > MAX_ID_LEN {
            return Err(TypeError::InvalidDocumentId(format!(
                "id cannot exceed {MAX_ID_LEN} characters"
            )));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidDocumentId(format!(
                "id '{id}' cannot contain whitespace"
            )));
        }
        if id == DRAFTS_PREFIX {
            return Err(TypeError::InvalidDocumentId(
                "id cannot be only the draft marker".into(),
            ));
        }
        if id
            .strip_prefix(DRAFTS_PREFIX)
            .is_some_and(|rest| rest.starts_with(DRAFTS_PREFIX))
        {
            return Err(TypeError::InvalidDocumentId(format!(
                "id '{id}' has a nested draft marker"
            )));
        }
        Ok(())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names a draft revision.
    pub fn is_draft(&self) -> bool {
        self.0.starts_with(DRAFTS_PREFIX)
    }

    /// The published (canonical) id of this document.
    pub fn published(&self) -> DocumentId {
        match self.0.strip_prefix(DRAFTS_PREFIX) {
            Some(rest) => DocumentId(rest.to_string()),
            None => self.clone(),
        }
    }

    /// The draft revision id of this document.
    pub fn draft(&self) -> DocumentId {
        if self.is_draft() {
            self.clone()
        } else {
            DocumentId(format!("{DRAFTS_PREFIX}{}", self.0))
        }
    }
}

impl TryFrom<String> for DocumentId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl FromStr for DocumentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key identifying one element of a reference array.
///
/// Keys identify the array element, not the referenced document. A key is
/// assigned once at insertion and never reused, so generation draws 128
/// random bits instead of reading the clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArrayKey(String);

impl ArrayKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing key read from a stored array.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidArrayKey` if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypeError::InvalidArrayKey("key cannot be empty".into()));
        }
        Ok(Self(key))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ArrayKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArrayKey> for String {
    fn from(key: ArrayKey) -> Self {
        key.0
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One element of a reference array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Always `"reference"`.
    #[serde(rename = "_type")]
    pub kind: String,
    /// Published id of the referenced document.
    #[serde(rename = "_ref")]
    pub target: DocumentId,
    /// Element key; absent on single-valued reference fields.
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ArrayKey>,
}

impl Reference {
    /// Build an array element pointing at `target` with a freshly generated key.
    ///
    /// Draft ids are normalized to the published id.
    pub fn keyed(target: &DocumentId) -> Self {
        Self {
            kind: REFERENCE_KIND.to_string(),
            target: target.published(),
            key: Some(ArrayKey::generate()),
        }
    }

    /// Serialize into a JSON value suitable for a patch.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("_type".into(), Value::String(self.kind.clone()));
        map.insert("_ref".into(), Value::String(self.target.to_string()));
        if let Some(key) = &self.key {
            map.insert("_key".into(), Value::String(key.to_string()));
        }
        Value::Object(map)
    }
}

/// Read the `_ref` of a reference-shaped JSON value.
pub fn reference_target(value: &Value) -> Option<&str> {
    value.get("_ref").and_then(Value::as_str)
}

/// Whether a reference-shaped value points at the published form of `id`.
pub fn points_at(value: &Value, id: &DocumentId) -> bool {
    reference_target(value) == Some(id.published().as_str())
}

/// A stored document revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,

    #[serde(rename = "_type")]
    pub doc_type: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "_updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// All non-system fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document of the given type.
    pub fn new(id: DocumentId, doc_type: impl Into<String>) -> Self {
        Self {
            id,
            doc_type: doc_type.into(),
            rev: None,
            updated_at: None,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder-style reference array setter with fresh keys.
    pub fn with_references(self, name: impl Into<String>, targets: &[&DocumentId]) -> Self {
        let items = targets
            .iter()
            .map(|t| Reference::keyed(t).to_value())
            .collect();
        self.with_field(name, Value::Array(items))
    }

    /// Get a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolve a dotted path (`"date.start"`) against the document fields.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Published ids referenced by a field, de-duplicated in insertion order.
    ///
    /// Accepts an array of references or a single reference object. Elements
    /// without a valid `_ref` are ignored.
    pub fn reference_ids(&self, field: &str) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = Vec::new();
        let mut push = |value: &Value| {
            if let Some(id) = reference_target(value).and_then(|r| DocumentId::new(r).ok()) {
                let id = id.published();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        };
        match self.fields.get(field) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(single @ Value::Object(_)) => push(single),
            _ => {}
        }
        ids
    }

    /// Whether `field` holds a reference to the published form of `id`.
    pub fn references(&self, field: &str, id: &DocumentId) -> bool {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items.iter().any(|v| points_at(v, id)),
            Some(single @ Value::Object(_)) => points_at(single, id),
            _ => false,
        }
    }

    /// Display label taken from `title_field`, falling back to the id.
    pub fn label(&self, title_field: Option<&str>) -> String {
        title_field
            .and_then(|f| self.get_path(f))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.published().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    mod document_id {
        use super::*;

        #[test]
        fn draft_and_published_round_trip() {
            let published = id("event-1");
            assert!(!published.is_draft());
            let draft = published.draft();
            assert!(draft.is_draft());
            assert_eq!(draft.as_str(), "drafts.event-1");
            assert_eq!(draft.draft(), draft);
            assert_eq!(draft.published(), published);
        }

        #[test]
        fn rejects_invalid() {
            assert!(DocumentId::new("").is_err());
            assert!(DocumentId::new("drafts.").is_err());
            assert!(DocumentId::new("drafts.drafts.x").is_err());
            assert!(DocumentId::new("tab\there").is_err());
            assert!(DocumentId::new("x".repeat(MAX_ID_LEN + 1)).is_err());
        }

        #[test]
        fn serde_rejects_invalid() {
            let parsed: Result<DocumentId, _> = serde_json::from_str("\"\"");
            assert!(parsed.is_err());
        }
    }

    mod array_key {
        use super::*;
        use std::collections::HashSet;

        #[test]
        fn generated_keys_are_unique_within_a_tick() {
            let keys: HashSet<_> = (0..1000).map(|_| ArrayKey::generate()).collect();
            assert_eq!(keys.len(), 1000);
        }

        #[test]
        fn generated_key_is_128_bits_hex() {
            let key = ArrayKey::generate();
            assert_eq!(key.as_str().len(), 32);
            assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    mod document {
        use super::*;

        #[test]
        fn deserializes_system_and_custom_fields() {
            let doc: Document = serde_json::from_value(json!({
                "_id": "drafts.artist-1",
                "_type": "artist",
                "_rev": "abc",
                "name": "Nina",
                "events": [{ "_type": "reference", "_ref": "event-1", "_key": "k1" }]
            }))
            .unwrap();

            assert!(doc.id.is_draft());
            assert_eq!(doc.doc_type, "artist");
            assert_eq!(doc.rev.as_deref(), Some("abc"));
            assert_eq!(doc.field("name"), Some(&json!("Nina")));
            assert!(!doc.fields.contains_key("_id"));
        }

        #[test]
        fn reference_ids_dedupes_and_normalizes_drafts() {
            let doc = Document::new(id("artist-1"), "artist").with_field(
                "events",
                json!([
                    { "_type": "reference", "_ref": "event-2", "_key": "a" },
                    { "_type": "reference", "_ref": "drafts.event-1", "_key": "b" },
                    { "_type": "reference", "_ref": "event-2", "_key": "c" },
                    { "_type": "block", "_key": "d" }
                ]),
            );
            assert_eq!(doc.reference_ids("events"), vec![id("event-2"), id("event-1")]);
        }

        #[test]
        fn single_reference_field() {
            let doc = Document::new(id("event-1"), "event")
                .with_field("date", json!({ "_type": "reference", "_ref": "date-1" }));
            assert_eq!(doc.reference_ids("date"), vec![id("date-1")]);
            assert!(doc.references("date", &id("drafts.date-1")));
            assert!(!doc.references("date", &id("date-2")));
        }

        #[test]
        fn get_path_walks_objects() {
            let doc = Document::new(id("date-1"), "eventDate")
                .with_field("when", json!({ "start": "2024-06-01" }));
            assert_eq!(doc.get_path("when.start"), Some(&json!("2024-06-01")));
            assert_eq!(doc.get_path("when.end"), None);
            assert_eq!(doc.get_path("missing"), None);
        }

        #[test]
        fn label_falls_back_to_published_id() {
            let named = Document::new(id("drafts.a"), "artist").with_field("name", json!("Nina"));
            assert_eq!(named.label(Some("name")), "Nina");

            let blank = Document::new(id("drafts.a"), "artist").with_field("name", json!("  "));
            assert_eq!(blank.label(Some("name")), "a");
            assert_eq!(blank.label(None), "a");
        }

        #[test]
        fn keyed_reference_uses_published_id() {
            let r = Reference::keyed(&id("drafts.event-9"));
            assert_eq!(r.target, id("event-9"));
            assert!(r.key.is_some());
            assert!(points_at(&r.to_value(), &id("event-9")));
        }
    }
}
