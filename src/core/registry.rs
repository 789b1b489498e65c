//! core::registry
//!
//! Static declarations of bidirectional relationships and per-entity
//! reconciliation settings.
//!
//! # Overview
//!
//! A [`RelationshipPair`] states that `source_type.source_field` and
//! `target_type.target_field` must contain each other's ids. Pairs are
//! directional in naming only: `artist.events <-> event.artist` is declared
//! once per direction the publish workflow should check.
//!
//! An [`EntityConfig`] carries everything else the workflows need for one
//! document type: its display label, the field used to label documents in
//! prompts, an optional derived sort key, an optional listing page, and the
//! referrers the delete guard must clean up.
//!
//! The registry is pure data. [`Registry::festival`] is the built-in set
//! used when no configuration file declares one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::DocumentId;

/// Errors from registry validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("empty {what} in {context}")]
    EmptyName {
        what: &'static str,
        context: String,
    },

    #[error("entity type '{0}' declared more than once")]
    DuplicateEntity(String),

    #[error("relationship {0} declared more than once")]
    DuplicateRelationship(String),
}

/// Declares that two reference fields must mirror each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipPair {
    pub source_type: String,
    pub source_field: String,
    pub target_type: String,
    pub target_field: String,
}

impl RelationshipPair {
    pub fn new(
        source_type: impl Into<String>,
        source_field: impl Into<String>,
        target_type: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_field: source_field.into(),
            target_type: target_type.into(),
            target_field: target_field.into(),
        }
    }

    /// The same relationship viewed from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            source_type: self.target_type.clone(),
            source_field: self.target_field.clone(),
            target_type: self.source_type.clone(),
            target_field: self.source_field.clone(),
        }
    }
}

impl std::fmt::Display for RelationshipPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} <-> {}.{}",
            self.source_type, self.source_field, self.target_type, self.target_field
        )
    }
}

/// A scalar mirrored from a referenced document, used as a sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DerivedField {
    /// Field on this document holding a single reference.
    pub reference_field: String,
    /// Field on this document receiving the mirrored value.
    pub target_field: String,
    /// Dotted path of the value on the referenced document.
    pub source_value_path: String,
}

/// Singleton document holding a curated reference array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingPage {
    pub document_id: DocumentId,
    pub field: String,
}

impl ListingPage {
    /// Listing page for a fixed document id, or `None` if the id is malformed.
    pub fn new(document_id: &str, field: impl Into<String>) -> Option<Self> {
        DocumentId::new(document_id).ok().map(|document_id| Self {
            document_id,
            field: field.into(),
        })
    }
}

/// A `(type, field)` location that may reference a document being deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferrerConfig {
    pub referring_type: String,
    pub field: String,
}

impl ReferrerConfig {
    pub fn new(referring_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            referring_type: referring_type.into(),
            field: field.into(),
        }
    }
}

/// Reconciliation settings for one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Document `_type`.
    #[serde(rename = "type")]
    pub doc_type: String,

    /// Human-readable singular name ("Artist").
    pub label: String,

    /// Field used to label documents of this type in prompts.
    #[serde(default)]
    pub title_field: Option<String>,

    #[serde(default)]
    pub derived: Option<DerivedField>,

    #[serde(default)]
    pub listing: Option<ListingPage>,

    #[serde(default, rename = "referrer")]
    pub referrers: Vec<ReferrerConfig>,
}

/// All relationship pairs and entity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Registry {
    #[serde(rename = "relationship")]
    pub relationships: Vec<RelationshipPair>,

    #[serde(rename = "entity")]
    pub entities: Vec<EntityConfig>,
}

impl Registry {
    /// Built-in registry for the festival site: artists, events and dates.
    pub fn festival() -> Self {
        let artist_events = RelationshipPair::new("artist", "events", "event", "artist");
        Self {
            relationships: vec![artist_events.reversed(), artist_events],
            entities: vec![
                EntityConfig {
                    doc_type: "artist".into(),
                    label: "Artist".into(),
                    title_field: Some("name".into()),
                    derived: None,
                    listing: ListingPage::new("artistsPage", "artists"),
                    referrers: vec![
                        ReferrerConfig::new("event", "artist"),
                        ReferrerConfig::new("artistsPage", "artists"),
                    ],
                },
                EntityConfig {
                    doc_type: "event".into(),
                    label: "Event".into(),
                    title_field: Some("title".into()),
                    derived: Some(DerivedField {
                        reference_field: "date".into(),
                        target_field: "sortDate".into(),
                        source_value_path: "date".into(),
                    }),
                    listing: ListingPage::new("eventsPage", "events"),
                    referrers: vec![
                        ReferrerConfig::new("artist", "events"),
                        ReferrerConfig::new("eventsPage", "events"),
                    ],
                },
                EntityConfig {
                    doc_type: "eventDate".into(),
                    label: "Date".into(),
                    title_field: Some("date".into()),
                    derived: None,
                    listing: None,
                    referrers: vec![ReferrerConfig::new("event", "date")],
                },
            ],
        }
    }

    /// Settings for a document type, if declared.
    pub fn entity(&self, doc_type: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.doc_type == doc_type)
    }

    /// Pairs whose source side is `doc_type`, in declaration order.
    pub fn pairs_from<'a>(&'a self, doc_type: &'a str) -> impl Iterator<Item = &'a RelationshipPair> {
        self.relationships
            .iter()
            .filter(move |p| p.source_type == doc_type)
    }

    /// Title field declared for a document type.
    pub fn title_field(&self, doc_type: &str) -> Option<&str> {
        self.entity(doc_type).and_then(|e| e.title_field.as_deref())
    }

    /// Check that names are non-empty and declarations are unique.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen_pairs = Vec::new();
        for pair in &self.relationships {
            let context = format!("relationship {pair}");
            for (what, value) in [
                ("source type", &pair.source_type),
                ("source field", &pair.source_field),
                ("target type", &pair.target_type),
                ("target field", &pair.target_field),
            ] {
                non_empty(what, value, &context)?;
            }
            if seen_pairs.contains(&pair) {
                return Err(RegistryError::DuplicateRelationship(pair.to_string()));
            }
            seen_pairs.push(pair);
        }

        let mut seen_types = Vec::new();
        for entity in &self.entities {
            let context = format!("entity '{}'", entity.doc_type);
            non_empty("type", &entity.doc_type, &context)?;
            non_empty("label", &entity.label, &context)?;
            if let Some(derived) = &entity.derived {
                non_empty("derived reference field", &derived.reference_field, &context)?;
                non_empty("derived target field", &derived.target_field, &context)?;
                non_empty("derived source path", &derived.source_value_path, &context)?;
            }
            if let Some(listing) = &entity.listing {
                non_empty("listing field", &listing.field, &context)?;
            }
            for referrer in &entity.referrers {
                non_empty("referring type", &referrer.referring_type, &context)?;
                non_empty("referrer field", &referrer.field, &context)?;
            }
            if seen_types.contains(&&entity.doc_type) {
                return Err(RegistryError::DuplicateEntity(entity.doc_type.clone()));
            }
            seen_types.push(&entity.doc_type);
        }
        Ok(())
    }
}

fn non_empty(what: &'static str, value: &str, context: &str) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::EmptyName {
            what,
            context: context.to_string(),
        });
    }
    Ok(())
}
