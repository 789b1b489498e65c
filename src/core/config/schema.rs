//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! interactive = true
//!
//! [store]
//! kind = "http"
//! project_id = "abc123"
//! dataset = "production"
//! token_env = "SANITY_API_TOKEN"
//!
//! [policy]
//! order = ["additions", "removals", "listing"]
//!
//! [[relationship]]
//! source_type = "artist"
//! source_field = "events"
//! target_type = "event"
//! target_field = "artist"
//!
//! [[entity]]
//! type = "artist"
//! label = "Artist"
//! title_field = "name"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing: store kinds must be known, the
//! decision order must not repeat a branch, and registry declarations
//! must be non-empty and unique.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::registry::{EntityConfig, Registry, RelationshipPair};
use crate::workflow::DecisionBranch;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// Document store settings
    pub store: Option<StoreConfig>,

    /// Publish workflow policy
    pub policy: Option<PolicyConfig>,

    /// Relationship declarations; empty means the built-in registry
    pub relationship: Vec<RelationshipPair>,

    /// Entity declarations; empty means the built-in registry
    pub entity: Vec<EntityConfig>,
}

impl ConfigFile {
    /// A config file holding the built-in registry, used by `config init`.
    pub fn with_builtin_registry() -> Self {
        let registry = Registry::festival();
        Self {
            interactive: None,
            store: Some(StoreConfig {
                kind: Some("file".into()),
                path: Some(PathBuf::from("dataset.json")),
                ..StoreConfig::default()
            }),
            policy: None,
            relationship: registry.relationships,
            entity: registry.entities,
        }
    }

    /// Whether the file declares its own registry.
    pub fn declares_registry(&self) -> bool {
        !self.relationship.is_empty() || !self.entity.is_empty()
    }

    /// The declared registry, or the built-in one when none is declared.
    pub fn registry(&self) -> Registry {
        if self.declares_registry() {
            Registry {
                relationships: self.relationship.clone(),
                entities: self.entity.clone(),
            }
        } else {
            Registry::festival()
        }
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(store) = &self.store {
            store.validate()?;
        }
        if let Some(policy) = &self.policy {
            policy.validate()?;
        }
        self.registry()
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }
}

/// Document store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend: "memory", "file" or "http" (default: "file")
    pub kind: Option<String>,

    /// Dataset file for the file store, seed file for the memory store
    pub path: Option<PathBuf>,

    /// Hosted project id (http)
    pub project_id: Option<String>,

    /// Dataset name (http, default: "production")
    pub dataset: Option<String>,

    /// API version date (http)
    pub api_version: Option<String>,

    /// Explicit API base URL overriding the project host (http)
    pub api_host: Option<String>,

    /// Environment variable holding the API token (http)
    pub token_env: Option<String>,
}

impl StoreConfig {
    /// Validate the store settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(kind) = &self.kind {
            let valid = crate::store::valid_store_kinds();
            if !valid.contains(&kind.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid store kind '{}', must be one of: {}",
                    kind,
                    valid.join(", ")
                )));
            }
        }
        if let Some(dataset) = &self.dataset {
            if dataset.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "store dataset cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Publish workflow policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Order in which decision prompts are offered after publish.
    /// Branches left out are never offered.
    pub order: Option<Vec<DecisionBranch>>,
}

impl PolicyConfig {
    /// Validate the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(order) = &self.order {
            for (i, branch) in order.iter().enumerate() {
                if order[..i].contains(branch) {
                    return Err(ConfigError::InvalidValue(format!(
                        "policy order lists '{}' more than once",
                        branch
                    )));
                }
            }
        }
        Ok(())
    }
}
