//! store::factory
//!
//! Store selection and creation from configuration.

use thiserror::Error;
use tracing::debug;

use super::file::FileStore;
use super::http::HttpStore;
use super::memory::MemoryStore;
use super::traits::{DocumentStore, StoreError};
use crate::core::config::schema::StoreConfig;

/// Default content API version.
pub const DEFAULT_API_VERSION: &str = "2021-10-21";

/// Default environment variable holding the API token.
pub const DEFAULT_TOKEN_ENV: &str = "SANITY_API_TOKEN";

/// Errors from store creation.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown store kind '{0}', must be one of: memory, file, http")]
    UnknownKind(String),

    #[error("store kind '{kind}' requires '{setting}'")]
    MissingSetting {
        kind: &'static str,
        setting: &'static str,
    },

    #[error("failed to seed store: {0}")]
    Seed(#[from] StoreError),
}

/// Supported store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    File,
    Http,
}

impl StoreKind {
    pub fn parse(name: &str) -> Result<Self, FactoryError> {
        match name {
            "memory" => Ok(StoreKind::Memory),
            "file" => Ok(StoreKind::File),
            "http" => Ok(StoreKind::Http),
            other => Err(FactoryError::UnknownKind(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::File => "file",
            StoreKind::Http => "http",
        }
    }
}

/// Names accepted for `store.kind`.
pub fn valid_store_kinds() -> &'static [&'static str] {
    &["memory", "file", "http"]
}

/// Create a store from configuration.
///
/// A `memory` store is seeded from `path` when one is set, and never writes
/// back; this is how dry runs work.
pub fn create_store(config: &StoreConfig) -> Result<Box<dyn DocumentStore>, FactoryError> {
    let kind = StoreKind::parse(config.kind.as_deref().unwrap_or("file"))?;
    debug!(kind = kind.as_str(), "creating document store");

    match kind {
        StoreKind::Memory => {
            let documents = match &config.path {
                Some(path) => FileStore::new(path).load()?,
                None => Vec::new(),
            };
            Ok(Box::new(MemoryStore::with_documents(documents)))
        }
        StoreKind::File => {
            let path = config.path.as_ref().ok_or(FactoryError::MissingSetting {
                kind: "file",
                setting: "path",
            })?;
            Ok(Box::new(FileStore::new(path)))
        }
        StoreKind::Http => {
            let dataset = config.dataset.as_deref().unwrap_or("production");
            let token_env = config.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
            let token = std::env::var(token_env).ok().filter(|t| !t.is_empty());
            if token.is_none() {
                debug!(token_env, "no API token set; store is read-only");
            }

            let store = match (&config.api_host, &config.project_id) {
                (Some(host), _) => HttpStore::with_api_base(host.clone(), dataset, token),
                (None, Some(project)) => HttpStore::new(
                    project,
                    dataset,
                    config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION),
                    token,
                ),
                (None, None) => {
                    return Err(FactoryError::MissingSetting {
                        kind: "http",
                        setting: "project_id",
                    })
                }
            };
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Document, DocumentId};
    use tempfile::TempDir;

    #[test]
    fn parse_kinds() {
        for name in valid_store_kinds() {
            assert_eq!(StoreKind::parse(name).unwrap().as_str(), *name);
        }
        assert!(matches!(
            StoreKind::parse("postgres"),
            Err(FactoryError::UnknownKind(_))
        ));
    }

    #[test]
    fn file_store_requires_path() {
        let config = StoreConfig {
            kind: Some("file".into()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            create_store(&config),
            Err(FactoryError::MissingSetting { setting: "path", .. })
        ));
    }

    #[test]
    fn http_store_requires_project_or_host() {
        let config = StoreConfig {
            kind: Some("http".into()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            create_store(&config),
            Err(FactoryError::MissingSetting { setting: "project_id", .. })
        ));

        let config = StoreConfig {
            kind: Some("http".into()),
            project_id: Some("abc123".into()),
            ..StoreConfig::default()
        };
        assert_eq!(create_store(&config).unwrap().name(), "http");
    }

    #[tokio::test]
    async fn memory_store_seeds_from_dataset_without_writing_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        let id = DocumentId::new("drafts.a").unwrap();
        FileStore::new(&path)
            .save(&[Document::new(id.clone(), "artist")])
            .unwrap();

        let config = StoreConfig {
            kind: Some("memory".into()),
            path: Some(path.clone()),
            ..StoreConfig::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "memory");
        store.publish(&id).await.unwrap();

        let on_disk = FileStore::new(&path).load().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert!(on_disk[0].id.is_draft());
    }
}
