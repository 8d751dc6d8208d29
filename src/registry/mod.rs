//! Durable named storage for templates
//!
//! The registry is an external collaborator keyed by hierarchical paths of
//! the form `/{kind}/{namespace}/{name}`. Backends implement the `Registry`
//! trait; the typed `TemplateStore` sits on top.

pub mod templates;

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRegistry;

pub use templates::{ConfigurationHandle, ProfileHandle, TemplateStore};

use crate::core::error::LaunchError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Kinds of objects the registry stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Profile,
    Configuration,
    Function,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Profile => "profile",
            TemplateKind::Configuration => "configuration",
            TemplateKind::Function => "function",
        }
    }
}

/// Build the hierarchical key for an entry
pub fn registry_key(kind: TemplateKind, namespace: &str, name: &str) -> String {
    format!("/{}/{}/{}", kind.as_str(), namespace, name)
}

/// One page of listed entry names
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}

/// Trait for registry backends
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch an entry; `NotFound` when absent
    async fn get(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, LaunchError>;

    /// Store or replace an entry
    async fn put(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        body: Value,
    ) -> Result<(), LaunchError>;

    /// List entry names within a namespace, one page at a time
    async fn list(
        &self,
        kind: TemplateKind,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, LaunchError>;
}

const PAGE_SIZE: usize = 50;

/// In-memory registry (for testing or ephemeral use)
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn get(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, LaunchError> {
        let entries = self.entries.read().await;
        entries
            .get(&registry_key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| LaunchError::not_found(kind.as_str(), namespace, name))
    }

    async fn put(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        body: Value,
    ) -> Result<(), LaunchError> {
        let mut entries = self.entries.write().await;
        entries.insert(registry_key(kind, namespace, name), body);
        Ok(())
    }

    async fn list(
        &self,
        kind: TemplateKind,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, LaunchError> {
        let prefix = format!("/{}/{}/", kind.as_str(), namespace);
        let entries = self.entries.read().await;

        let mut names: Vec<String> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| LaunchError::Registry(format!("bad page token '{}'", token)))?,
            None => 0,
        };
        let page: Vec<String> = names.iter().skip(start).take(PAGE_SIZE).cloned().collect();
        let next_token = if start + page.len() < names.len() {
            Some((start + page.len()).to_string())
        } else {
            None
        };

        Ok(ListPage {
            names: page,
            next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let registry = InMemoryRegistry::new();
        registry
            .put(TemplateKind::Profile, "default", "secure", json!({"name": "secure"}))
            .await
            .unwrap();

        let body = registry
            .get(TemplateKind::Profile, "default", "secure")
            .await
            .unwrap();
        assert_eq!(body.get("name"), Some(&json!("secure")));
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .get(TemplateKind::Configuration, "default", "absent")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_kinds_do_not_collide() {
        let registry = InMemoryRegistry::new();
        registry
            .put(TemplateKind::Profile, "default", "same", json!(1))
            .await
            .unwrap();
        assert!(registry
            .get(TemplateKind::Configuration, "default", "same")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_pages() {
        let registry = InMemoryRegistry::new();
        for i in 0..3 {
            registry
                .put(TemplateKind::Function, "default", &format!("f{}", i), json!(i))
                .await
                .unwrap();
        }

        let page = registry
            .list(TemplateKind::Function, "default", None)
            .await
            .unwrap();
        assert_eq!(page.names, vec!["f0", "f1", "f2"]);
        assert!(page.next_token.is_none());
    }
}
