//! SQLite-backed registry

use crate::core::error::LaunchError;
use crate::registry::{ListPage, Registry, TemplateKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

const PAGE_SIZE: i64 = 50;

/// Durable registry over a local SQLite database
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    /// Open (and initialize) a registry database
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path))
            .await
            .context("Failed to connect to registry database")?;

        let registry = Self { pool };
        registry.init().await?;

        Ok(registry)
    }

    /// Open the registry at the default per-user path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("launchpad");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("registry.db");
        Self::new(db_path.to_str().unwrap()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                kind TEXT NOT NULL,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (kind, namespace, name)
            );

            CREATE INDEX IF NOT EXISTS idx_templates_kind_ns ON templates(kind, namespace);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn get(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, LaunchError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM templates
            WHERE kind = ?1 AND namespace = ?2 AND name = ?3
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LaunchError::Registry(e.to_string()))?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(|e| LaunchError::Registry(e.to_string()))
            }
            None => Err(LaunchError::not_found(kind.as_str(), namespace, name)),
        }
    }

    async fn put(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        body: Value,
    ) -> Result<(), LaunchError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO templates (kind, namespace, name, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(name)
        .bind(body.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| LaunchError::Registry(e.to_string()))?;

        Ok(())
    }

    async fn list(
        &self,
        kind: TemplateKind,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, LaunchError> {
        let offset: i64 = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| LaunchError::Registry(format!("bad page token '{}'", token)))?,
            None => 0,
        };

        let rows = sqlx::query(
            r#"
            SELECT name FROM templates
            WHERE kind = ?1 AND namespace = ?2
            ORDER BY name ASC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(PAGE_SIZE + 1)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LaunchError::Registry(e.to_string()))?;

        let mut names: Vec<String> = rows.iter().map(|row| row.get("name")).collect();
        let next_token = if names.len() as i64 > PAGE_SIZE {
            names.truncate(PAGE_SIZE as usize);
            Some((offset + PAGE_SIZE).to_string())
        } else {
            None
        };

        Ok(ListPage { names, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_registry_roundtrip() {
        let registry = SqliteRegistry::new(":memory:").await.unwrap();

        registry
            .put(
                TemplateKind::Configuration,
                "default",
                "basic",
                json!({"name": "basic"}),
            )
            .await
            .unwrap();

        let body = registry
            .get(TemplateKind::Configuration, "default", "basic")
            .await
            .unwrap();
        assert_eq!(body.get("name"), Some(&json!("basic")));

        let err = registry
            .get(TemplateKind::Configuration, "default", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_registry_list() {
        let registry = SqliteRegistry::new(":memory:").await.unwrap();
        for name in ["a", "b", "c"] {
            registry
                .put(TemplateKind::Profile, "default", name, json!({}))
                .await
                .unwrap();
        }

        let page = registry
            .list(TemplateKind::Profile, "default", None)
            .await
            .unwrap();
        assert_eq!(page.names, vec!["a", "b", "c"]);
        assert!(page.next_token.is_none());
    }
}
