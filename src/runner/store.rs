//! Persistence for scenarios, suites, results and runs.
//!
//! Backends store JSON documents grouped by [`Collection`]; [`TestStore`]
//! layers the typed API on top.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::scenario::{TestScenario, TestSuite};
use super::state::{TestResult, TestRun};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored document is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Scenarios,
    Suites,
    Results,
    Runs,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Scenarios => "scenarios",
            Collection::Suites => "suites",
            Collection::Results => "results",
            Collection::Runs => "runs",
        }
    }
}

/// Raw document storage backend
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace, keeping the original insertion position
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        owner: &str,
        body: Value,
    ) -> Result<(), StoreError>;
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;
    /// Documents in insertion order, optionally filtered by owner
    async fn list(
        &self,
        collection: Collection,
        owner: Option<&str>,
    ) -> Result<Vec<Value>, StoreError>;
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;
}

/// Types that live in a collection
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    fn id(&self) -> &str;
    /// Grouping key used for filtered listing
    fn owner(&self) -> &str;
}

impl Document for TestScenario {
    const COLLECTION: Collection = Collection::Scenarios;
    fn id(&self) -> &str {
        &self.id
    }
    fn owner(&self) -> &str {
        &self.workflow_id
    }
}

impl Document for TestSuite {
    const COLLECTION: Collection = Collection::Suites;
    fn id(&self) -> &str {
        &self.id
    }
    fn owner(&self) -> &str {
        &self.workflow_id
    }
}

impl Document for TestResult {
    const COLLECTION: Collection = Collection::Results;
    fn id(&self) -> &str {
        &self.id
    }
    fn owner(&self) -> &str {
        &self.scenario_id
    }
}

impl Document for TestRun {
    const COLLECTION: Collection = Collection::Runs;
    fn id(&self) -> &str {
        &self.id
    }
    fn owner(&self) -> &str {
        &self.suite_id
    }
}

/// Typed access to test records
#[derive(Clone)]
pub struct TestStore {
    backend: Arc<dyn DocumentStore>,
}

impl TestStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub async fn save<T: Document>(&self, doc: &T) -> Result<(), StoreError> {
        let body = serde_json::to_value(doc)?;
        self.backend.put(T::COLLECTION, doc.id(), doc.owner(), body).await
    }

    pub async fn get<T: Document>(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(T::COLLECTION, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    pub async fn list<T: Document>(&self, owner: Option<&str>) -> Result<Vec<T>, StoreError> {
        self.backend
            .list(T::COLLECTION, owner)
            .await?
            .into_iter()
            .map(|body| serde_json::from_value(body).map_err(StoreError::from))
            .collect()
    }

    pub async fn delete<T: Document>(&self, id: &str) -> Result<bool, StoreError> {
        self.backend.delete(T::COLLECTION, id).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<(String, String, Value)>>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        owner: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        match docs.iter_mut().find(|(doc_id, _, _)| doc_id == id) {
            Some(existing) => {
                existing.1 = owner.to_string();
                existing.2 = body;
            }
            None => docs.push((id.to_string(), owner.to_string(), body)),
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|(doc_id, _, _)| doc_id == id))
            .map(|(_, _, body)| body.clone()))
    }

    async fn list(
        &self,
        collection: Collection,
        owner: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc_owner, _)| owner.map_or(true, |o| o == doc_owner))
                    .map(|(_, _, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|(doc_id, _, _)| doc_id != id);
        Ok(docs.len() != before)
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS test_documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    owner TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (collection, id)
)";

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and ensure the schema
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to an in-memory database is its own database
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        owner: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO test_documents (collection, id, owner, body) VALUES (?, ?, ?, ?)
             ON CONFLICT (collection, id) DO UPDATE SET owner = excluded.owner, body = excluded.body",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(owner)
        .bind(serde_json::to_string(&body)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM test_documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        collection: Collection,
        owner: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM test_documents
             WHERE collection = ? AND (? IS NULL OR owner = ?)
             ORDER BY seq",
        )
        .bind(collection.as_str())
        .bind(owner)
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Value, StoreError> {
                let body: String = row.try_get("body")?;
                Ok(serde_json::from_str(&body)?)
            })
            .collect()
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM test_documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn exercise(store: TestStore) {
        let mut first = TestScenario::new("happy path", "w1", json!({"a": 1}));
        let second = TestScenario::new("other workflow", "w2", json!({}));
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        first.retry_count = 2;
        store.save(&first).await.unwrap();

        let loaded: TestScenario = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded.retry_count, 2);

        let all: Vec<TestScenario> = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);

        let w2: Vec<TestScenario> = store.list(Some("w2")).await.unwrap();
        assert_eq!(w2.len(), 1);

        assert!(store.delete::<TestScenario>(&second.id).await.unwrap());
        assert!(!store.delete::<TestScenario>(&second.id).await.unwrap());
        assert!(store.get::<TestScenario>(&second.id).await.unwrap().is_none());
        assert!(store.get::<TestSuite>(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(TestStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let backend = SqliteStore::connect("sqlite::memory:").await.unwrap();
        exercise(TestStore::new(Arc::new(backend))).await;
    }
}
