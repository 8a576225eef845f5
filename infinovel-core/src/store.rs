//! Document store abstraction.
//!
//! The engine only needs keyed JSON documents grouped in collections:
//! get, set, shallow merge, delete and append-with-generated-key. Two
//! backends are provided:
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`FileStore`], one pretty-printed JSON file per document

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Key of the single save slot inside a user's `saved_stories` collection.
pub const SAVE_KEY: &str = "main_story";

/// Key of the profile document inside a user's `profile` collection.
pub const PROFILE_KEY: &str = "user_data";

/// Errors from document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Document {collection}/{key} is not a JSON object")]
    NotAnObject { collection: String, key: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed JSON documents grouped into slash-separated collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` when absent.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Create or replace a document.
    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), StoreError>;

    /// Remove a document. Removing an absent document succeeds.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Shallow-merge top-level `fields` into a document, creating it when absent.
    async fn merge(&self, collection: &str, key: &str, fields: Value) -> Result<(), StoreError> {
        let Value::Object(fields) = fields else {
            return Err(StoreError::NotAnObject {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        };

        let mut document = match self.get(collection, key).await? {
            Some(Value::Object(existing)) => existing,
            Some(_) => {
                return Err(StoreError::NotAnObject {
                    collection: collection.to_string(),
                    key: key.to_string(),
                })
            }
            None => serde_json::Map::new(),
        };
        document.extend(fields);

        self.set(collection, key, Value::Object(document)).await
    }

    /// Store a document under a freshly generated key, returning the key.
    async fn append(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        let key = uuid::Uuid::new_v4().to_string();
        self.set(collection, &key, document).await?;
        Ok(key)
    }
}

/// Fetch and deserialize a typed document.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(collection, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and store a typed document.
pub async fn set_typed<T: Serialize + ?Sized>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &str,
    document: &T,
) -> Result<(), StoreError> {
    store
        .set(collection, key, serde_json::to_value(document)?)
        .await
}

/// Collection paths for one application id.
///
/// Per-user data lives under `artifacts/{app}/users/{uid}/...`; data shared
/// by every player lives under `artifacts/{app}/public/data/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    app_id: String,
}

impl Namespace {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn user(&self, uid: &str, collection: &str) -> String {
        format!("artifacts/{}/users/{uid}/{collection}", self.app_id)
    }

    fn public(&self, collection: &str) -> String {
        format!("artifacts/{}/public/data/{collection}", self.app_id)
    }

    pub fn saves(&self, uid: &str) -> String {
        self.user(uid, "saved_stories")
    }

    pub fn profile(&self, uid: &str) -> String {
        self.user(uid, "profile")
    }

    pub fn choice_stats(&self) -> String {
        self.public("choice_stats")
    }

    pub fn chapter_cache(&self) -> String {
        self.public("chapter_cache")
    }

    pub fn feedback(&self) -> String {
        self.public("feedback")
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new("infinovel")
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert((collection.to_string(), key.to_string()), document);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .remove(&(collection.to_string(), key.to_string()));
        Ok(())
    }
}

/// Store keeping each document as `{root}/{collection}/{key}.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_segment(segment: &str) -> Result<(), StoreError> {
        let valid = !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidPath(segment.to_string()))
        }
    }

    fn document_path(&self, collection: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in collection.split('/') {
            Self::check_segment(segment)?;
            path.push(segment);
        }
        Self::check_segment(key)?;
        path.push(format!("{key}.json"));
        Ok(path)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(collection, key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), StoreError> {
        let path = self.document_path(collection, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a half-written document
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&document)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let path = self.document_path(collection, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("c", "k").await.unwrap().is_none());

        store.set("c", "k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("c", "k").await.unwrap(), Some(json!({"a": 1})));

        store.delete("c", "k").await.unwrap();
        assert!(store.get("c", "k").await.unwrap().is_none());
        store.delete("c", "k").await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_is_shallow_and_creates() {
        let store = MemoryStore::new();
        store.merge("c", "k", json!({"a": 1})).await.unwrap();
        store
            .merge("c", "k", json!({"b": {"x": 1}}))
            .await
            .unwrap();
        store
            .merge("c", "k", json!({"b": {"y": 2}}))
            .await
            .unwrap();

        let doc = store.get("c", "k").await.unwrap().unwrap();
        assert_eq!(doc, json!({"a": 1, "b": {"y": 2}}));

        assert!(matches!(
            store.merge("c", "k", json!(3)).await,
            Err(StoreError::NotAnObject { .. })
        ));
    }

    #[tokio::test]
    async fn test_append_generates_distinct_keys() {
        let store = MemoryStore::new();
        let a = store.append("log", json!({"n": 1})).await.unwrap();
        let b = store.append("log", json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count("log").await, 2);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let ns = Namespace::default();
        let collection = ns.saves("user-1");

        store
            .set(&collection, SAVE_KEY, json!({"version": 1}))
            .await
            .unwrap();
        let path = dir
            .path()
            .join("artifacts/infinovel/users/user-1/saved_stories/main_story.json");
        assert!(path.exists());

        let doc = store.get(&collection, SAVE_KEY).await.unwrap().unwrap();
        assert_eq!(doc["version"], 1);

        store.delete(&collection, SAVE_KEY).await.unwrap();
        assert!(!path.exists());
        assert!(store.get(&collection, SAVE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.get("artifacts/../etc", "passwd").await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.set("c", "a/b", json!({})).await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryStore::new();
        set_typed(&store, "c", "k", &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<u32>> = get_typed(&store, "c", "k").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_namespace_paths() {
        let ns = Namespace::new("demo");
        assert_eq!(ns.saves("u"), "artifacts/demo/users/u/saved_stories");
        assert_eq!(ns.profile("u"), "artifacts/demo/users/u/profile");
        assert_eq!(ns.choice_stats(), "artifacts/demo/public/data/choice_stats");
        assert_eq!(ns.chapter_cache(), "artifacts/demo/public/data/chapter_cache");
        assert_eq!(ns.feedback(), "artifacts/demo/public/data/feedback");
    }
}
