//! Object storage seam.
//!
//! The pipeline only talks to [`ObjectStore`]. [`crate::aws::S3Store`] backs it
//! with S3; [`MemoryStore`] keeps objects in a map and stands in for S3 in tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Body and attributes of a put.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub body: Bytes,
    pub content_type: String,
    pub storage_class: String,
    pub metadata: BTreeMap<String, String>,
}

/// Result of a HEAD request.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHead {
    pub content_length: i64,
    pub storage_class: Option<String>,
    pub e_tag: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// One listed object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: i64,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Set when the store holds more objects than this page returned.
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn put(&self, bucket: &str, key: &str, object: PutObject) -> Result<()>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    async fn list(&self, bucket: &str, prefix: &str, token: Option<String>) -> Result<ListPage>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    object: PutObject,
    last_modified: DateTime<Utc>,
}

/// In-memory store. Listing is ordered by key and split into pages of
/// `page_size` objects, the token being the last key of the previous page.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    page_size: usize,
    deletes: Mutex<Vec<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Seeds an object with an explicit last-modified time.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let object = PutObject {
            body: body.into(),
            content_type: "application/octet-stream".to_string(),
            storage_class: "STANDARD".to_string(),
            metadata: BTreeMap::new(),
        };
        self.lock_objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                object,
                last_modified,
            },
        );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock_objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Stored attributes of an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<PutObject> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|stored| stored.object.clone())
    }

    /// Keys deleted so far, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|stored| stored.object.body.clone())
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{}/{}", bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, object: PutObject) -> Result<()> {
        self.lock_objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                object,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let objects = self.lock_objects();
        let stored = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| anyhow!("NotFound: s3://{}/{}", bucket, key))?;

        Ok(ObjectHead {
            content_length: stored.object.body.len() as i64,
            storage_class: Some(stored.object.storage_class.clone()),
            e_tag: Some(format!("\"{:x}\"", md5::compute(&stored.object.body))),
            metadata: stored.object.metadata.clone().into_iter().collect(),
        })
    }

    async fn list(&self, bucket: &str, prefix: &str, token: Option<String>) -> Result<ListPage> {
        let objects = self.lock_objects();
        let mut matching = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .filter(|((_, k), _)| token.as_ref().is_none_or(|after| k > after))
            .map(|((_, k), stored)| ObjectSummary {
                key: k.clone(),
                last_modified: stored.last_modified,
                size: stored.object.body.len() as i64,
            });

        let page: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let next_token = match (matching.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.key.clone()),
            _ => None,
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.lock_objects().remove(&(bucket.to_string(), key.to_string()));
        if let Ok(mut deletes) = self.deletes.lock() {
            deletes.push(key.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn list_pages_follow_tokens() {
        let store = MemoryStore::with_page_size(2);
        let now = Utc::now();
        for i in 0..5 {
            store.insert("b", &format!("raw/x/{i}"), "data", now);
        }
        store.insert("b", "other/y", "data", now);

        let first = store.list("b", "raw/x/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        let second = store.list("b", "raw/x/", first.next_token).await.unwrap();
        assert_eq!(second.objects[0].key, "raw/x/2");
        let third = store.list("b", "raw/x/", second.next_token).await.unwrap();
        assert_eq!(third.objects.len(), 1);
        assert!(third.next_token.is_none());
    }

    #[tokio::test]
    async fn head_reports_stored_attributes() {
        let store = MemoryStore::new();
        store.insert("b", "k", vec![1u8, 2, 3], Utc::now() - Duration::days(1));

        let head = store.head("b", "k").await.unwrap();
        assert_eq!(head.content_length, 3);
        assert_eq!(head.storage_class.as_deref(), Some("STANDARD"));
        // Single-part ETag: quoted MD5 hex of the body.
        assert_eq!(head.e_tag.as_deref(), Some("\"5289df737df57326fcdd22597afb1fac\""));
        assert!(store.head("b", "missing").await.is_err());
        assert!(store.get("other", "k").await.is_err());
    }
}
