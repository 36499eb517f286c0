//! Cloud collaborators
//!
//! The SDK talks to object storage, a secrets store and a serverless compute
//! service only through the traits below. Production deployments plug in
//! their own cloud-SDK implementations; the in-memory ones here back tests
//! and local mirrors.

use crate::storage::{BoxFuture, StorageError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static OBJECT_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^s3://([^/]+)/(.*)$").expect("object URI pattern is valid"));

/// Split an `s3://<bucket>/<key>` URI into bucket and key
pub fn parse_object_uri(uri: &str) -> Option<(&str, &str)> {
    let captures = OBJECT_URI.captures(uri)?;
    let bucket = captures.get(1)?.as_str();
    let key = captures.get(2)?.as_str();
    Some((bucket, key))
}

/// Object storage (S3-compatible)
pub trait ObjectStore: Send + Sync {
    fn get_object_body<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, StorageError>>;

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn copy_object<'a>(
        &'a self,
        bucket: &'a str,
        source_key: &'a str,
        destination_key: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// Secrets store returning plain string secrets
pub trait SecretStore: Send + Sync {
    fn get_secret<'a>(&'a self, secret_id: &'a str) -> BoxFuture<'a, Result<String, StorageError>>;
}

/// Result of a remote function invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub status: u16,
    pub payload: Vec<u8>,
}

/// Serverless compute service
pub trait RemoteFunction: Send + Sync {
    fn invoke<'a>(
        &'a self,
        function_name: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<Invocation, StorageError>>;
}

/// In-memory object store keyed by `(bucket, key)`
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object synchronously (fixture setup)
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert((bucket.to_string(), key.to_string()), body.into());
        }
    }

    /// Current body of an object, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn lock_error() -> StorageError {
        StorageError::Remote("object store lock poisoned".to_string())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_object_body<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move {
            self.objects
                .read()
                .map_err(|_| Self::lock_error())?
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("s3://{}/{}", bucket, key)))
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.objects
                .write()
                .map_err(|_| Self::lock_error())?
                .insert((bucket.to_string(), key.to_string()), body);
            Ok(())
        })
    }

    fn copy_object<'a>(
        &'a self,
        bucket: &'a str,
        source_key: &'a str,
        destination_key: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut objects = self.objects.write().map_err(|_| Self::lock_error())?;
            let body = objects
                .get(&(bucket.to_string(), source_key.to_string()))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("s3://{}/{}", bucket, source_key)))?;
            objects.insert((bucket.to_string(), destination_key.to_string()), body);
            Ok(())
        })
    }
}

/// In-memory secrets store
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, String>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(id.into(), value.into());
        self
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret<'a>(&'a self, secret_id: &'a str) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            self.secrets
                .get(secret_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("secret {}", secret_id)))
        })
    }
}

/// Remote function double that answers every invocation with a fixed result
/// and records the payloads it received
#[derive(Debug, Clone)]
pub struct StaticFunction {
    response: Invocation,
    calls: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
}

impl StaticFunction {
    pub fn new(status: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Invocation {
                status,
                payload: payload.into(),
            },
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// `(function_name, payload)` of every invocation so far
    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }
}

impl RemoteFunction for StaticFunction {
    fn invoke<'a>(
        &'a self,
        function_name: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<Invocation, StorageError>> {
        Box::pin(async move {
            self.calls
                .write()
                .map_err(|_| StorageError::Remote("function call log poisoned".to_string()))?
                .push((function_name.to_string(), payload));
            Ok(self.response.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_uri() {
        assert_eq!(
            parse_object_uri("s3://test_bucket/temp/certificate.pfx"),
            Some(("test_bucket", "temp/certificate.pfx"))
        );
        assert_eq!(parse_object_uri("/fake/path/launchpad.pfx"), None);
        assert_eq!(parse_object_uri("s3:///key"), None);
        assert_eq!(parse_object_uri("https://bucket/key"), None);
    }

    #[tokio::test]
    async fn test_in_memory_object_store_copy() {
        let store = InMemoryObjectStore::new();
        store.insert("internal", "workflows/a.json", b"a".to_vec());

        store
            .copy_object("internal", "workflows/a.json", "workflows/b.json")
            .await
            .unwrap();
        assert_eq!(store.object("internal", "workflows/b.json"), Some(b"a".to_vec()));

        let missing = store.get_object_body("internal", "nope").await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_secret_store() {
        let store =
            InMemorySecretStore::new().with_secret("fake_secretmanager", "supersecretstring");
        assert_eq!(
            store.get_secret("fake_secretmanager").await.unwrap(),
            "supersecretstring"
        );
        assert!(store.get_secret("other").await.is_err());
    }
}
