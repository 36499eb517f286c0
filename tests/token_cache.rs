//! Token cache persistence tests
//!
//! Encrypted caches read `PYLOT_ENCRYPTION_KEY`, so tests that set or clear it
//! are serialized.

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use pylot::storage::{
    EncryptedFilesystemStorage, FilesystemStorage, StorageBackend, ENCRYPTION_KEY_ENV,
};
use pylot::TokenCache;
use secrecy::ExposeSecret;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn age_key_base64() -> String {
    let identity = age::x25519::Identity::generate();
    general_purpose::STANDARD.encode(identity.to_string().expose_secret().as_bytes())
}

#[tokio::test]
#[serial]
async fn test_encrypted_cache_shared_through_environment_key() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(ENCRYPTION_KEY_ENV, age_key_base64());

    let writer =
        EncryptedFilesystemStorage::with_key_path(dir.path(), dir.path().join("writer.key"))
            .await
            .unwrap();
    TokenCache::new(Arc::new(writer)).store("launchpad-token").await.unwrap();

    // The on-disk entry is not plaintext
    let raw = std::fs::read(dir.path().join("cumulus/token.json")).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("launchpad-token"));

    let reader =
        EncryptedFilesystemStorage::with_key_path(dir.path(), dir.path().join("reader.key"))
            .await
            .unwrap();
    let cache = TokenCache::new(Arc::new(reader));
    assert_eq!(cache.load().await.unwrap().as_deref(), Some("launchpad-token"));

    // No key file is written while the environment supplies the key
    assert!(!dir.path().join("writer.key").exists());
    std::env::remove_var(ENCRYPTION_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_generated_key_file_is_reused_and_foreign_key_fails() {
    std::env::remove_var(ENCRYPTION_KEY_ENV);
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("encryption.key");

    let first = EncryptedFilesystemStorage::with_key_path(dir.path(), &key_path)
        .await
        .unwrap();
    TokenCache::new(Arc::new(first)).store("t1").await.unwrap();
    assert!(key_path.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let again = EncryptedFilesystemStorage::with_key_path(dir.path(), &key_path)
        .await
        .unwrap();
    assert_eq!(
        TokenCache::new(Arc::new(again)).load().await.unwrap().as_deref(),
        Some("t1")
    );

    let other = EncryptedFilesystemStorage::with_key_path(dir.path(), dir.path().join("other.key"))
        .await
        .unwrap();
    assert!(TokenCache::new(Arc::new(other)).load().await.is_err());
}

#[tokio::test]
async fn test_expired_and_corrupt_entries_are_misses() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(dir.path()).unwrap());

    let cache = TokenCache::new(Arc::clone(&storage)).with_ttl(Duration::ZERO);
    cache.store("short-lived").await.unwrap();
    assert_eq!(cache.load().await.unwrap(), None);

    storage.write("cumulus/token.json", b"not json").await.unwrap();
    assert_eq!(TokenCache::new(Arc::clone(&storage)).load().await.unwrap(), None);

    cache.invalidate().await.unwrap();
    assert!(!storage.exists("cumulus/token.json"));
    cache.invalidate().await.unwrap();
}

#[tokio::test]
async fn test_jwt_expiry_caps_cache_lifetime() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemStorage::new(dir.path()).unwrap());

    let expired_jwt = encode(
        &Header::default(),
        &json!({"sub": "user", "exp": (Utc::now() - ChronoDuration::minutes(5)).timestamp()}),
        &EncodingKey::from_secret(b"launchpad"),
    )
    .unwrap();
    let live_jwt = encode(
        &Header::default(),
        &json!({"sub": "user", "exp": (Utc::now() + ChronoDuration::hours(8)).timestamp()}),
        &EncodingKey::from_secret(b"launchpad"),
    )
    .unwrap();

    let cache = TokenCache::new(storage);
    cache.store(&expired_jwt).await.unwrap();
    assert_eq!(cache.load().await.unwrap(), None);

    cache.store(&live_jwt).await.unwrap();
    assert_eq!(cache.load().await.unwrap(), Some(live_jwt));
}
