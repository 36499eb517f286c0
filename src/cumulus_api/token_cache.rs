use crate::storage::{EncryptedFilesystemStorage, StorageBackend, StorageError};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Path where bearer tokens are cached relative to the storage root
const TOKEN_CACHE_PATH: &str = "cumulus/token.json";

/// Default lifetime of a cached token when the token itself carries no expiry
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Bearer token persisted between client constructions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    /// The bearer token string
    pub token: String,
    /// When the cached entry stops being usable (RFC 3339)
    pub expires_at: String,
    /// When this token was stored (RFC 3339)
    pub issued_at: String,
}

impl CachedToken {
    /// Wrap `token`, expiring after `ttl` or at the token's own `exp` claim,
    /// whichever comes first
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        let token = token.into();
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1));

        let mut expires_at = now + ttl;
        if let Some(exp) = jwt_expiry(&token) {
            if exp < expires_at {
                expires_at = exp;
            }
        }

        Self {
            token,
            expires_at: expires_at.to_rfc3339(),
            issued_at: now.to_rfc3339(),
        }
    }

    /// Check if the cached entry has expired
    pub fn is_expired(&self) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expiry) => expiry.with_timezone(&Utc) <= Utc::now(),
            Err(e) => {
                tracing::warn!("Failed to parse cached token expiry: {}", e);
                true
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// `exp` claim of a JWT bearer token, if it is one
///
/// The signature is not checked: the claim is only used to avoid caching a
/// token past its own lifetime. The API remains the authority on validity.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let exp = data.claims.exp?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Token cache over any [`StorageBackend`]
///
/// Tokens are reused only until they expire; there is no implicit refresh.
#[derive(Clone)]
pub struct TokenCache {
    storage: Arc<dyn StorageBackend>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").field("ttl", &self.ttl).finish()
    }
}

impl TokenCache {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Encrypted on-disk cache at `~/.pylot/<instance_id>`
    ///
    /// The encryption key comes from `PYLOT_ENCRYPTION_KEY` (base64) or a
    /// generated key file next to the cache.
    pub async fn encrypted(instance_id: &str) -> Result<Self, StorageError> {
        tracing::debug!(
            "Using encrypted token cache at ~/.pylot/{} (PYLOT_ENCRYPTION_KEY can override key)",
            instance_id
        );
        let storage = EncryptedFilesystemStorage::new_with_instance(instance_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to initialize encrypted token cache: {}", e);
                e
            })?;
        Ok(Self::new(Arc::new(storage)))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached token, if present and not expired
    ///
    /// An unreadable or expired entry is treated as a miss.
    pub async fn load(&self) -> Result<Option<String>, StorageError> {
        if !self.storage.exists(TOKEN_CACHE_PATH) {
            tracing::debug!("No cached token found");
            return Ok(None);
        }

        let json = self.storage.read(TOKEN_CACHE_PATH).await?;
        let cached: CachedToken = match serde_json::from_slice(&json) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("Discarding unreadable cached token: {}", e);
                return Ok(None);
            }
        };

        if cached.is_expired() {
            tracing::debug!("Cached token expired at {}", cached.expires_at);
            return Ok(None);
        }

        tracing::debug!("Using cached token (expires_at={})", cached.expires_at);
        Ok(Some(cached.token))
    }

    pub async fn store(&self, token: &str) -> Result<(), StorageError> {
        let cached = CachedToken::new(token, self.ttl);
        let json = serde_json::to_vec_pretty(&cached).map_err(|e| {
            tracing::error!("Failed to serialize cached token: {}", e);
            StorageError::Config(format!("JSON serialization failed: {}", e))
        })?;

        self.storage.write(TOKEN_CACHE_PATH, &json).await?;
        tracing::info!("Token cached (expires_at={})", cached.expires_at);
        Ok(())
    }

    /// Drop the cached token; a missing entry is not an error
    pub async fn invalidate(&self) -> Result<(), StorageError> {
        if !self.storage.exists(TOKEN_CACHE_PATH) {
            return Ok(());
        }
        match self.storage.remove(TOKEN_CACHE_PATH).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {
                tracing::info!("Cached token invalidated");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
