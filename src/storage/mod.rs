use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// Boxed, sendable future returned by the storage and collaborator traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment variable holding a base64-encoded age identity for the encrypted cache
pub const ENCRYPTION_KEY_ENV: &str = "PYLOT_ENCRYPTION_KEY";

/// Storage backend trait for persisting small blobs such as cached tokens
pub trait StorageBackend: Send + Sync {
    /// Write data at the specified path, replacing existing content
    fn write<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Read data from the specified path
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>>;

    /// Check if data exists at the specified path
    fn exists(&self, path: &str) -> bool;

    /// Remove data at the specified path
    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// Storage errors
#[derive(Debug)]
pub enum StorageError {
    /// IO error
    Io(std::io::Error),
    /// Nothing stored under the requested path or key
    NotFound(String),
    /// Configuration or serialization error
    Config(String),
    /// Encryption error
    Encryption(String),
    /// Key storage error
    KeyStorage(String),
    /// A remote collaborator (object store, secrets store, compute) failed
    Remote(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::NotFound(path) => write!(f, "Not found: {}", path),
            StorageError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StorageError::Encryption(msg) => write!(f, "Encryption error: {}", msg),
            StorageError::KeyStorage(msg) => write!(f, "Key storage error: {}", msg),
            StorageError::Remote(msg) => write!(f, "Remote error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(err.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

/// In-process storage, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn write<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| StorageError::Config("memory storage lock poisoned".to_string()))?;
            entries.insert(path.to_string(), data.to_vec());
            Ok(())
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move {
            let entries = self
                .entries
                .read()
                .map_err(|_| StorageError::Config("memory storage lock poisoned".to_string()))?;
            entries
                .get(path)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(path))
            .unwrap_or(false)
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| StorageError::Config("memory storage lock poisoned".to_string()))?;
            entries
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        })
    }
}

/// Plain filesystem storage rooted at a directory
///
/// Entries are written as-is. [`EncryptedFilesystemStorage`] layers age
/// encryption on top of it for bearer tokens.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Storage under `root`, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl StorageBackend for FilesystemStorage {
    fn write<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let entry = self.entry(path);
            if let Some(dir) = entry.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&entry, data).await?;
            tracing::debug!("Stored {} bytes at {:?}", data.len(), entry);
            Ok(())
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move { Ok(tokio::fs::read(self.entry(path)).await?) })
    }

    fn exists(&self, path: &str) -> bool {
        self.entry(path).is_file()
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            tokio::fs::remove_file(self.entry(path)).await?;
            tracing::debug!("Removed {:?}", self.entry(path));
            Ok(())
        })
    }
}

/// age-encrypted [`FilesystemStorage`]
///
/// The x25519 identity comes from `PYLOT_ENCRYPTION_KEY` (base64 of the age
/// secret key) when that is set. Otherwise it is read from a key file, which
/// is generated with mode 0600 on first use.
pub struct EncryptedFilesystemStorage {
    files: FilesystemStorage,
    identity: age::x25519::Identity,
}

impl EncryptedFilesystemStorage {
    /// Storage under `~/.pylot/<instance_id>`, key file `encryption.key` inside it
    pub async fn new_with_instance(instance_id: &str) -> Result<Self, StorageError> {
        let root = dirs::home_dir()
            .ok_or_else(|| StorageError::KeyStorage("Cannot determine home directory".to_string()))?
            .join(".pylot")
            .join(instance_id);
        let key_path = root.join("encryption.key");
        Self::with_key_path(root, key_path).await
    }

    /// Storage under `root` using the identity at `key_path`
    pub async fn with_key_path(
        root: impl Into<PathBuf>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let files = FilesystemStorage::new(root.into())?;
        let identity = load_identity(key_path.as_ref()).await?;
        Ok(Self { files, identity })
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        use std::io::Write;

        let recipient: Box<dyn age::Recipient + Send> = Box::new(self.identity.to_public());
        let encryptor = age::Encryptor::with_recipients(vec![recipient])
            .ok_or_else(|| StorageError::Encryption("no age recipient".to_string()))?;

        let mut sealed = Vec::with_capacity(plaintext.len() + 256);
        let mut writer = encryptor
            .wrap_output(&mut sealed)
            .map_err(|e| StorageError::Encryption(format!("Failed to wrap output: {}", e)))?;
        let encryption_error = |e: std::io::Error| StorageError::Encryption(e.to_string());
        writer.write_all(plaintext).map_err(encryption_error)?;
        writer.finish().map_err(encryption_error)?;
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
        use std::io::Read;

        let decryptor = match age::Decryptor::new(sealed) {
            Ok(age::Decryptor::Recipients(decryptor)) => decryptor,
            Ok(_) => {
                return Err(StorageError::Encryption(
                    "entry is passphrase-encrypted, expected an x25519 recipient".to_string(),
                ))
            }
            Err(e) => return Err(StorageError::Encryption(format!("not an age file: {}", e))),
        };

        let mut reader = decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| StorageError::Encryption(format!("cannot decrypt entry: {}", e)))?;
        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| StorageError::Encryption(format!("cannot read decrypted entry: {}", e)))?;
        Ok(plaintext)
    }
}

impl StorageBackend for EncryptedFilesystemStorage {
    fn write<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let sealed = self.seal(data)?;
            self.files.write(path, &sealed).await
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move {
            let sealed = self.files.read(path).await?;
            self.open(&sealed)
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.exists(path)
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        self.files.remove(path)
    }
}

/// Identity from `PYLOT_ENCRYPTION_KEY`, an existing key file, or a new key file
async fn load_identity(key_path: &Path) -> Result<age::x25519::Identity, StorageError> {
    if let Ok(encoded) = std::env::var(ENCRYPTION_KEY_ENV) {
        tracing::debug!("Token cache key taken from {}", ENCRYPTION_KEY_ENV);
        return decode_identity(&encoded);
    }

    match tokio::fs::read_to_string(key_path).await {
        Ok(encoded) => {
            tracing::debug!("Token cache key loaded from {:?}", key_path);
            decode_identity(&encoded)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => create_key_file(key_path).await,
        Err(e) => Err(StorageError::KeyStorage(format!("cannot read {:?}: {}", key_path, e))),
    }
}

fn decode_identity(encoded: &str) -> Result<age::x25519::Identity, StorageError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| StorageError::KeyStorage(format!("key is not base64: {}", e)))?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| StorageError::KeyStorage(format!("key is not UTF-8: {}", e)))?;
    text.trim()
        .parse::<age::x25519::Identity>()
        .map_err(|e| StorageError::KeyStorage(format!("key is not an age identity: {}", e)))
}

async fn create_key_file(key_path: &Path) -> Result<age::x25519::Identity, StorageError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use secrecy::ExposeSecret;

    tracing::info!("Generating token cache key at {:?}", key_path);
    let identity = age::x25519::Identity::generate();
    let encoded = STANDARD.encode(identity.to_string().expose_secret());

    let key_error = |e: std::io::Error| {
        StorageError::KeyStorage(format!("cannot write {:?}: {}", key_path, e))
    };
    if let Some(dir) = key_path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(key_error)?;
    }
    tokio::fs::write(key_path, encoded).await.map_err(key_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(key_error)?;
    }

    Ok(identity)
}
