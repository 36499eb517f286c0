//! Launchpad credential acquisition
//!
//! A bearer token is either taken straight from configuration or obtained by
//! presenting a PKCS12 client certificate to the Launchpad login endpoint over
//! mutual TLS.

use crate::cloud::{parse_object_uri, ObjectStore, SecretStore};
use crate::cumulus_api::config::{CertificateSource, Config};
use crate::cumulus_api::types::{AuthStage, CumulusError, LaunchpadTokenResponse};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Private key and certificate decoded from a PKCS12 bundle
///
/// Only lives long enough to build the mutual-TLS client.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    /// Unencrypted PKCS8 private key, DER encoded
    pub private_key_der: Vec<u8>,
    /// X.509 certificate, DER encoded
    pub certificate_der: Vec<u8>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("private_key_der", &format_args!("<{} bytes>", self.private_key_der.len()))
            .field("certificate_der", &format_args!("<{} bytes>", self.certificate_der.len()))
            .finish()
    }
}

fn decode_error(msg: String) -> CumulusError {
    tracing::error!("{} {}", AuthStage::Decode.description(), msg);
    CumulusError::CredentialDecode(msg)
}

impl CredentialBundle {
    /// Decrypt a PKCS12 blob with `passphrase` (empty for none)
    pub fn from_pkcs12(pkcs12_der: &[u8], passphrase: &str) -> Result<Self, CumulusError> {
        let archive = Pkcs12::from_der(pkcs12_der)
            .map_err(|e| decode_error(format!("invalid PKCS12 bundle: {}", e)))?;
        let parsed = archive
            .parse2(passphrase)
            .map_err(|e| decode_error(format!("could not decrypt PKCS12 bundle: {}", e)))?;

        let key = parsed
            .pkey
            .ok_or_else(|| decode_error("PKCS12 bundle contains no private key".to_string()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| decode_error("PKCS12 bundle contains no certificate".to_string()))?;

        let private_key_der = key
            .private_key_to_pkcs8()
            .map_err(|e| decode_error(format!("could not encode private key: {}", e)))?;
        let certificate_der = cert
            .to_der()
            .map_err(|e| decode_error(format!("could not encode certificate: {}", e)))?;

        Ok(Self {
            private_key_der,
            certificate_der,
        })
    }

    /// Client identity for mutual TLS
    pub fn to_identity(&self) -> Result<reqwest::Identity, CumulusError> {
        let to_decode_error = |e: openssl::error::ErrorStack| {
            decode_error(format!("could not re-encode credentials: {}", e))
        };

        let mut pem = X509::from_der(&self.certificate_der)
            .and_then(|cert| cert.to_pem())
            .map_err(to_decode_error)?;
        let key_pem = PKey::private_key_from_pkcs8(&self.private_key_der)
            .and_then(|key| key.private_key_to_pem_pkcs8())
            .map_err(to_decode_error)?;
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        pem.extend_from_slice(&key_pem);

        reqwest::Identity::from_pem(&pem)
            .map_err(|e| decode_error(format!("invalid client identity: {}", e)))
    }
}

/// Produces bearer tokens for the Cumulus API
#[derive(Clone)]
pub struct CredentialProvider {
    config: Config,
    object_store: Option<Arc<dyn ObjectStore>>,
    secret_store: Option<Arc<dyn SecretStore>>,
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("object_store", &self.object_store.is_some())
            .field("secret_store", &self.secret_store.is_some())
            .finish()
    }
}

impl CredentialProvider {
    /// Create a provider without cloud collaborators
    pub fn new(config: Config) -> Self {
        Self {
            config,
            object_store: None,
            secret_store: None,
        }
    }

    /// Use `store` to fetch `S3URI_LAUNCHPAD_CERT` bundles
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Use `store` to resolve `LAUNCHPAD_PASSPHRASE_SECRET_NAME`
    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Produce a bearer token
    ///
    /// A configured token is returned as-is. Otherwise the Launchpad
    /// certificate exchange runs end to end; any failure aborts the whole
    /// acquisition.
    pub async fn get_token(&self) -> Result<String, CumulusError> {
        if let Some(token) = self.config.token() {
            tracing::debug!("Using bearer token supplied in configuration");
            return Ok(token.to_string());
        }

        let source = self.config.certificate_source()?.ok_or_else(|| {
            tracing::error!("No token or launchpad certificate configured");
            CumulusError::Config(
                "A token, FS_LAUNCHPAD_CERT or S3URI_LAUNCHPAD_CERT must be supplied".to_string(),
            )
        })?;
        let login_url = self.config.launchpad_url()?;
        let timeout = self.config.request_timeout()?;

        let bundle = self.load_bundle(&source).await?;
        let token = exchange_for_token(&bundle, login_url, timeout).await?;

        tracing::info!("Obtained launchpad token ({} characters)", token.len());
        Ok(token)
    }

    /// Fetch and decode the configured PKCS12 bundle
    pub async fn load_bundle(
        &self,
        source: &CertificateSource,
    ) -> Result<CredentialBundle, CumulusError> {
        let pkcs12 = self.certificate_body(source).await?;
        let passphrase = self.passphrase().await?;
        CredentialBundle::from_pkcs12(&pkcs12, &passphrase)
    }

    /// Raw PKCS12 bytes from the local filesystem or object storage
    pub async fn certificate_body(
        &self,
        source: &CertificateSource,
    ) -> Result<Vec<u8>, CumulusError> {
        let stage = AuthStage::CertificateRetrieval;

        match source {
            CertificateSource::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| stage_error(stage, format!("could not read {}: {}", path, e))),
            CertificateSource::Remote(uri) => {
                let (bucket, key) = parse_object_uri(uri).ok_or_else(|| {
                    tracing::error!("S3 path should be of a format s3://<bucket_name>/path");
                    CumulusError::InvalidPathFormat(uri.clone())
                })?;
                let store = self.object_store.as_ref().ok_or_else(|| {
                    stage_error(
                        stage,
                        "no object store configured for S3URI_LAUNCHPAD_CERT".to_string(),
                    )
                })?;

                tracing::debug!(
                    "Fetching launchpad certificate from bucket {} key {}",
                    bucket,
                    key
                );
                store
                    .get_object_body(bucket, key)
                    .await
                    .map_err(|e| stage_error(stage, format!("could not fetch {}: {}", uri, e)))
            }
        }
    }

    /// Passphrase from the secrets store, the literal config value, or empty
    pub async fn passphrase(&self) -> Result<String, CumulusError> {
        let stage = AuthStage::PassphraseRetrieval;

        if let Some(secret_id) = self.config.passphrase_secret_name() {
            let store = self.secret_store.as_ref().ok_or_else(|| {
                stage_error(
                    stage,
                    "no secrets store configured for LAUNCHPAD_PASSPHRASE_SECRET_NAME".to_string(),
                )
            })?;
            return store
                .get_secret(secret_id)
                .await
                .map_err(|e| {
                    stage_error(stage, format!("could not fetch secret {}: {}", secret_id, e))
                });
        }

        Ok(self.config.passphrase().unwrap_or_default().to_string())
    }
}

/// GET the login URL over mutual TLS and return its `sm_token`
pub async fn exchange_for_token(
    bundle: &CredentialBundle,
    login_url: &str,
    timeout: Duration,
) -> Result<String, CumulusError> {
    let stage = AuthStage::Exchange;

    let identity = bundle.to_identity()?;
    let client = reqwest::Client::builder()
        .identity(identity)
        .timeout(timeout)
        .build()
        .map_err(|e| stage_error(stage, format!("could not build mutual TLS client: {}", e)))?;

    tracing::debug!("Requesting launchpad token from {}", login_url);

    let response = client
        .get(login_url)
        .send()
        .await
        .map_err(|e| stage_error(stage, e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| stage_error(stage, format!("could not read response: {}", e)))?;

    let parsed: LaunchpadTokenResponse = serde_json::from_str(&body).map_err(|e| {
        stage_error(
            stage,
            format!("HTTP {} response did not contain sm_token: {}", status.as_u16(), e),
        )
    })?;

    Ok(parsed.sm_token)
}

fn stage_error(stage: AuthStage, message: String) -> CumulusError {
    tracing::error!("{} {}", stage.description(), message);
    CumulusError::AuthExchange { stage, message }
}
