//! Configuration for the Cumulus client
//!
//! Configuration is a flat string map. Values come from the process environment,
//! from a TOML file (environment values act as defaults, the file overrides them),
//! or from an explicit list of pairs. The key names are shared with deployment
//! tooling and must not change.

use crate::cumulus_api::types::CumulusError;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const INVOKE_BASE_URL: &str = "INVOKE_BASE_URL";
pub const FS_LAUNCHPAD_CERT: &str = "FS_LAUNCHPAD_CERT";
pub const S3URI_LAUNCHPAD_CERT: &str = "S3URI_LAUNCHPAD_CERT";
pub const LAUNCHPAD_PASSPHRASE: &str = "LAUNCHPAD_PASSPHRASE";
pub const LAUNCHPAD_PASSPHRASE_SECRET_NAME: &str = "LAUNCHPAD_PASSPHRASE_SECRET_NAME";
pub const LAUNCHPAD_URL: &str = "LAUNCHPAD_URL";
pub const CUMULUS_API_TOKEN: &str = "CUMULUS_API_TOKEN";
pub const CUMULUS_REQUEST_TIMEOUT_SECS: &str = "CUMULUS_REQUEST_TIMEOUT_SECS";
pub const AWS_PROFILE: &str = "AWS_PROFILE";
pub const AWS_REGION: &str = "AWS_REGION";
pub const OPENSEARCH_LAMBDA_ARN: &str = "OPENSEARCH_LAMBDA_ARN";
pub const RDS_LAMBDA_ARN: &str = "RDS_LAMBDA_ARN";
pub const STACK_PREFIX: &str = "STACK_PREFIX";

const DEFAULT_AWS_REGION: &str = "us-west-2";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the Launchpad PKCS12 bundle lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Path on the local filesystem
    Local(String),
    /// `s3://<bucket>/<key>` URI in object storage
    Remote(String),
}

/// Flat key/value configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Build a configuration from explicit pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    /// Load a TOML configuration file on top of the process environment
    ///
    /// Keys may sit at the top level or inside a `[DEFAULT]` table, so files
    /// written for the ini-style `[DEFAULT]` layout keep working once their
    /// values are quoted. Non-string scalars are stringified.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CumulusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            CumulusError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config = Self::from_env();
        config.merge_toml(&content)?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Merge TOML content into this configuration, overriding existing keys
    pub fn merge_toml(&mut self, content: &str) -> Result<(), CumulusError> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            tracing::error!("Failed to parse config file: {}", e);
            CumulusError::Config(format!("Failed to parse config file: {}", e))
        })?;

        for (key, value) in &table {
            match value {
                toml::Value::Table(section) if key == "DEFAULT" => {
                    for (inner_key, inner_value) in section {
                        if let Some(text) = scalar_to_string(inner_value) {
                            self.values.insert(inner_key.clone(), text);
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_to_string(other) {
                        self.values.insert(key.clone(), text);
                    }
                }
            }
        }

        Ok(())
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a value; empty strings count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Look up a value or fail with a configuration error naming the key
    pub fn require(&self, key: &str) -> Result<&str, CumulusError> {
        self.get(key).ok_or_else(|| {
            tracing::error!("Missing required configuration value {}", key);
            CumulusError::Config(format!("{} must be set", key))
        })
    }

    /// Base URL of the Cumulus API, validated and without a trailing slash
    pub fn invoke_base_url(&self) -> Result<String, CumulusError> {
        let raw = self.require(INVOKE_BASE_URL)?;
        validate_url(INVOKE_BASE_URL, raw)?;
        Ok(raw.trim_end_matches('/').to_string())
    }

    /// Launchpad login URL, validated
    pub fn launchpad_url(&self) -> Result<&str, CumulusError> {
        let raw = self.require(LAUNCHPAD_URL)?;
        validate_url(LAUNCHPAD_URL, raw)?;
        Ok(raw)
    }

    pub fn token(&self) -> Option<&str> {
        self.get(CUMULUS_API_TOKEN)
    }

    pub fn local_certificate_path(&self) -> Option<&str> {
        self.get(FS_LAUNCHPAD_CERT)
    }

    pub fn remote_certificate_path(&self) -> Option<&str> {
        self.get(S3URI_LAUNCHPAD_CERT)
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.get(LAUNCHPAD_PASSPHRASE)
    }

    pub fn passphrase_secret_name(&self) -> Option<&str> {
        self.get(LAUNCHPAD_PASSPHRASE_SECRET_NAME)
    }

    pub fn aws_profile(&self) -> Option<&str> {
        self.get(AWS_PROFILE)
    }

    pub fn aws_region(&self) -> &str {
        self.get(AWS_REGION).unwrap_or(DEFAULT_AWS_REGION)
    }

    /// The single configured certificate source
    ///
    /// Returns `Ok(None)` when no certificate is configured and an error when
    /// both a local and a remote path are set.
    pub fn certificate_source(&self) -> Result<Option<CertificateSource>, CumulusError> {
        match (self.local_certificate_path(), self.remote_certificate_path()) {
            (Some(_), Some(_)) => {
                tracing::error!(
                    "Both {} and {} are configured",
                    FS_LAUNCHPAD_CERT,
                    S3URI_LAUNCHPAD_CERT
                );
                Err(CumulusError::Config(format!(
                    "Exactly one of {} or {} may be set, found both",
                    FS_LAUNCHPAD_CERT, S3URI_LAUNCHPAD_CERT
                )))
            }
            (Some(local), None) => Ok(Some(CertificateSource::Local(local.to_string()))),
            (None, Some(remote)) => Ok(Some(CertificateSource::Remote(remote.to_string()))),
            (None, None) => Ok(None),
        }
    }

    /// Per-request timeout, defaulting to 60 seconds
    pub fn request_timeout(&self) -> Result<Duration, CumulusError> {
        match self.get(CUMULUS_REQUEST_TIMEOUT_SECS) {
            None => Ok(DEFAULT_REQUEST_TIMEOUT),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    CumulusError::Config(format!(
                        "{} must be a positive number of seconds, got '{}'",
                        CUMULUS_REQUEST_TIMEOUT_SECS, raw
                    ))
                }),
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn validate_url(key: &str, raw: &str) -> Result<(), CumulusError> {
    url::Url::parse(raw).map(|_| ()).map_err(|e| {
        tracing::error!("{} is not a valid URL: {}", key, e);
        CumulusError::Config(format!("{} is not a valid URL ({}): {}", key, raw, e))
    })
}
