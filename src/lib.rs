//! PyLOT Cumulus SDK
//!
//! A Rust library for working with the Cumulus workflow-orchestration API.
//!
//! This SDK provides:
//! - Bearer token acquisition, either pre-issued or through the Launchpad
//!   certificate exchange (PKCS12 bundle, mutual TLS)
//! - A Cumulus API client with typed operations for every record type
//! - Cursor pagination and concurrent bulk operations
//! - An injectable, optionally encrypted token cache
//! - The built-in plugins (generic API access, bulk collection creation,
//!   status reports, OpenSearch and RDS bypass queries, record updates)
//!
//! # Example
//!
//! ```no_run
//! use pylot::{Config, CumulusClient, Query};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CumulusClient::from_config(Config::from_env()).await?;
//!
//! let granules = client
//!     .collect("granules", &Query::new().with("status", "failed"), 25)
//!     .await?;
//! println!("{}", granules.into_json());
//!
//! let response = client
//!     .update_collection(serde_json::json!({
//!         "name": "nalmaraw",
//!         "version": "1",
//!         "duplicateHandling": "replace"
//!     }))
//!     .await?;
//! println!("HTTP {}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod cloud;
pub mod cumulus_api;
pub mod plugins;
pub mod storage;

// Re-export commonly used types and functions
pub use cumulus_api::{
    bulk::{apply_concurrently, BulkOutcome},
    client::CumulusClient,
    config::{CertificateSource, Config},
    credentials::{CredentialBundle, CredentialProvider},
    pagination::Collected,
    resources::{Action, Query, Resource, ResourceDescriptor, RouteArgs, Verb},
    token_cache::TokenCache,
    types::{
        ApiError, ApiResponse, AuthStage, CumulusError, ResponseBody, UpstreamError,
        UpstreamErrorKind,
    },
};
pub use plugins::{Plugin, PluginContext, PluginRegistry};
