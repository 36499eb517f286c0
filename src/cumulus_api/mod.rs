/// Cumulus API integration module
///
/// This module provides the pieces needed to talk to a Cumulus deployment:
/// Launchpad credential acquisition, the HTTP client, the static
/// `(action, resource)` dispatch table, pagination and bulk fan-out.
///
/// ## Authentication Flow
///
/// 1. A bearer token is taken from configuration if one is supplied
/// 2. Otherwise the Launchpad PKCS12 bundle is read from disk or object storage
/// 3. The bundle is decrypted with the configured passphrase
/// 4. The login URL is called over mutual TLS and returns `sm_token`
/// 5. The token may be cached for reuse until it expires
pub mod bulk;
pub mod client;
pub mod config;
pub mod credentials;
pub mod operations;
pub mod pagination;
pub mod resources;
pub mod token_cache;
pub mod types;

pub use bulk::{apply_concurrently, BulkOutcome, DEFAULT_CONCURRENCY};
pub use client::CumulusClient;
pub use config::{CertificateSource, Config};
pub use credentials::{CredentialBundle, CredentialProvider};
pub use pagination::{Collected, DEFAULT_COLLECT_LIMIT};
pub use resources::{route, Action, Query, Resource, ResourceDescriptor, RouteArgs, Verb};
pub use token_cache::{CachedToken, TokenCache};
pub use types::{
    ApiError, ApiResponse, AuthStage, CumulusError, ResponseBody, UpstreamError, UpstreamErrorKind,
};
