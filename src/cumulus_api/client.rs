use crate::cumulus_api::config::Config;
use crate::cumulus_api::credentials::CredentialProvider;
use crate::cumulus_api::resources::{
    route, Action, Query, Resource, ResourceDescriptor, RouteArgs, Verb,
};
use crate::cumulus_api::token_cache::TokenCache;
use crate::cumulus_api::types::{ApiError, ApiResponse, CumulusError, ResponseBody};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the Cumulus API
///
/// Holds the base URL and a bearer token. Cloning is cheap and clones share
/// the underlying connection pool, which is how the bulk helpers hand the
/// client to concurrent workers.
#[derive(Debug, Clone)]
pub struct CumulusClient {
    /// Base URL of the API without the `/v1` suffix or a trailing slash
    base_url: String,
    token: String,
    timeout: Duration,
    client: reqwest::Client,
    /// Source of fresh tokens for [`CumulusClient::refresh_token`]
    provider: Option<CredentialProvider>,
    cache: Option<TokenCache>,
}

impl CumulusClient {
    /// Create a client from a base URL and an already issued bearer token
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pylot::CumulusClient;
    ///
    /// let client = CumulusClient::new("https://example.com/api/dev/", "bearer-token");
    /// assert_eq!(client.base_url(), "https://example.com/api/dev");
    /// ```
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!("Creating CumulusClient with base URL: {}", base_url);

        Self {
            base_url,
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
            provider: None,
            cache: None,
        }
    }

    /// Create a client whose token comes from `provider`
    ///
    /// A token set in configuration is used as-is and never touches the
    /// cache. Otherwise a valid token in `cache` is reused, or the provider
    /// runs once and the result is stored in the cache. Cache failures are
    /// logged and never fail construction.
    pub async fn from_provider(
        base_url: impl Into<String>,
        provider: CredentialProvider,
        cache: Option<TokenCache>,
    ) -> Result<Self, CumulusError> {
        let timeout = provider.config().request_timeout()?;

        let token = match provider.config().token() {
            Some(token) => {
                tracing::debug!("Using bearer token supplied in configuration");
                token.to_string()
            }
            None => Self::cached_or_exchanged(&provider, cache.as_ref()).await?,
        };

        let mut client = Self::new(base_url, token).with_timeout(timeout);
        client.provider = Some(provider);
        client.cache = cache;
        Ok(client)
    }

    async fn cached_or_exchanged(
        provider: &CredentialProvider,
        cache: Option<&TokenCache>,
    ) -> Result<String, CumulusError> {
        let Some(cache) = cache else {
            return provider.get_token().await;
        };

        match cache.load().await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable token cache: {}", e),
        }

        let token = provider.get_token().await?;
        if let Err(e) = cache.store(&token).await {
            tracing::warn!("Token obtained but could not be cached: {}", e);
        }
        Ok(token)
    }

    /// Create a client from configuration: `INVOKE_BASE_URL` plus whatever
    /// credential source the configuration names
    pub async fn from_config(config: Config) -> Result<Self, CumulusError> {
        let base_url = config.invoke_base_url()?;
        Self::from_provider(base_url, CredentialProvider::new(config), None).await
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Value of the `Authorization` header sent with every request
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Re-run the credential provider and replace the bearer token
    ///
    /// Clones taken before the refresh keep the old token.
    pub async fn refresh_token(&mut self) -> Result<(), CumulusError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            tracing::error!("Refreshing token: client was built without a credential provider");
            CumulusError::Config("No credential provider to refresh the token from".to_string())
        })?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate().await {
                tracing::warn!("Could not invalidate cached token: {}", e);
            }
        }

        let token = provider.get_token().await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&token).await {
                tracing::warn!("Token refreshed but could not be cached: {}", e);
            }
        }

        self.token = token;
        tracing::info!("Bearer token refreshed");
        Ok(())
    }

    /// Revoke the current token upstream and drop it from the cache
    ///
    /// On a successful revocation the client's token is cleared; call
    /// [`CumulusClient::refresh_token`] before issuing further requests.
    pub async fn delete_token(&mut self) -> Result<ApiResponse, CumulusError> {
        let response = self
            .dispatch(Action::Delete, Resource::Token, RouteArgs::new().id(self.token.clone()))
            .await?;
        if !response.is_success() {
            tracing::warn!("Token revocation answered HTTP {}", response.status);
            return Ok(response);
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate().await {
                tracing::warn!("Could not invalidate cached token: {}", e);
            }
        }
        self.token.clear();
        tracing::info!("Bearer token revoked");
        Ok(response)
    }

    /// Issue a request against `{base_url}/v1/{resource_path}`
    ///
    /// `verb` must be one of GET, POST, PUT or DELETE; anything else fails with
    /// [`CumulusError::UnsupportedVerb`] before any network I/O. Query
    /// parameters are appended in insertion order. Non-2xx responses are
    /// returned, not turned into errors; bodies that are not JSON come back as
    /// [`ResponseBody::Raw`].
    pub async fn invoke(
        &self,
        resource_path: &str,
        verb: &str,
        body: Option<&Value>,
        query: &Query,
    ) -> Result<ApiResponse, CumulusError> {
        let verb: Verb = verb.parse()?;
        self.send(verb, resource_path, body, query).await
    }

    /// Issue the request described by `descriptor`
    pub async fn execute(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ApiResponse, CumulusError> {
        self.send(
            descriptor.verb,
            &descriptor.path,
            descriptor.body.as_ref(),
            &descriptor.query,
        )
        .await
    }

    /// Route an `(action, resource)` pair and issue the request
    pub async fn dispatch(
        &self,
        action: Action,
        resource: Resource,
        args: RouteArgs,
    ) -> Result<ApiResponse, CumulusError> {
        let descriptor = route(action, resource, args)?;
        self.execute(&descriptor).await
    }

    fn url_for(&self, resource_path: &str, query: &Query) -> String {
        let mut url = format!(
            "{}/v1/{}",
            self.base_url,
            resource_path.trim_start_matches('/')
        );
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.to_query_string());
        }
        url
    }

    async fn send(
        &self,
        verb: Verb,
        resource_path: &str,
        body: Option<&Value>,
        query: &Query,
    ) -> Result<ApiResponse, CumulusError> {
        let url = self.url_for(resource_path, query);
        tracing::debug!("{} {}", verb, url);

        let mut request = self
            .client
            .request(verb.method(), &url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send {} {}: {}", verb, url, e);
            ApiError::from(e)
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            tracing::error!("Failed to read response body from {}: {}", url, e);
            ApiError::from(e)
        })?;

        tracing::debug!("Received response with status: {}", status);

        let body = match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(e) => {
                tracing::warn!(
                    "Response from {} is not JSON ({}); returning raw body of {} bytes",
                    url,
                    e,
                    bytes.len()
                );
                ResponseBody::Raw(bytes.to_vec())
            }
        };

        if status >= 400 {
            tracing::debug!("Cumulus API answered {} for {} {}", status, verb, url);
        }

        Ok(ApiResponse { status, body })
    }
}
