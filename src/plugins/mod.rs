//! Statically registered plugins
//!
//! Every plugin takes an argv slice (parsed with clap) and a shared
//! [`PluginContext`], and returns a JSON value for the caller to print or
//! write out.

pub mod collections;
pub mod cumulus_api;
pub mod opensearch;
pub mod rds;
pub mod records;
pub mod remediation;
pub mod status;

use crate::cloud::{ObjectStore, RemoteFunction};
use crate::cumulus_api::client::CumulusClient;
use crate::cumulus_api::config::Config;
use crate::cumulus_api::resources::Query;
use crate::cumulus_api::types::CumulusError;
use crate::storage::BoxFuture;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a plugin may need to do its work
#[derive(Clone)]
pub struct PluginContext {
    pub client: CumulusClient,
    pub config: Config,
    /// Directory result files are written to and relative paths resolve against
    pub working_dir: PathBuf,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub functions: Option<Arc<dyn RemoteFunction>>,
}

impl PluginContext {
    pub fn new(client: CumulusClient, config: Config) -> Self {
        Self {
            client,
            config,
            working_dir: PathBuf::from("."),
            object_store: None,
            functions: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_functions(mut self, functions: Arc<dyn RemoteFunction>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub(crate) fn object_store(&self, plugin: &str) -> Result<&Arc<dyn ObjectStore>, CumulusError> {
        self.object_store.as_ref().ok_or_else(|| {
            tracing::error!("{}: no object store configured", plugin);
            CumulusError::Config(format!("{} requires an object store", plugin))
        })
    }

    pub(crate) fn functions(&self, plugin: &str) -> Result<&Arc<dyn RemoteFunction>, CumulusError> {
        self.functions.as_ref().ok_or_else(|| {
            tracing::error!("{}: no remote function client configured", plugin);
            CumulusError::Config(format!("{} requires a remote function client", plugin))
        })
    }
}

/// A named command
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>>;
}

/// Compiled-in set of plugins
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self { plugins: Vec::new() }
    }

    /// Registry holding every plugin shipped with the crate
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(cumulus_api::CumulusApiPlugin));
        registry.register(Box::new(collections::BulkCreateCollections));
        registry.register(Box::new(status::GetStatus));
        registry.register(Box::new(records::GetCumulusRecords));
        registry.register(Box::new(records::UpdateRecord::collection()));
        registry.register(Box::new(records::UpdateRecord::provider()));
        registry.register(Box::new(records::UpdateRecord::granule()));
        registry.register(Box::new(opensearch::OpenSearch));
        registry.register(Box::new(rds::RdsLambda));
        registry
    }

    /// Add a plugin, replacing any plugin registered under the same name
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.retain(|p| p.name() != plugin.name());
        self.plugins.push(plugin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// `(name, description)` of every registered plugin
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        self.plugins
            .iter()
            .map(|p| (p.name(), p.description()))
            .collect()
    }

    pub async fn run(
        &self,
        name: &str,
        ctx: &PluginContext,
        argv: &[String],
    ) -> Result<Value, CumulusError> {
        let plugin = self.get(name).ok_or_else(|| {
            tracing::error!("Unknown plugin: {}", name);
            CumulusError::Plugin(format!("Unknown plugin: {}", name))
        })?;
        tracing::debug!("Running plugin {} with {} arguments", name, argv.len());
        plugin.run(ctx, argv).await
    }
}

/// Parse `argv` into a clap argument struct, with `name` as the program name
pub(crate) fn parse_args<T: clap::Parser>(name: &str, argv: &[String]) -> Result<T, CumulusError> {
    T::try_parse_from(std::iter::once(name.to_string()).chain(argv.iter().cloned()))
        .map_err(|e| CumulusError::Plugin(e.to_string()))
}

/// JSON from an inline string or from a file holding it
pub(crate) async fn read_json_arg(ctx: &PluginContext, arg: &str) -> Result<Value, CumulusError> {
    let path = ctx.resolve(arg);
    let text = if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
        tracing::debug!("Reading data file: {:?}", path);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            CumulusError::Plugin(format!("Failed to read {:?}: {}", path, e))
        })?
    } else {
        arg.to_string()
    };

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!("Invalid JSON argument: {}", e);
        CumulusError::Plugin(format!("Invalid JSON in '{}': {}", arg, e))
    })
}

/// JSON from a file that must exist
pub(crate) async fn read_json_file(ctx: &PluginContext, file: &str) -> Result<Value, CumulusError> {
    let path = ctx.resolve(file);
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        tracing::error!("Failed to read {:?}: {}", path, e);
        CumulusError::Plugin(format!("Failed to read {:?}: {}", path, e))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| CumulusError::Plugin(format!("Invalid JSON in {:?}: {}", path, e)))
}

/// Pretty-printed JSON written into the working directory
pub(crate) async fn write_json(
    ctx: &PluginContext,
    file: &str,
    value: &Value,
) -> Result<PathBuf, CumulusError> {
    let path = ctx.resolve(file);
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| CumulusError::Plugin(format!("JSON serialization failed: {}", e)))?;
    tokio::fs::write(&path, json).await.map_err(|e| {
        tracing::error!("Failed to write {:?}: {}", path, e);
        CumulusError::Plugin(format!("Failed to write {:?}: {}", path, e))
    })?;
    tracing::info!("Results written to: {:?}", path);
    Ok(path)
}

/// Invoke the bypass-query function named by `arn_key`, then download the
/// result object it reports (`{"Bucket", "Key", "record_count"}`) to
/// `results_file`
pub(crate) async fn query_via_function(
    ctx: &PluginContext,
    plugin: &str,
    arn_key: &str,
    payload: &Value,
    results_file: &str,
) -> Result<(PathBuf, Value), CumulusError> {
    let function_name = ctx.config.get(arn_key).ok_or_else(|| {
        tracing::error!("{}: {} is not set", plugin, arn_key);
        CumulusError::Config(format!(
            "The ARN for the {} lambda is not defined. Provide it as {}",
            plugin, arn_key
        ))
    })?;
    let functions = ctx.functions(plugin)?;
    let store = ctx.object_store(plugin)?;

    let body = serde_json::to_vec(payload)
        .map_err(|e| CumulusError::Plugin(format!("JSON serialization failed: {}", e)))?;
    tracing::info!("Invoking {} lambda", plugin);
    let invocation = functions.invoke(function_name, body).await?;
    if invocation.status != 200 {
        tracing::error!("{} lambda returned status {}", plugin, invocation.status);
        return Err(CumulusError::Plugin(format!(
            "The {} lambda failed. Check the Cloudwatch logs for {}",
            plugin, function_name
        )));
    }

    let summary: Value = serde_json::from_slice(&invocation.payload).map_err(|e| {
        CumulusError::Plugin(format!("Invalid {} lambda response: {}", plugin, e))
    })?;
    let location = |field: &str| {
        summary
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CumulusError::Plugin(format!("{} lambda response has no {}", plugin, field))
            })
    };
    let (bucket, key) = (location("Bucket")?, location("Key")?);

    tracing::info!("Downloading query results from s3://{}/{}", bucket, key);
    let results = store.get_object_body(&bucket, &key).await?;
    let path = ctx.resolve(results_file);
    tokio::fs::write(&path, results).await.map_err(|e| {
        tracing::error!("Failed to write {:?}: {}", path, e);
        CumulusError::Plugin(format!("Failed to write {:?}: {}", path, e))
    })?;

    Ok((path, summary))
}

/// `key=value` filter arguments
pub(crate) fn filters(args: &[String]) -> Result<Query, CumulusError> {
    Query::from_args(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = PluginRegistry::builtin();
        let names: Vec<_> = registry.list().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "cumulus_api",
                "bulk_create_collections",
                "get_status",
                "get_cumulus_records",
                "update_collection",
                "update_provider",
                "update_granule",
                "opensearch",
                "rds_lambda",
            ]
        );
        assert!(registry.get("get_status").is_some());
        assert!(registry.get("manage_records").is_none());
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let ctx =
            PluginContext::new(CumulusClient::new("http://localhost", "t"), Config::default());
        let err = PluginRegistry::builtin()
            .run("does_not_exist", &ctx, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CumulusError::Plugin(_)));
    }

    #[test]
    fn test_resolve_relative_to_working_dir() {
        let ctx = PluginContext::new(CumulusClient::new("http://localhost", "t"), Config::default())
            .with_working_dir("/tmp/pylot");
        assert_eq!(ctx.resolve("out.json"), PathBuf::from("/tmp/pylot/out.json"));
        assert_eq!(ctx.resolve("/abs/out.json"), PathBuf::from("/abs/out.json"));
    }
}
