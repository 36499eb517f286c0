//! Static routing of `(action, resource)` pairs to Cumulus API requests
//!
//! Every convenience method on [`crate::CumulusClient`] and the generic
//! `cumulus_api` plugin resolve through [`route`], so the set of supported
//! operations lives in one table.

use crate::cumulus_api::types::CumulusError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// HTTP verbs accepted by the Cumulus API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    pub(crate) fn method(&self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for Verb {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            _ => {
                tracing::error!("Cumulus CRUD: {} is not a supported http request", s);
                Err(CumulusError::UnsupportedVerb(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered query parameters
///
/// Rendered as `k1=v1&k2=v2` in insertion order without percent-encoding;
/// Cumulus filter values such as `name__in=a,b` are passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    /// Replace the value of `key` in place, or append it
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `key=value` arguments; the value keeps any further `=` signs
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, CumulusError> {
        let mut query = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                CumulusError::Config(format!("Expected key=value filter, got '{}'", arg))
            })?;
            query.set(key, value);
        }
        Ok(query)
    }

    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::new();
        for (k, v) in iter {
            query.pairs.push((k.into(), v.to_string()));
        }
        query
    }
}

/// One fully described Cumulus API call
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub verb: Verb,
    pub path: String,
    pub body: Option<Value>,
    pub query: Query,
}

impl ResourceDescriptor {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            body: None,
            query: Query::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Verb::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Verb::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Verb::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Verb::Delete, path)
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }
}

/// Verb of the CLI grammar (`list`, `get`, `update`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Get,
    Create,
    Update,
    Delete,
    Associate,
    Reingest,
    ApplyWorkflow,
    Move,
    RemoveFromCmr,
    Bulk,
    BulkDelete,
    BulkReingest,
    Run,
    Search,
    Reindex,
    Recover,
}

impl Action {
    pub const ALL: [Action; 17] = [
        Action::List,
        Action::Get,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Associate,
        Action::Reingest,
        Action::ApplyWorkflow,
        Action::Move,
        Action::RemoveFromCmr,
        Action::Bulk,
        Action::BulkDelete,
        Action::BulkReingest,
        Action::Run,
        Action::Search,
        Action::Reindex,
        Action::Recover,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Associate => "associate",
            Action::Reingest => "reingest",
            Action::ApplyWorkflow => "apply_workflow",
            Action::Move => "move",
            Action::RemoveFromCmr => "remove_from_cmr",
            Action::Bulk => "bulk",
            Action::BulkDelete => "bulk_delete",
            Action::BulkReingest => "bulk_reingest",
            Action::Run => "run",
            Action::Search => "search",
            Action::Reindex => "reindex",
            Action::Recover => "recover",
        }
    }
}

impl FromStr for Action {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.name() == normalized)
            .ok_or_else(|| CumulusError::UnsupportedOperation {
                action: s.to_string(),
                resource: String::new(),
            })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cumulus record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Version,
    Token,
    Providers,
    Collections,
    ActiveCollections,
    Granules,
    GranuleExecutions,
    Pdrs,
    Rules,
    Stats,
    StatsAggregate,
    Logs,
    GranulesCsv,
    Executions,
    ExecutionStatus,
    Workflows,
    AsyncOperations,
    Replays,
    Schemas,
    ReconciliationReports,
    InstanceMeta,
    SearchIndex,
    ReindexStatus,
    DatabaseIndex,
    OrcaRecovery,
    MigrationCounts,
    DeadLetterArchive,
}

impl Resource {
    pub const ALL: [Resource; 27] = [
        Resource::Version,
        Resource::Token,
        Resource::Providers,
        Resource::Collections,
        Resource::ActiveCollections,
        Resource::Granules,
        Resource::GranuleExecutions,
        Resource::Pdrs,
        Resource::Rules,
        Resource::Stats,
        Resource::StatsAggregate,
        Resource::Logs,
        Resource::GranulesCsv,
        Resource::Executions,
        Resource::ExecutionStatus,
        Resource::Workflows,
        Resource::AsyncOperations,
        Resource::Replays,
        Resource::Schemas,
        Resource::ReconciliationReports,
        Resource::InstanceMeta,
        Resource::SearchIndex,
        Resource::ReindexStatus,
        Resource::DatabaseIndex,
        Resource::OrcaRecovery,
        Resource::MigrationCounts,
        Resource::DeadLetterArchive,
    ];

    /// Canonical name followed by accepted aliases
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Resource::Version => &["version"],
            Resource::Token => &["token"],
            Resource::Providers => &["providers", "provider"],
            Resource::Collections => &["collections", "collection"],
            Resource::ActiveCollections => &[
                "collections_with_active_granules",
                "active_collections",
            ],
            Resource::Granules => &["granules", "granule"],
            Resource::GranuleExecutions => &["execution_to_granule", "granule_execution"],
            Resource::Pdrs => &["pdrs", "pdr"],
            Resource::Rules => &["rules", "rule"],
            Resource::Stats => &["stats_summary", "stats"],
            Resource::StatsAggregate => &["stats_aggregate"],
            Resource::Logs => &["logs", "log"],
            Resource::GranulesCsv => &["granules_csv", "granule_csv"],
            Resource::Executions => &["executions", "execution"],
            Resource::ExecutionStatus => &["execution_status"],
            Resource::Workflows => &["workflows", "workflow"],
            Resource::AsyncOperations => {
                &["async_operations", "async_operation", "asyncoperations"]
            }
            Resource::Replays => &["replays", "replay", "ingest_notification"],
            Resource::Schemas => &["schemas", "schema"],
            Resource::ReconciliationReports => &[
                "reconciliation_reports",
                "reconciliation_report",
                "reconciliationreports",
            ],
            Resource::InstanceMeta => &["instance_metadata", "instance_meta", "instancemeta"],
            Resource::SearchIndex => &["elasticsearch", "elasticsearch_index", "search_index"],
            Resource::ReindexStatus => &["elasticsearch_reindex_status", "reindex_status"],
            Resource::DatabaseIndex => &["elasticsearch_from_database", "database_index"],
            Resource::OrcaRecovery => &["orca_recovery_status", "orca_recovery"],
            Resource::MigrationCounts => &["migration_count", "migration_counts"],
            Resource::DeadLetterArchive => &["cumulus_messages", "dead_letter_archive"],
        }
    }

    pub fn name(&self) -> &'static str {
        self.names()[0]
    }
}

impl FromStr for Resource {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Resource::ALL
            .iter()
            .copied()
            .find(|resource| resource.names().contains(&normalized.as_str()))
            .ok_or_else(|| CumulusError::UnsupportedOperation {
                action: String::new(),
                resource: s.to_string(),
            })
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments for [`route`]
///
/// `id` is the record identifier (provider id, collection name, granule id,
/// rule name, execution ARN, ...), `version` the collection version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteArgs {
    pub id: Option<String>,
    pub version: Option<String>,
    pub data: Option<Value>,
    pub query: Query,
}

impl RouteArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    fn require_id(
        &self,
        resource: &'static str,
        field: &'static str,
    ) -> Result<&str, CumulusError> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing(resource, field))
    }

    fn require_version(&self, resource: &'static str) -> Result<&str, CumulusError> {
        self.version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing(resource, "version"))
    }
}

fn missing(resource: &'static str, field: &'static str) -> CumulusError {
    tracing::error!("Cannot build {} path: missing {}", resource, field);
    CumulusError::MissingIdentifier { resource, field }
}

/// Read a string (or number) identifier out of a record
pub fn record_field(
    record: Option<&Value>,
    resource: &'static str,
    field: &'static str,
) -> Result<String, CumulusError> {
    match record.and_then(|r| r.get(field)) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(missing(resource, field)),
    }
}

/// `data` merged with `{"action": <action>}` for the granule action endpoints
fn with_action(data: Option<Value>, action: &str) -> Value {
    let mut body = match data {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    body.insert("action".to_string(), Value::String(action.to_string()));
    Value::Object(body)
}

/// Resolve an `(action, resource)` pair to a request
///
/// Fails with `MissingIdentifier` when the path cannot be built and with
/// `UnsupportedOperation` when the pair has no route.
pub fn route(
    action: Action,
    resource: Resource,
    args: RouteArgs,
) -> Result<ResourceDescriptor, CumulusError> {
    use Action as A;
    use Resource as R;
    use ResourceDescriptor as D;

    let descriptor = match (action, resource) {
        (A::Get, R::Version) => D::get("version"),
        (A::Delete, R::Token) => {
            D::delete(format!("tokenDelete/{}", args.require_id("token", "token")?))
        }

        (A::List, R::Providers) => D::get("providers"),
        (A::Get, R::Providers) => {
            D::get(format!("providers/{}", args.require_id("provider", "id")?))
        }
        (A::Create, R::Providers) => D::post("providers").with_body(args.data.clone()),
        (A::Update, R::Providers) => {
            let id = record_field(args.data.as_ref(), "provider", "id")?;
            D::put(format!("providers/{}", id)).with_body(args.data.clone())
        }
        (A::Delete, R::Providers) => {
            D::delete(format!("providers/{}", args.require_id("provider", "id")?))
        }

        (A::List, R::Collections) => D::get("collections"),
        (A::List, R::ActiveCollections) => D::get("collections/active"),
        (A::Get, R::Collections) => D::get(format!(
            "collections/{}/{}",
            args.require_id("collection", "name")?,
            args.require_version("collection")?
        )),
        (A::Create, R::Collections) => D::post("collections").with_body(args.data.clone()),
        (A::Update, R::Collections) => {
            let name = record_field(args.data.as_ref(), "collection", "name")?;
            let version = record_field(args.data.as_ref(), "collection", "version")?;
            D::put(format!("collections/{}/{}", name, version)).with_body(args.data.clone())
        }
        (A::Delete, R::Collections) => D::delete(format!(
            "collections/{}/{}",
            args.require_id("collection", "name")?,
            args.require_version("collection")?
        )),

        (A::List, R::Granules) => D::get("granules"),
        (A::Get, R::Granules) => {
            D::get(format!("granules/{}", args.require_id("granule", "granuleId")?))
        }
        (A::Create, R::Granules) => D::post("granules").with_body(args.data.clone()),
        (A::Update, R::Granules) => {
            let id = record_field(args.data.as_ref(), "granule", "granuleId")?;
            D::put(format!("granules/{}", id)).with_body(args.data.clone())
        }
        (A::Delete, R::Granules) => {
            D::delete(format!("granules/{}", args.require_id("granule", "granuleId")?))
        }
        (A::Associate, R::GranuleExecutions) => {
            let id = record_field(args.data.as_ref(), "granule", "granuleId")?;
            D::post(format!("granules/{}/executions", id)).with_body(args.data.clone())
        }
        (A::Reingest, R::Granules) => {
            let id = args.require_id("granule", "granuleId")?;
            D::put(format!("granules/{}", id))
                .with_body(Some(with_action(args.data.clone(), "reingest")))
        }
        (A::ApplyWorkflow, R::Granules) => {
            let id = args.require_id("granule", "granuleId")?;
            record_field(args.data.as_ref(), "granule", "workflow")?;
            D::put(format!("granules/{}", id))
                .with_body(Some(with_action(args.data.clone(), "applyWorkflow")))
        }
        (A::Move, R::Granules) => {
            let id = args.require_id("granule", "granuleId")?;
            if args.data.as_ref().and_then(|d| d.get("destinations")).is_none() {
                return Err(missing("granule", "destinations"));
            }
            D::put(format!("granules/{}", id))
                .with_body(Some(with_action(args.data.clone(), "move")))
        }
        (A::RemoveFromCmr, R::Granules) => {
            let id = args.require_id("granule", "granuleId")?;
            D::put(format!("granules/{}", id)).with_body(Some(with_action(None, "removeFromCmr")))
        }
        (A::Bulk, R::Granules) => D::post("granules/bulk").with_body(args.data.clone()),
        (A::BulkDelete, R::Granules) => D::post("granules/bulkDelete").with_body(args.data.clone()),
        (A::BulkReingest, R::Granules) => {
            D::post("granules/bulkReingest").with_body(args.data.clone())
        }

        (A::List, R::Pdrs) => D::get("pdrs"),
        (A::Get, R::Pdrs) => D::get(format!("pdrs/{}", args.require_id("pdr", "pdrName")?)),
        (A::Delete, R::Pdrs) => D::delete(format!("pdrs/{}", args.require_id("pdr", "pdrName")?)),

        (A::List, R::Rules) => D::get("rules"),
        (A::Get, R::Rules) => D::get(format!("rules/{}", args.require_id("rule", "name")?)),
        (A::Create, R::Rules) => D::post("rules").with_body(args.data.clone()),
        (A::Update, R::Rules) => {
            let name = record_field(args.data.as_ref(), "rule", "name")?;
            D::put(format!("rules/{}", name)).with_body(args.data.clone())
        }
        (A::Delete, R::Rules) => D::delete(format!("rules/{}", args.require_id("rule", "name")?)),
        (A::Run, R::Rules) => {
            let name = args.require_id("rule", "name")?;
            D::put(format!("rules/{}", name))
                .with_body(Some(serde_json::json!({"name": name, "action": "rerun"})))
        }

        (A::Get, R::Stats) => D::get("stats"),
        (A::Get, R::StatsAggregate) => D::get("stats/aggregate"),

        (A::List, R::Logs) => D::get("logs"),
        (A::Get, R::Logs) => D::get(format!("logs/{}", args.require_id("log", "executionName")?)),

        (A::Get, R::GranulesCsv) => D::get("granule-csv"),

        (A::List, R::Executions) => D::get("executions"),
        (A::Get, R::Executions) => {
            D::get(format!("executions/{}", args.require_id("execution", "arn")?))
        }
        (A::Create, R::Executions) => D::post("executions").with_body(args.data.clone()),
        (A::Update, R::Executions) => {
            let arn = record_field(args.data.as_ref(), "execution", "arn")?;
            D::put(format!("executions/{}", arn)).with_body(args.data.clone())
        }
        (A::Delete, R::Executions) => {
            D::delete(format!("executions/{}", args.require_id("execution", "arn")?))
        }
        (A::Get, R::ExecutionStatus) => D::get(format!(
            "executions/status/{}",
            args.require_id("execution", "arn")?
        )),
        (A::Search, R::Executions) => {
            D::post("executions/search-by-granules").with_body(args.data.clone())
        }
        (A::Search, R::Workflows) => {
            D::post("executions/workflows-by-granules").with_body(args.data.clone())
        }

        (A::List, R::Workflows) => D::get("workflows"),
        (A::Get, R::Workflows) => {
            D::get(format!("workflows/{}", args.require_id("workflow", "name")?))
        }

        (A::List, R::AsyncOperations) => D::get("asyncOperations"),
        (A::Get, R::AsyncOperations) => D::get(format!(
            "asyncOperations/{}",
            args.require_id("async operation", "id")?
        )),

        (A::Create, R::Replays) => D::post("replays").with_body(args.data.clone()),

        (A::Get, R::Schemas) => D::get(format!("schemas/{}", args.require_id("schema", "type")?)),

        (A::List, R::ReconciliationReports) => D::get("reconciliationReports"),
        (A::Get, R::ReconciliationReports) => D::get(format!(
            "reconciliationReports/{}",
            args.require_id("reconciliation report", "name")?
        )),
        (A::Create, R::ReconciliationReports) => {
            D::post("reconciliationReports").with_body(args.data.clone())
        }
        (A::Delete, R::ReconciliationReports) => D::delete(format!(
            "reconciliationReports/{}",
            args.require_id("reconciliation report", "name")?
        )),

        (A::Get, R::InstanceMeta) => D::get("instanceMeta"),

        (A::Reindex, R::SearchIndex) => {
            D::post("elasticsearch/reindex").with_body(args.data.clone())
        }
        (A::Get, R::SearchIndex) => D::get("elasticsearch/current-index"),
        (A::Update, R::SearchIndex) => {
            D::post("elasticsearch/change-index").with_body(args.data.clone())
        }
        (A::List, R::SearchIndex) => D::get("elasticsearch/indices-status"),
        (A::Get, R::ReindexStatus) => D::get("elasticsearch/reindex-status"),
        (A::Reindex, R::DatabaseIndex) => {
            D::post("elasticsearch/index-from-database").with_body(args.data.clone())
        }

        (A::List, R::OrcaRecovery) => D::get("orca/recovery"),
        (A::Create, R::MigrationCounts) => D::post("migrationCounts").with_body(args.data.clone()),
        (A::Recover, R::DeadLetterArchive) => D::post("deadLetterArchive/recoverCumulusMessages")
            .with_body(Some(args.data.clone().unwrap_or_else(|| Value::Object(Map::new())))),

        (action, resource) => {
            return Err(CumulusError::UnsupportedOperation {
                action: action.name().to_string(),
                resource: resource.name().to_string(),
            })
        }
    };

    Ok(descriptor.with_query(args.query))
}

/// All supported `(action, resource)` pairs, for help output
pub fn supported_operations() -> Vec<(Action, Resource)> {
    let probe = RouteArgs {
        id: Some("_".to_string()),
        version: Some("_".to_string()),
        data: Some(serde_json::json!({
            "id": "_", "name": "_", "version": "_", "granuleId": "_",
            "arn": "_", "workflow": "_", "destinations": []
        })),
        query: Query::new(),
    };

    Action::ALL
        .iter()
        .flat_map(|action| Resource::ALL.iter().map(move |resource| (*action, *resource)))
        .filter(|(action, resource)| {
            !matches!(
                route(*action, *resource, probe.clone()),
                Err(CumulusError::UnsupportedOperation { .. })
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verb_parsing() {
        assert_eq!("get".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("DELETE".parse::<Verb>().unwrap(), Verb::Delete);
        assert!(matches!(
            "PATCH".parse::<Verb>(),
            Err(CumulusError::UnsupportedVerb(v)) if v == "PATCH"
        ));
    }

    #[test]
    fn test_query_keeps_insertion_order_and_replaces_in_place() {
        let mut query = Query::new()
            .with("fields", "name,version")
            .with("limit", 12)
            .with("name__in", "msuttp,msutls");
        query.set("limit", 20);
        query.set("searchContext", "abc");

        assert_eq!(
            query.to_query_string(),
            "fields=name,version&limit=20&name__in=msuttp,msutls&searchContext=abc"
        );
        assert_eq!(query.remove("limit"), Some("20".to_string()));
        assert_eq!(query.get("limit"), None);
    }

    #[test]
    fn test_query_from_args() {
        let query = Query::from_args(&["status=completed", "expr=a=b"]).unwrap();
        assert_eq!(query.get("status"), Some("completed"));
        assert_eq!(query.get("expr"), Some("a=b"));
        assert!(Query::from_args(&["novalue"]).is_err());
    }

    #[test]
    fn test_update_collection_requires_version() {
        let err = route(
            Action::Update,
            Resource::Collections,
            RouteArgs::new().data(json!({"name": "x"})),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CumulusError::MissingIdentifier {
                resource: "collection",
                field: "version"
            }
        ));
    }

    #[test]
    fn test_update_collection_path_from_record() {
        let descriptor = route(
            Action::Update,
            Resource::Collections,
            RouteArgs::new().data(json!({
                "name": "nalmaraw",
                "version": "1",
                "duplicateHandling": "replace"
            })),
        )
        .unwrap();
        assert_eq!(descriptor.verb, Verb::Put);
        assert_eq!(descriptor.path, "collections/nalmaraw/1");
        assert_eq!(descriptor.body.unwrap()["duplicateHandling"], "replace");
    }

    #[test]
    fn test_granule_actions_carry_action_field() {
        let descriptor = route(
            Action::ApplyWorkflow,
            Resource::Granules,
            RouteArgs::new().id("g1").data(json!({"workflow": "HelloWorldWorkflow"})),
        )
        .unwrap();
        assert_eq!(descriptor.path, "granules/g1");
        assert_eq!(
            descriptor.body.unwrap(),
            json!({"workflow": "HelloWorldWorkflow", "action": "applyWorkflow"})
        );

        let descriptor =
            route(Action::RemoveFromCmr, Resource::Granules, RouteArgs::new().id("g1")).unwrap();
        assert_eq!(descriptor.body.unwrap(), json!({"action": "removeFromCmr"}));

        let descriptor = route(Action::Run, Resource::Rules, RouteArgs::new().id("daily")).unwrap();
        assert_eq!(descriptor.body.unwrap(), json!({"name": "daily", "action": "rerun"}));
    }

    #[test]
    fn test_numeric_identifier_accepted() {
        let descriptor = route(
            Action::Update,
            Resource::Collections,
            RouteArgs::new().data(json!({"name": "goesimpacts", "version": 1})),
        )
        .unwrap();
        assert_eq!(descriptor.path, "collections/goesimpacts/1");
    }

    #[test]
    fn test_unsupported_pair() {
        let err = route(Action::Delete, Resource::Workflows, RouteArgs::new().id("w")).unwrap_err();
        assert!(matches!(err, CumulusError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_resource_aliases() {
        assert_eq!("granule".parse::<Resource>().unwrap(), Resource::Granules);
        assert_eq!("granules".parse::<Resource>().unwrap(), Resource::Granules);
        assert_eq!(
            "async-operation".parse::<Resource>().unwrap(),
            Resource::AsyncOperations
        );
        assert_eq!(
            "remove-from-cmr".parse::<Action>().unwrap(),
            Action::RemoveFromCmr
        );
        assert!("widgets".parse::<Resource>().is_err());
    }

    #[test]
    fn test_supported_operations_table() {
        let ops = supported_operations();
        assert!(ops.contains(&(Action::List, Resource::Granules)));
        assert!(ops.contains(&(Action::Recover, Resource::DeadLetterArchive)));
        assert!(!ops.contains(&(Action::Delete, Resource::Workflows)));
    }

    #[test]
    fn test_query_is_attached() {
        let descriptor = route(
            Action::List,
            Resource::Collections,
            RouteArgs::new().query(Query::new().with("includeStats", "true")),
        )
        .unwrap();
        assert_eq!(descriptor.query.to_query_string(), "includeStats=true");
    }
}
