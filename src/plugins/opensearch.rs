use crate::cumulus_api::bulk::BulkOutcome;
use crate::cumulus_api::config::OPENSEARCH_LAMBDA_ARN;
use crate::cumulus_api::resources::{record_field, Action, Resource, RouteArgs};
use crate::cumulus_api::types::{ApiResponse, CumulusError};
use crate::plugins::{
    parse_args, query_via_function, read_json_arg, read_json_file, Plugin, PluginContext,
};
use crate::storage::BoxFuture;
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RecordType {
    Granule,
    Collection,
    Provider,
    Pdr,
    Rule,
    Logs,
    Execution,
    #[value(name = "reconciliationReport")]
    ReconciliationReport,
}

impl RecordType {
    /// Name understood by the search function
    fn index_name(&self) -> &'static str {
        match self {
            RecordType::Granule => "granule",
            RecordType::Collection => "collection",
            RecordType::Provider => "provider",
            RecordType::Pdr => "pdr",
            RecordType::Rule => "rule",
            RecordType::Logs => "log",
            RecordType::Execution => "execution",
            RecordType::ReconciliationReport => "reconciliationReport",
        }
    }

    fn resource(&self) -> Resource {
        match self {
            RecordType::Granule => Resource::Granules,
            RecordType::Collection => Resource::Collections,
            RecordType::Provider => Resource::Providers,
            RecordType::Pdr => Resource::Pdrs,
            RecordType::Rule => Resource::Rules,
            RecordType::Logs => Resource::Logs,
            RecordType::Execution => Resource::Executions,
            RecordType::ReconciliationReport => Resource::ReconciliationReports,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "opensearch")]
struct OpenSearchArgs {
    /// Record type to query
    #[arg(value_enum)]
    record_type: RecordType,

    /// Query in the OpenSearch DSL, inline or as a path to a .json file
    #[arg(short, long)]
    query: String,

    /// Maximum number of matches; 0 retrieves all of them
    #[arg(short, long = "terminate-after", default_value_t = 100)]
    terminate_after: u64,

    /// Name of the results file
    #[arg(short, long, default_value = "query_results.json")]
    results: String,

    /// JSON file with field values applied to every matching record
    #[arg(short, long = "update-data")]
    update_data: Option<String>,

    /// JSON file with a bulk-delete definition; matching records are deleted
    #[arg(short, long)]
    delete: Option<String>,

    /// Use the bulk-delete endpoint instead of per-record deletes
    #[arg(short, long)]
    bulk: bool,
}

/// Query OpenSearch directly, bypassing the Cumulus API, and optionally
/// update or delete the matching records through the API
pub struct OpenSearch;

/// Merge `update` into `target`, recursing into nested objects
pub fn deep_merge(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target), Value::Object(update)) => {
            for (key, value) in update {
                let nested = value.is_object() && target.get(key).map_or(false, Value::is_object);
                if !nested {
                    target.insert(key.clone(), value.clone());
                } else if let Some(existing) = target.get_mut(key) {
                    deep_merge(existing, value);
                }
            }
        }
        (target, update) => *target = update.clone(),
    }
}

/// Granule records must carry `productVolume` as a string to pass validation
fn stringify_product_volume(record: &mut Value) {
    if let Some(volume) = record.get_mut("productVolume") {
        if !volume.is_string() && !volume.is_null() {
            *volume = Value::String(volume.to_string());
        }
    }
}

/// Strip the search hit envelope, keeping each `_source`
fn hit_sources(results: Value) -> Vec<Value> {
    match results {
        Value::Array(hits) => hits
            .into_iter()
            .map(|hit| match hit.get("_source") {
                Some(source) => source.clone(),
                None => hit,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn tally(label: &str, outcomes: &[BulkOutcome<Value, ApiResponse>]) -> Value {
    let failed: Vec<Value> = outcomes
        .iter()
        .filter_map(|outcome| match &outcome.result {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(json!({
                "record": outcome.record,
                "status": response.status,
                "body": response.clone().into_json(),
            })),
            Err(e) => Some(json!({"record": outcome.record, "error": e.to_string()})),
        })
        .collect();
    tracing::info!(
        "{}: {} succeeded, {} failed",
        label,
        outcomes.len() - failed.len(),
        failed.len()
    );
    json!({ "succeeded": outcomes.len() - failed.len(), "failed": failed })
}

impl OpenSearch {
    async fn execute(
        &self,
        ctx: &PluginContext,
        args: OpenSearchArgs,
    ) -> Result<Value, CumulusError> {
        let query = read_json_arg(ctx, &args.query).await?;
        let payload = json!({
            "config": {
                "query": query,
                "record_type": args.record_type.index_name().trim_end_matches('s'),
                "terminate_after": args.terminate_after,
            }
        });

        let (path, summary) = query_via_function(
            ctx,
            "OpenSearch",
            OPENSEARCH_LAMBDA_ARN,
            &payload,
            &args.results,
        )
        .await?;
        let mut report = json!({
            "record_count": summary.get("record_count").cloned().unwrap_or(Value::Null),
            "results": path.display().to_string(),
        });

        if args.update_data.is_none() && args.delete.is_none() {
            return Ok(report);
        }

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CumulusError::Plugin(format!("Failed to read {:?}: {}", path, e)))?;
        let hits: Value = serde_json::from_str(&text)
            .map_err(|e| CumulusError::Plugin(format!("Invalid results in {:?}: {}", path, e)))?;
        let mut records = hit_sources(hits);

        if let Some(update_file) = &args.update_data {
            let update = read_json_file(ctx, update_file).await?;
            for record in records.iter_mut() {
                deep_merge(record, &update);
                stringify_product_volume(record);
            }
            let resource = args.record_type.resource();
            let outcomes = ctx
                .client
                .apply_concurrently(
                    move |client, record: Value| async move {
                        client
                            .dispatch(Action::Update, resource, RouteArgs::new().data(record))
                            .await
                    },
                    records.clone(),
                )
                .await;
            report["updated"] = tally("Update", &outcomes);
        }

        if let Some(delete_file) = &args.delete {
            report["deleted"] = if args.bulk {
                self.bulk_delete(ctx, delete_file, &records).await?
            } else {
                self.delete_each(ctx, records).await
            };
        }

        Ok(report)
    }

    async fn bulk_delete(
        &self,
        ctx: &PluginContext,
        delete_file: &str,
        records: &[Value],
    ) -> Result<Value, CumulusError> {
        let mut definition = read_json_file(ctx, delete_file).await?;
        let ids = records
            .iter()
            .map(|record| record_field(Some(record), "granule", "granuleId").map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;

        let map = definition
            .as_object_mut()
            .ok_or_else(|| CumulusError::Plugin(format!("{} is not a JSON object", delete_file)))?;
        map.insert("ids".to_string(), Value::Array(ids));

        tracing::info!("Submitting bulk delete request");
        let response = ctx.client.bulk_delete_granules(definition).await?;
        if let Some(id) = response.json().and_then(|body| body.get("id")) {
            tracing::info!(
                "Check bulk delete status using: cumulus_api get async_operation {}",
                id
            );
        }
        Ok(response.into_json())
    }

    /// Remove every granule from CMR, then delete it
    async fn delete_each(&self, ctx: &PluginContext, records: Vec<Value>) -> Value {
        let removed = ctx
            .client
            .apply_concurrently(
                |client, record: Value| async move {
                    let id = record_field(Some(&record), "granule", "granuleId")?;
                    client.remove_granule_from_cmr(&id).await
                },
                records.clone(),
            )
            .await;
        let deleted = ctx
            .client
            .apply_concurrently(
                |client, record: Value| async move {
                    let id = record_field(Some(&record), "granule", "granuleId")?;
                    client.delete_granule(&id).await
                },
                records,
            )
            .await;

        json!({
            "removed_from_cmr": tally("CMR removal", &removed),
            "deleted": tally("Deletion", &deleted),
        })
    }
}

impl Plugin for OpenSearch {
    fn name(&self) -> &'static str {
        "opensearch"
    }

    fn description(&self) -> &'static str {
        "Query OpenSearch directly, bypassing the Cumulus API"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>> {
        Box::pin(async move {
            let args: OpenSearchArgs = parse_args(self.name(), argv)?;
            self.execute(ctx, args).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge_nested() {
        let mut record = json!({"granuleId": "g1", "status": "failed", "meta": {"a": 1, "b": 2}});
        deep_merge(&mut record, &json!({"status": "running", "meta": {"b": 3, "c": 4}}));
        assert_eq!(
            record,
            json!({"granuleId": "g1", "status": "running", "meta": {"a": 1, "b": 3, "c": 4}})
        );
    }

    #[test]
    fn test_product_volume_stringified() {
        let mut record = json!({"productVolume": 12345});
        stringify_product_volume(&mut record);
        assert_eq!(record["productVolume"], "12345");

        let mut record = json!({"granuleId": "g1"});
        stringify_product_volume(&mut record);
        assert!(record.get("productVolume").is_none());
    }

    #[test]
    fn test_hit_sources() {
        let hits = json!([{"_id": "1", "_source": {"granuleId": "g1"}}, {"granuleId": "g2"}]);
        assert_eq!(
            hit_sources(hits),
            vec![json!({"granuleId": "g1"}), json!({"granuleId": "g2"})]
        );
    }

    #[test]
    fn test_args_and_record_type_names() {
        let args = OpenSearchArgs::try_parse_from([
            "opensearch",
            "granule",
            "-q",
            "{\"query\": {\"term\": {\"collectionId\": \"goesimpacts___1\"}}}",
            "--delete",
            "bulk_delete.json",
            "--bulk",
        ])
        .unwrap();
        assert_eq!(args.record_type, RecordType::Granule);
        assert_eq!(args.terminate_after, 100);
        assert!(args.bulk);
        assert_eq!(RecordType::Logs.index_name(), "log");
        assert_eq!(RecordType::ReconciliationReport.resource(), Resource::ReconciliationReports);
    }
}
