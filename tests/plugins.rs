//! Plugin tests
//!
//! Each plugin runs through the builtin registry against a wiremock Cumulus
//! API and in-memory cloud collaborators.

use pylot::cloud::{InMemoryObjectStore, StaticFunction};
use pylot::cumulus_api::config::{OPENSEARCH_LAMBDA_ARN, STACK_PREFIX};
use pylot::{Config, CumulusClient, CumulusError, PluginContext, PluginRegistry};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn context(server: &MockServer, dir: &Path, config: Config) -> PluginContext {
    PluginContext::new(CumulusClient::new(server.uri(), "token-123"), config).with_working_dir(dir)
}

// ============================================================================
// cumulus_api
// ============================================================================

#[tokio::test]
async fn test_cumulus_api_get_collection_writes_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/collections/nalmaraw/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "nalmaraw", "version": "1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());
    let result = PluginRegistry::builtin()
        .run(
            "cumulus_api",
            &ctx,
            &argv(&["get", "collection", "nalmaraw", "1", "--output", "collection.json"]),
        )
        .await
        .unwrap();

    assert!(result.as_str().unwrap().starts_with("Results written to:"));
    let written = std::fs::read_to_string(dir.path().join("collection.json")).unwrap();
    let written: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(written["name"], "nalmaraw");
}

#[tokio::test]
async fn test_cumulus_api_list_collects_with_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/granules"))
        .and(query_param("status", "failed"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 2, "searchContext": "abc"},
            "results": [{"granuleId": "g1"}, {"granuleId": "g2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());
    let result = PluginRegistry::builtin()
        .run("cumulus_api", &ctx, &argv(&["list", "granules", "status=failed", "--limit", "2"]))
        .await
        .unwrap();

    assert_eq!(result, json!([{"granuleId": "g1"}, {"granuleId": "g2"}]));
}

#[tokio::test]
async fn test_cumulus_api_payload_limit_swaps_workflow_and_reissues() {
    let server = MockServer::start().await;
    let rule = json!({"name": "discover_rule", "workflow": "DiscoverGranules", "state": "ENABLED"});

    Mock::given(method("PUT"))
        .and(path("/v1/rules/discover_rule"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Bad Request",
            "statusCode": 400,
            "message": "1 validation error detected: Value at 'input' failed to satisfy constraint: Member must have length less than or equal to 8192"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/rules/discover_rule"))
        .and(body_json(&rule))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "discover_rule", "state": "ENABLED"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryObjectStore::new();
    store.insert(
        "ghrc-internal",
        "ghrc/workflows/DiscoverGranules.json",
        b"{\"big\": true}".to_vec(),
    );
    store.insert(
        "ghrc-internal",
        "ghrc/workflows/HelloWorldWorkflow.json",
        b"{\"small\": true}".to_vec(),
    );

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::from_pairs([(STACK_PREFIX, "ghrc")]))
        .with_object_store(Arc::new(store.clone()));

    let result = PluginRegistry::builtin()
        .run("cumulus_api", &ctx, &argv(&["update", "rule", "--data", &rule.to_string()]))
        .await
        .unwrap();

    assert_eq!(result["state"], "ENABLED");
    assert_eq!(
        store.object("ghrc-internal", "ghrc/workflows/DiscoverGranules.json"),
        Some(b"{\"big\": true}".to_vec())
    );
}

#[tokio::test]
async fn test_cumulus_api_payload_limit_without_stack_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rules"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Bad Request",
            "message": "Member must have length less than or equal to 8192"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());
    let err = PluginRegistry::builtin()
        .run("cumulus_api", &ctx, &argv(&["create", "rules", "--data", "{\"name\": \"r\"}"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CumulusError::Config(_)));
}

#[tokio::test]
async fn test_cumulus_api_unknown_target() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());

    let err = PluginRegistry::builtin()
        .run("cumulus_api", &ctx, &argv(&["list", "widgets"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CumulusError::UnsupportedOperation { .. }));
}

// ============================================================================
// bulk_create_collections
// ============================================================================

#[tokio::test]
async fn test_bulk_create_collections_reports_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/collections"))
        .and(body_json(json!({"name": "goesimpacts", "version": "1", "meta": {"hyrax": "false"}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "Record saved", "record": {}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/collections"))
        .and(body_json(json!({"name": "nalmaraw", "version": "1", "meta": {"hyrax": "true"}})))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": "Conflict",
            "message": "A record already exists for nalmaraw___1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("collections.csv"),
        "name,version,meta\ngoesimpacts,1,\"{'hyrax': 'false'}\"\nnalmaraw,1,\"{'hyrax': 'true'}\"\n",
    )
    .unwrap();

    let ctx = context(&server, dir.path(), Config::default());
    let result = PluginRegistry::builtin()
        .run("bulk_create_collections", &ctx, &argv(&["collections.csv"]))
        .await
        .unwrap();

    assert_eq!(result["saved"], 1);
    let errors = result["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["name"], "nalmaraw");
    assert_eq!(errors[0]["version"], "1");
    assert_eq!(errors[0]["error"], "Conflict");
}

// ============================================================================
// get_status / get_cumulus_records / update_*
// ============================================================================

#[tokio::test]
async fn test_get_status_table_and_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/collections"))
        .and(query_param("includeStats", "true"))
        .and(query_param("fields", "name,version,stats"))
        .and(query_param("name", "nalmaraw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 1},
            "results": [{
                "name": "nalmaraw",
                "version": "1",
                "stats": {"completed": 40, "failed": 2, "total": 42}
            }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());
    let registry = PluginRegistry::builtin();

    let table = registry
        .run(
            "get_status",
            &ctx,
            &argv(&["--filter", "name=nalmaraw", "--fields", "completed,total"]),
        )
        .await
        .unwrap();
    let table = table.as_str().unwrap();
    assert!(table.contains("nalmaraw"));
    assert!(table.contains("42"));
    assert!(!table.contains("queued"));

    let json = registry
        .run("get_status", &ctx, &argv(&["--filter", "name=nalmaraw", "-o", "json"]))
        .await
        .unwrap();
    assert_eq!(json[0]["stats"]["completed"], 40);
}

#[tokio::test]
async fn test_get_cumulus_records_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/granules"))
        .and(query_param("collectionId", "nalmaraw___1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 1234, "searchContext": "x"},
            "results": [{"granuleId": "g1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, dir.path(), Config::default());
    let result = PluginRegistry::builtin()
        .run(
            "get_cumulus_records",
            &ctx,
            &argv(&["granules", "--filter", "collectionId=nalmaraw___1", "--count"]),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({"granules": {"count": 1234}}));
}

#[tokio::test]
async fn test_update_provider_from_file() {
    let server = MockServer::start().await;
    let provider = json!({"id": "ghrc_daac", "globalConnectionLimit": 10});
    Mock::given(method("PUT"))
        .and(path("/v1/providers/ghrc_daac"))
        .and(body_json(&provider))
        .respond_with(ResponseTemplate::new(200).set_body_json(&provider))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("provider.json"), provider.to_string()).unwrap();

    let ctx = context(&server, dir.path(), Config::default());
    let result = PluginRegistry::builtin()
        .run("update_provider", &ctx, &argv(&["provider.json"]))
        .await
        .unwrap();
    assert_eq!(result["globalConnectionLimit"], 10);
}

// ============================================================================
// opensearch
// ============================================================================

#[tokio::test]
async fn test_opensearch_query_then_update_matches() {
    let server = MockServer::start().await;
    for granule in ["g1", "g2"] {
        Mock::given(method("PUT"))
            .and(path(format!("/v1/granules/{}", granule)))
            .and(body_json(json!({
                "granuleId": granule,
                "status": "running",
                "productVolume": "100"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "updated"})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let store = InMemoryObjectStore::new();
    store.insert(
        "results-bucket",
        "opensearch/out.json",
        json!([
            {"_id": "1", "_source": {"granuleId": "g1", "status": "failed", "productVolume": 100}},
            {"_id": "2", "_source": {"granuleId": "g2", "status": "failed", "productVolume": "100"}}
        ])
        .to_string(),
    );
    let function = StaticFunction::new(
        200,
        json!({"Bucket": "results-bucket", "Key": "opensearch/out.json", "record_count": 2})
            .to_string(),
    );

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("update.json"), r#"{"status": "running"}"#).unwrap();

    let ctx = context(
        &server,
        dir.path(),
        Config::from_pairs([(
            OPENSEARCH_LAMBDA_ARN,
            "arn:aws:lambda:us-west-2:123:function:opensearch",
        )]),
    )
    .with_object_store(Arc::new(store))
    .with_functions(Arc::new(function.clone()));

    let report = PluginRegistry::builtin()
        .run(
            "opensearch",
            &ctx,
            &argv(&[
                "granule",
                "--query",
                r#"{"query": {"term": {"status": "failed"}}}"#,
                "--update-data",
                "update.json",
            ]),
        )
        .await
        .unwrap();

    assert_eq!(report["record_count"], 2);
    assert_eq!(report["updated"]["succeeded"], 2);

    let calls = function.calls();
    let payload: Value = serde_json::from_slice(&calls[0].1).unwrap();
    assert_eq!(payload["config"]["record_type"], "granule");
    assert_eq!(payload["config"]["terminate_after"], 100);
    assert!(dir.path().join("query_results.json").exists());
}

#[tokio::test]
async fn test_opensearch_bulk_delete_populates_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/granules/bulkDelete"))
        .and(body_json(json!({"forceRemoveFromCmr": true, "ids": ["g1", "g2"]})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "async-op-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryObjectStore::new();
    store.insert(
        "results-bucket",
        "out.json",
        json!([{"_source": {"granuleId": "g1"}}, {"_source": {"granuleId": "g2"}}]).to_string(),
    );
    let function = StaticFunction::new(
        200,
        json!({"Bucket": "results-bucket", "Key": "out.json"}).to_string(),
    );

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bulk_delete.json"), r#"{"forceRemoveFromCmr": true}"#).unwrap();

    let ctx = context(
        &server,
        dir.path(),
        Config::from_pairs([(OPENSEARCH_LAMBDA_ARN, "arn:opensearch")]),
    )
    .with_object_store(Arc::new(store))
    .with_functions(Arc::new(function));

    let report = PluginRegistry::builtin()
        .run(
            "opensearch",
            &ctx,
            &argv(&["granule", "-q", "{}", "--delete", "bulk_delete.json", "--bulk"]),
        )
        .await
        .unwrap();

    assert_eq!(report["deleted"]["id"], "async-op-1");
}
