//! Typed convenience operations
//!
//! Each method fills in a route from the dispatch table and issues it. Update
//! methods read the path identifier from the record itself and fail with
//! [`CumulusError::MissingIdentifier`] before any request is sent.

use crate::cumulus_api::client::CumulusClient;
use crate::cumulus_api::resources::{Action, Query, Resource, RouteArgs};
use crate::cumulus_api::types::{ApiResponse, CumulusError};
use serde_json::{json, Value};

type ApiResult = Result<ApiResponse, CumulusError>;

impl CumulusClient {
    async fn list(&self, resource: Resource, query: Query) -> ApiResult {
        self.dispatch(Action::List, resource, RouteArgs::new().query(query)).await
    }

    async fn get_by_id(&self, resource: Resource, id: &str) -> ApiResult {
        self.dispatch(Action::Get, resource, RouteArgs::new().id(id)).await
    }

    async fn with_data(&self, action: Action, resource: Resource, data: Value) -> ApiResult {
        self.dispatch(action, resource, RouteArgs::new().data(data)).await
    }

    async fn delete_by_id(&self, resource: Resource, id: &str) -> ApiResult {
        self.dispatch(Action::Delete, resource, RouteArgs::new().id(id)).await
    }

    pub async fn get_version(&self) -> ApiResult {
        self.dispatch(Action::Get, Resource::Version, RouteArgs::new()).await
    }

    // Providers

    pub async fn list_providers(&self, query: Query) -> ApiResult {
        self.list(Resource::Providers, query).await
    }

    pub async fn get_provider(&self, provider_id: &str) -> ApiResult {
        self.get_by_id(Resource::Providers, provider_id).await
    }

    pub async fn create_provider(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Providers, data).await
    }

    /// Update a provider; the record must carry `id`
    pub async fn update_provider(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::Providers, data).await
    }

    pub async fn delete_provider(&self, provider_id: &str) -> ApiResult {
        self.delete_by_id(Resource::Providers, provider_id).await
    }

    // Collections

    pub async fn list_collections(&self, query: Query) -> ApiResult {
        self.list(Resource::Collections, query).await
    }

    pub async fn list_collections_with_active_granules(&self, query: Query) -> ApiResult {
        self.list(Resource::ActiveCollections, query).await
    }

    pub async fn get_collection(&self, name: &str, version: &str) -> ApiResult {
        self.dispatch(
            Action::Get,
            Resource::Collections,
            RouteArgs::new().id(name).version(version),
        )
        .await
    }

    pub async fn create_collection(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Collections, data).await
    }

    /// Update a collection; the record must carry `name` and `version`
    pub async fn update_collection(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::Collections, data).await
    }

    pub async fn delete_collection(&self, name: &str, version: &str) -> ApiResult {
        self.dispatch(
            Action::Delete,
            Resource::Collections,
            RouteArgs::new().id(name).version(version),
        )
        .await
    }

    // Granules

    pub async fn list_granules(&self, query: Query) -> ApiResult {
        self.list(Resource::Granules, query).await
    }

    pub async fn get_granule(&self, granule_id: &str) -> ApiResult {
        self.get_by_id(Resource::Granules, granule_id).await
    }

    pub async fn create_granule(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Granules, data).await
    }

    /// Update a granule; the record must carry `granuleId`
    pub async fn update_granule(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::Granules, data).await
    }

    pub async fn delete_granule(&self, granule_id: &str) -> ApiResult {
        self.delete_by_id(Resource::Granules, granule_id).await
    }

    /// Associate an execution with a granule; the record must carry `granuleId`
    pub async fn associate_execution_with_granule(&self, data: Value) -> ApiResult {
        self.with_data(Action::Associate, Resource::GranuleExecutions, data).await
    }

    pub async fn reingest_granule(&self, granule_id: &str, data: Option<Value>) -> ApiResult {
        let mut args = RouteArgs::new().id(granule_id);
        args.data = data;
        self.dispatch(Action::Reingest, Resource::Granules, args).await
    }

    pub async fn apply_workflow_to_granule(&self, granule_id: &str, workflow: &str) -> ApiResult {
        self.dispatch(
            Action::ApplyWorkflow,
            Resource::Granules,
            RouteArgs::new().id(granule_id).data(json!({ "workflow": workflow })),
        )
        .await
    }

    /// Move granule files; `destinations` is the list of regex/bucket/filepath targets
    pub async fn move_granule(&self, granule_id: &str, destinations: Value) -> ApiResult {
        self.dispatch(
            Action::Move,
            Resource::Granules,
            RouteArgs::new().id(granule_id).data(json!({ "destinations": destinations })),
        )
        .await
    }

    pub async fn remove_granule_from_cmr(&self, granule_id: &str) -> ApiResult {
        self.dispatch(Action::RemoveFromCmr, Resource::Granules, RouteArgs::new().id(granule_id))
            .await
    }

    pub async fn bulk_granules(&self, data: Value) -> ApiResult {
        self.with_data(Action::Bulk, Resource::Granules, data).await
    }

    pub async fn bulk_delete_granules(&self, data: Value) -> ApiResult {
        self.with_data(Action::BulkDelete, Resource::Granules, data).await
    }

    pub async fn bulk_reingest_granules(&self, data: Value) -> ApiResult {
        self.with_data(Action::BulkReingest, Resource::Granules, data).await
    }

    // PDRs

    pub async fn list_pdrs(&self, query: Query) -> ApiResult {
        self.list(Resource::Pdrs, query).await
    }

    pub async fn get_pdr(&self, pdr_name: &str) -> ApiResult {
        self.get_by_id(Resource::Pdrs, pdr_name).await
    }

    pub async fn delete_pdr(&self, pdr_name: &str) -> ApiResult {
        self.delete_by_id(Resource::Pdrs, pdr_name).await
    }

    // Rules

    pub async fn list_rules(&self, query: Query) -> ApiResult {
        self.list(Resource::Rules, query).await
    }

    pub async fn get_rule(&self, rule_name: &str) -> ApiResult {
        self.get_by_id(Resource::Rules, rule_name).await
    }

    pub async fn create_rule(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Rules, data).await
    }

    /// Update a rule; the record must carry `name`
    pub async fn update_rule(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::Rules, data).await
    }

    pub async fn delete_rule(&self, rule_name: &str) -> ApiResult {
        self.delete_by_id(Resource::Rules, rule_name).await
    }

    /// Re-run a one-time rule
    pub async fn run_rule(&self, rule_name: &str) -> ApiResult {
        self.dispatch(Action::Run, Resource::Rules, RouteArgs::new().id(rule_name))
            .await
    }

    // Stats and logs

    pub async fn get_stats(&self, query: Query) -> ApiResult {
        self.dispatch(Action::Get, Resource::Stats, RouteArgs::new().query(query))
            .await
    }

    pub async fn get_stats_aggregate(&self, query: Query) -> ApiResult {
        self.dispatch(Action::Get, Resource::StatsAggregate, RouteArgs::new().query(query))
            .await
    }

    pub async fn list_logs(&self, query: Query) -> ApiResult {
        self.list(Resource::Logs, query).await
    }

    pub async fn get_logs(&self, execution_name: &str) -> ApiResult {
        self.get_by_id(Resource::Logs, execution_name).await
    }

    pub async fn get_granules_csv(&self) -> ApiResult {
        self.dispatch(Action::Get, Resource::GranulesCsv, RouteArgs::new()).await
    }

    // Executions and workflows

    pub async fn list_executions(&self, query: Query) -> ApiResult {
        self.list(Resource::Executions, query).await
    }

    pub async fn get_execution(&self, arn: &str) -> ApiResult {
        self.get_by_id(Resource::Executions, arn).await
    }

    pub async fn get_execution_status(&self, arn: &str) -> ApiResult {
        self.get_by_id(Resource::ExecutionStatus, arn).await
    }

    pub async fn create_execution(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Executions, data).await
    }

    /// Update an execution; the record must carry `arn`
    pub async fn update_execution(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::Executions, data).await
    }

    pub async fn delete_execution(&self, arn: &str) -> ApiResult {
        self.delete_by_id(Resource::Executions, arn).await
    }

    pub async fn search_executions_by_granules(&self, data: Value) -> ApiResult {
        self.with_data(Action::Search, Resource::Executions, data).await
    }

    pub async fn search_workflows_by_granules(&self, data: Value) -> ApiResult {
        self.with_data(Action::Search, Resource::Workflows, data).await
    }

    pub async fn list_workflows(&self, query: Query) -> ApiResult {
        self.list(Resource::Workflows, query).await
    }

    pub async fn get_workflow(&self, workflow_name: &str) -> ApiResult {
        self.get_by_id(Resource::Workflows, workflow_name).await
    }

    // Async operations, replays and schemas

    pub async fn list_async_operations(&self, query: Query) -> ApiResult {
        self.list(Resource::AsyncOperations, query).await
    }

    pub async fn get_async_operation(&self, operation_id: &str) -> ApiResult {
        self.get_by_id(Resource::AsyncOperations, operation_id).await
    }

    /// Start a Kinesis or SQS replay
    pub async fn create_replay(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::Replays, data).await
    }

    pub async fn get_schema(&self, schema_type: &str) -> ApiResult {
        self.get_by_id(Resource::Schemas, schema_type).await
    }

    // Reconciliation reports

    pub async fn list_reconciliation_reports(&self, query: Query) -> ApiResult {
        self.list(Resource::ReconciliationReports, query).await
    }

    pub async fn get_reconciliation_report(&self, name: &str) -> ApiResult {
        self.get_by_id(Resource::ReconciliationReports, name).await
    }

    pub async fn create_reconciliation_report(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::ReconciliationReports, data)
            .await
    }

    pub async fn delete_reconciliation_report(&self, name: &str) -> ApiResult {
        self.delete_by_id(Resource::ReconciliationReports, name).await
    }

    pub async fn get_instance_metadata(&self) -> ApiResult {
        self.dispatch(Action::Get, Resource::InstanceMeta, RouteArgs::new()).await
    }

    // Search index maintenance

    pub async fn reindex_elasticsearch(&self, data: Value) -> ApiResult {
        self.with_data(Action::Reindex, Resource::SearchIndex, data).await
    }

    pub async fn get_current_elasticsearch_index(&self) -> ApiResult {
        self.dispatch(Action::Get, Resource::SearchIndex, RouteArgs::new()).await
    }

    pub async fn change_elasticsearch_index(&self, data: Value) -> ApiResult {
        self.with_data(Action::Update, Resource::SearchIndex, data).await
    }

    pub async fn list_elasticsearch_indices(&self) -> ApiResult {
        self.list(Resource::SearchIndex, Query::new()).await
    }

    pub async fn get_elasticsearch_reindex_status(&self) -> ApiResult {
        self.dispatch(Action::Get, Resource::ReindexStatus, RouteArgs::new()).await
    }

    pub async fn index_from_database(&self, data: Value) -> ApiResult {
        self.with_data(Action::Reindex, Resource::DatabaseIndex, data).await
    }

    // Recovery and migration

    pub async fn list_orca_recovery_status(&self, query: Query) -> ApiResult {
        self.list(Resource::OrcaRecovery, query).await
    }

    pub async fn create_migration_count(&self, data: Value) -> ApiResult {
        self.with_data(Action::Create, Resource::MigrationCounts, data).await
    }

    pub async fn recover_cumulus_messages(&self, data: Option<Value>) -> ApiResult {
        let mut args = RouteArgs::new();
        args.data = data;
        self.dispatch(Action::Recover, Resource::DeadLetterArchive, args).await
    }
}
