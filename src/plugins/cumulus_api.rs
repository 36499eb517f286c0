use crate::cumulus_api::resources::{route, Action, Resource, RouteArgs};
use crate::cumulus_api::types::{ApiResponse, CumulusError, UpstreamErrorKind};
use crate::plugins::remediation::WorkflowSwap;
use crate::plugins::{filters, parse_args, read_json_arg, write_json, Plugin, PluginContext};
use crate::storage::BoxFuture;
use clap::Parser;
use serde_json::Value;

/// Records returned by one Cumulus API lambda invocation
const DEFAULT_LIST_LIMIT: usize = 100;

/// Generic access to every `(action, target)` pair of the dispatch table
///
/// `pylot cumulus_api list granules status=completed --limit 50`
#[derive(Debug, Parser)]
#[command(name = "cumulus_api")]
struct CumulusApiArgs {
    /// Action to perform: list, get, create, update, delete, ...
    action: String,

    /// Record type the action applies to: granules, collections, ...
    target: String,

    /// Identifier, optional version, and key=value query filters
    #[arg(num_args = 0..)]
    positional: Vec<String>,

    /// JSON body, inline or as a path to a .json file
    #[arg(short, long)]
    data: Option<String>,

    /// Maximum number of records to collect for list actions
    #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
    limit: usize,

    /// Write the results to this file instead of returning them
    #[arg(short, long)]
    output: Option<String>,
}

pub struct CumulusApiPlugin;

impl CumulusApiPlugin {
    async fn execute(
        &self,
        ctx: &PluginContext,
        args: CumulusApiArgs,
    ) -> Result<Value, CumulusError> {
        let action: Action = args.action.parse().map_err(|_| CumulusError::UnsupportedOperation {
            action: args.action.clone(),
            resource: args.target.clone(),
        })?;
        let resource: Resource =
            args.target.parse().map_err(|_| CumulusError::UnsupportedOperation {
                action: args.action.clone(),
                resource: args.target.clone(),
            })?;

        let (filter_args, identifiers): (Vec<String>, Vec<String>) =
            args.positional.into_iter().partition(|arg| arg.contains('='));
        let mut identifiers = identifiers.into_iter();

        let data = match &args.data {
            Some(data) => Some(read_json_arg(ctx, data).await?),
            None => None,
        };
        let route_args = RouteArgs {
            id: identifiers.next(),
            version: identifiers.next(),
            data,
            query: filters(&filter_args)?,
        };

        let descriptor = route(action, resource, route_args)?;
        tracing::info!("Calling Cumulus API: {}_{}", action, resource);

        let results = if action == Action::List {
            ctx.client
                .collect(&descriptor.path, &descriptor.query, args.limit)
                .await?
                .into_json()
        } else {
            let response = ctx.client.execute(&descriptor).await?;
            let response =
                Self::handle_upstream_error(ctx, response, || ctx.client.execute(&descriptor))
                    .await?;
            response.into_json()
        };

        match args.output {
            Some(output) => {
                let path = write_json(ctx, &output, &results).await?;
                Ok(Value::String(format!("Results written to: {}", path.display())))
            }
            None => Ok(results),
        }
    }

    /// Reissue once through the workflow swap when the API reports the
    /// payload limit; every other response passes through
    async fn handle_upstream_error<F, Fut>(
        ctx: &PluginContext,
        response: ApiResponse,
        reissue: F,
    ) -> Result<ApiResponse, CumulusError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<ApiResponse, CumulusError>>,
    {
        match response.upstream_error() {
            Some(err) if err.kind == UpstreamErrorKind::PayloadLimit => {
                WorkflowSwap::from_context(ctx)?.run(reissue).await
            }
            Some(err) => {
                tracing::debug!("Cumulus API returned {:?}: {}", err.kind, err.message);
                Ok(response)
            }
            None => Ok(response),
        }
    }
}

impl Plugin for CumulusApiPlugin {
    fn name(&self) -> &'static str {
        "cumulus_api"
    }

    fn description(&self) -> &'static str {
        "Call any Cumulus API endpoint: <action> <target> [id] [version] [key=value...]"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>> {
        Box::pin(async move {
            let args: CumulusApiArgs = parse_args(self.name(), argv)?;
            self.execute(ctx, args).await
        })
    }
}
