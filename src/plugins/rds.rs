use crate::cumulus_api::config::RDS_LAMBDA_ARN;
use crate::cumulus_api::types::CumulusError;
use crate::plugins::{parse_args, query_via_function, read_json_arg, Plugin, PluginContext};
use crate::storage::BoxFuture;
use clap::Parser;
use serde_json::{json, Value};

/// Example: `{"rds_config": {"records": "granules", "where": "name LIKE nalma%",
/// "columns": ["granule_id", "status"], "limit": 10}}`
#[derive(Debug, Parser)]
#[command(name = "rds_lambda")]
struct RdsArgs {
    /// RDS lambda query, inline or as a path to a .json file
    #[arg(short, long)]
    query: String,

    /// Name of the results file
    #[arg(short, long, default_value = "query_results.json")]
    results: String,
}

/// Query the Cumulus database directly, bypassing the Cumulus API
pub struct RdsLambda;

impl Plugin for RdsLambda {
    fn name(&self) -> &'static str {
        "rds_lambda"
    }

    fn description(&self) -> &'static str {
        "Submit queries directly to the Cumulus RDS instance"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>> {
        Box::pin(async move {
            let args: RdsArgs = parse_args(self.name(), argv)?;
            let query = read_json_arg(ctx, &args.query).await?;
            let (path, summary) =
                query_via_function(ctx, "RDS", RDS_LAMBDA_ARN, &query, &args.results).await?;

            let record_count = summary.get("record_count").cloned().unwrap_or(Value::Null);
            tracing::info!("{} records obtained: {}", record_count, path.display());
            Ok(json!({
                "record_count": record_count,
                "results": path.display().to_string(),
            }))
        })
    }
}
