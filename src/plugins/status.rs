use crate::cumulus_api::resources::Query;
use crate::cumulus_api::types::CumulusError;
use crate::plugins::{filters, parse_args, Plugin, PluginContext};
use crate::storage::BoxFuture;
use clap::{Parser, ValueEnum};
use serde_json::Value;

const STAT_COLUMNS: [&str; 5] = ["completed", "running", "failed", "queued", "total"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "get_status")]
struct GetStatusArgs {
    /// key=value filters applied to the collection listing
    #[arg(short = 'f', long = "filter", num_args = 1..)]
    filter: Vec<String>,

    /// Stat columns to show (comma separated or repeated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    fields: Vec<String>,

    #[arg(short = 'o', long = "output-format", value_enum, default_value_t = OutputFormat::Table)]
    output_format: OutputFormat,
}

/// Granule status counts per collection
pub struct GetStatus;

/// Plain-text table of collection stats, one row per collection
fn render_table(collections: &[Value], columns: &[&str]) -> String {
    let mut header = vec!["#".to_string(), "name".to_string(), "version".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));

    let mut rows = vec![header];
    for (index, collection) in collections.iter().enumerate() {
        let text = |v: Option<&Value>| match v {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let mut row = vec![
            (index + 1).to_string(),
            text(collection.get("name")),
            text(collection.get("version")),
        ];
        for column in columns {
            let count = collection
                .get("stats")
                .and_then(|stats| stats.get(*column))
                .cloned()
                .unwrap_or(Value::from(0));
            row.push(text(Some(&count)));
        }
        rows.push(row);
    }

    let widths: Vec<usize> = (0..rows[0].len())
        .map(|i| rows.iter().map(|row| row[i].len()).max().unwrap_or(0))
        .collect();
    let separator = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!(" {:<width$} ", cell, width = width))
            .collect::<Vec<_>>()
            .join("|");
        out.push_str(line.trim_end());
        out.push('\n');
        if i == 0 {
            out.push_str(&separator);
            out.push('\n');
        }
    }
    out
}

impl GetStatus {
    async fn execute(
        &self,
        ctx: &PluginContext,
        args: GetStatusArgs,
    ) -> Result<Value, CumulusError> {
        let mut query = Query::new().with("includeStats", "true");
        for (key, value) in filters(&args.filter)?.iter() {
            query.set(key, value);
        }
        query.set("fields", "name,version,stats");

        let response = ctx.client.list_collections(query).await?;
        let results = response
            .json()
            .and_then(|body| body.get("results"))
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                tracing::error!("Collection listing returned no results: {:?}", response.body);
                CumulusError::Plugin(format!(
                    "Collection listing failed with HTTP {}: {}",
                    response.status,
                    response.clone().into_json()
                ))
            })?;

        if args.output_format == OutputFormat::Json {
            return Ok(Value::Array(results));
        }

        let columns: Vec<&str> = if args.fields.is_empty() {
            STAT_COLUMNS.to_vec()
        } else {
            STAT_COLUMNS
                .iter()
                .copied()
                .filter(|c| args.fields.iter().any(|f| f.trim() == *c))
                .collect()
        };
        Ok(Value::String(render_table(&results, &columns)))
    }
}

impl Plugin for GetStatus {
    fn name(&self) -> &'static str {
        "get_status"
    }

    fn description(&self) -> &'static str {
        "Show granule status counts for each collection"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>> {
        Box::pin(async move {
            let args: GetStatusArgs = parse_args(self.name(), argv)?;
            self.execute(ctx, args).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_table() {
        let collections = vec![
            json!({
                "name": "nalmaraw",
                "version": "1",
                "stats": {"completed": 12, "failed": 1, "total": 13}
            }),
            json!({"name": "goesimpacts", "version": "1", "stats": {}}),
        ];
        let table = render_table(&collections, &["completed", "failed"]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("name"));
        assert!(lines[0].contains("completed"));
        assert!(!lines[0].contains("queued"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].contains("nalmaraw"));
        assert!(lines[2].contains("12"));
        assert!(lines[3].contains("goesimpacts"));
        assert!(lines[3].ends_with('0'));
    }

    #[test]
    fn test_args() {
        let args = GetStatusArgs::try_parse_from([
            "get_status",
            "--filter",
            "name=nalmaraw",
            "--fields",
            "completed,failed",
            "-o",
            "json",
        ])
        .unwrap();
        assert_eq!(args.filter, vec!["name=nalmaraw"]);
        assert_eq!(args.fields, vec!["completed", "failed"]);
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}
