use crate::cumulus_api::types::CumulusError;
use crate::plugins::{parse_args, Plugin, PluginContext};
use crate::storage::BoxFuture;
use clap::Parser;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Columns whose cells hold JSON objects rather than strings
const OBJECT_COLUMNS: [&str; 2] = ["files", "meta"];

const SAVED_MARKER: &str = "Record saved";

#[derive(Debug, Parser)]
#[command(name = "bulk_create_collections")]
struct BulkCreateArgs {
    /// CSV file with one collection per row
    path: String,
}

/// Create every collection described in a CSV file
pub struct BulkCreateCollections;

/// Read collection rows from a CSV file
///
/// `files` and `meta` cells are parsed as JSON; single quotes are accepted in
/// place of double quotes.
pub fn read_collections(path: &Path) -> Result<Vec<Value>, CumulusError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        tracing::error!("Failed to open {:?}: {}", path, e);
        CumulusError::Plugin(format!("Failed to open {:?}: {}", path, e))
    })?;

    let mut collections = Vec::new();
    for row in reader.deserialize::<HashMap<String, String>>() {
        let row = row.map_err(|e| {
            CumulusError::Plugin(format!("Invalid CSV row in {:?}: {}", path, e))
        })?;
        let mut collection = Map::new();
        for (key, cell) in row {
            let value = if OBJECT_COLUMNS.contains(&key.as_str()) {
                serde_json::from_str(&cell.replace('\'', "\"")).map_err(|e| {
                    CumulusError::Plugin(format!("Column '{}' is not valid JSON: {}", key, e))
                })?
            } else {
                Value::String(cell)
            };
            collection.insert(key, value);
        }
        collections.push(Value::Object(collection));
    }
    Ok(collections)
}

fn failure(collection: &Value, mut detail: Value) -> Value {
    if !detail.is_object() {
        detail = json!({ "message": detail });
    }
    if let Some(map) = detail.as_object_mut() {
        for field in ["name", "version"] {
            map.insert(field.to_string(), collection.get(field).cloned().unwrap_or(Value::Null));
        }
    }
    detail
}

impl BulkCreateCollections {
    async fn execute(
        &self,
        ctx: &PluginContext,
        args: BulkCreateArgs,
    ) -> Result<Value, CumulusError> {
        let collections = read_collections(&ctx.resolve(&args.path))?;
        tracing::info!("Creating {} collections", collections.len());

        let outcomes = ctx
            .client
            .apply_concurrently(
                |client, collection: Value| async move {
                    client.create_collection(collection).await
                },
                collections,
            )
            .await;

        let mut saved = 0usize;
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(response) => {
                    let message = response
                        .json()
                        .and_then(|body| body.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if message.contains(SAVED_MARKER) {
                        saved += 1;
                    } else {
                        errors.push(failure(&outcome.record, response.into_json()));
                    }
                }
                Err(e) => errors.push(failure(&outcome.record, json!({ "error": e.to_string() }))),
            }
        }

        tracing::info!("{} records successfully saved", saved);
        if !errors.is_empty() {
            tracing::warn!("{} collections could not be created", errors.len());
        }
        Ok(json!({ "saved": saved, "errors": errors }))
    }
}

impl Plugin for BulkCreateCollections {
    fn name(&self) -> &'static str {
        "bulk_create_collections"
    }

    fn description(&self) -> &'static str {
        "Create collections in bulk from a CSV file"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PluginContext,
        argv: &'a [String],
    ) -> BoxFuture<'a, Result<Value, CumulusError>> {
        Box::pin(async move {
            let args: BulkCreateArgs = parse_args(self.name(), argv)?;
            self.execute(ctx, args).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_collections_parses_object_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "name,version,meta,files").unwrap();
        writeln!(
            file,
            "goesimpacts,1,\"{{'hyrax_processing': 'false'}}\",\"[{{'bucket': 'public', 'regex': '.*'}}]\""
        )
        .unwrap();

        let collections = read_collections(file.path()).unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0]["name"], "goesimpacts");
        assert_eq!(collections[0]["version"], "1");
        assert_eq!(collections[0]["meta"]["hyrax_processing"], "false");
        assert_eq!(collections[0]["files"][0]["bucket"], "public");
    }

    #[test]
    fn test_read_collections_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "name,version,meta").unwrap();
        writeln!(file, "x,1,not-json").unwrap();
        assert!(matches!(
            read_collections(file.path()),
            Err(CumulusError::Plugin(_))
        ));
    }

    #[test]
    fn test_failure_carries_name_and_version() {
        let detail = failure(
            &json!({"name": "x", "version": "2"}),
            json!({"error": "Conflict", "message": "already exists"}),
        );
        assert_eq!(detail["name"], "x");
        assert_eq!(detail["version"], "2");
        assert_eq!(detail["error"], "Conflict");
    }
}
