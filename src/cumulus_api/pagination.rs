//! Cursor-based pagination over Cumulus list endpoints

use crate::cumulus_api::client::CumulusClient;
use crate::cumulus_api::resources::{Query, Verb};
use crate::cumulus_api::types::{ApiResponse, CumulusError, ListMeta};
use serde_json::Value;

/// Default number of records [`CumulusClient::collect`] gathers
pub const DEFAULT_COLLECT_LIMIT: usize = 10;

/// Result of [`CumulusClient::collect`]
///
/// Endpoints that do not paginate (single-record gets, bare objects, error
/// envelopes) come back unchanged as `Passthrough`.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    Records(Vec<Value>),
    Passthrough(ApiResponse),
}

impl Collected {
    /// JSON view: an array of records, or the passthrough body
    pub fn into_json(self) -> Value {
        match self {
            Collected::Records(records) => Value::Array(records),
            Collected::Passthrough(response) => response.into_json(),
        }
    }

    pub fn records(&self) -> Option<&[Value]> {
        match self {
            Collected::Records(records) => Some(records),
            Collected::Passthrough(_) => None,
        }
    }
}

fn page_parts(response: &ApiResponse) -> Option<(Vec<Value>, ListMeta)> {
    let body = response.json()?;
    let results = body.get("results")?.as_array()?.clone();
    let meta = body
        .get("meta")
        .and_then(|meta| serde_json::from_value::<ListMeta>(meta.clone()).ok())
        .unwrap_or_default();
    Some((results, meta))
}

impl CumulusClient {
    /// Walk a list endpoint until `limit` records or the server-reported
    /// total are reached
    ///
    /// Each response's `meta.searchContext` is sent back as the
    /// `searchContext` query parameter of the next request. A first response
    /// without a cursor is returned as-is. The `limit` bound is checked before
    /// `meta.count`, and the records are truncated to `limit`.
    pub async fn collect(
        &self,
        resource_path: &str,
        filters: &Query,
        limit: usize,
    ) -> Result<Collected, CumulusError> {
        let mut query = filters.clone();
        if query.get("limit").is_none() {
            query.set("limit", limit);
        }

        let mut records: Vec<Value> = Vec::new();
        let mut pages = 0usize;

        loop {
            let response = self.send_list(resource_path, &query).await?;
            pages += 1;

            let cursor = response
                .json()
                .and_then(|body| body.get("meta"))
                .and_then(|meta| meta.get("searchContext"))
                .and_then(Value::as_str)
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_string);

            let Some(cursor) = cursor else {
                if pages == 1 {
                    tracing::debug!(
                        "{} is not paginated; returning response unchanged",
                        resource_path
                    );
                    return Ok(Collected::Passthrough(response));
                }
                if let Some((results, _)) = page_parts(&response) {
                    records.extend(results);
                }
                break;
            };

            let Some((results, meta)) = page_parts(&response) else {
                break;
            };
            if results.is_empty() {
                break;
            }
            records.extend(results);

            let total = meta.count.map(|count| count as usize);
            tracing::debug!(
                "Collected {} of {} records from {} (page {})",
                records.len(),
                total.map_or_else(|| "?".to_string(), |t| t.to_string()),
                resource_path,
                pages
            );

            if records.len() >= limit || total.map_or(false, |total| records.len() >= total) {
                break;
            }
            query.set("searchContext", cursor);
        }

        records.truncate(limit);
        tracing::info!(
            "Collected {} records from {} in {} pages",
            records.len(),
            resource_path,
            pages
        );
        Ok(Collected::Records(records))
    }

    async fn send_list(
        &self,
        resource_path: &str,
        query: &Query,
    ) -> Result<ApiResponse, CumulusError> {
        self.invoke(resource_path, Verb::Get.as_str(), None, query).await
    }
}
