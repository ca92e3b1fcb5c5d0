//! Run enumeration over the Datastore REST `runQuery` endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use gridload_core::config::{DatastoreConfig, GcpConfig};
use gridload_core::RunDescriptor;

use crate::credentials::Credentials;
use crate::error::StorageError;
use crate::run_source::RunSource;

pub struct DatastoreRunSource {
    client: Client,
    url: String,
    kind: String,
    order_property: String,
    credentials: Credentials,
}

impl DatastoreRunSource {
    pub fn new(
        gcp: &GcpConfig,
        datastore: &DatastoreConfig,
        credentials: Credentials,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            client: Client::builder().timeout(gcp.request_timeout).build()?,
            url: format!(
                "{}/v1/projects/{}:runQuery",
                datastore.endpoint.trim_end_matches('/'),
                gcp.project_id
            ),
            kind: datastore.run_kind.clone(),
            order_property: datastore.order_property.clone(),
            credentials,
        })
    }

    fn query_body(&self, cursor: Option<&str>) -> serde_json::Value {
        let mut query = json!({
            "kind": [{ "name": self.kind }],
            "order": [{
                "property": { "name": self.order_property },
                "direction": "ASCENDING",
            }],
        });
        if let Some(c) = cursor {
            query["startCursor"] = json!(c);
        }
        json!({ "query": query })
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<QueryResultBatch, StorageError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.credentials.bearer())
            .json(&self.query_body(cursor))
            .send()
            .await?;
        let response = crate::check_status(response).await?;
        let parsed: RunQueryResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(format!("runQuery response: {e}")))?;
        Ok(parsed.batch)
    }
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RunQueryResponse {
    batch: QueryResultBatch,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct QueryResultBatch {
    #[serde(default)]
    entity_results: Vec<EntityResult>,
    end_cursor: Option<String>,
    #[serde(default)]
    more_results: String,
}

#[derive(Deserialize)]
struct EntityResult {
    entity: Entity,
}

#[derive(Deserialize)]
struct Entity {
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Value {
    string_value: Option<String>,
    timestamp_value: Option<DateTime<Utc>>,
}

fn string_prop(entity: &Entity, name: &str) -> String {
    entity
        .properties
        .get(name)
        .and_then(|v| v.string_value.clone())
        .unwrap_or_default()
}

fn to_run(entity: &Entity) -> Result<RunDescriptor, StorageError> {
    let created_at = entity
        .properties
        .get("CreatedAt")
        .and_then(|v| v.timestamp_value)
        .ok_or_else(|| StorageError::Decode("run entity has no CreatedAt timestamp".into()))?;
    Ok(RunDescriptor {
        browser_name: string_prop(entity, "BrowserName"),
        browser_version: string_prop(entity, "BrowserVersion"),
        os_name: string_prop(entity, "OSName"),
        os_version: string_prop(entity, "OSVersion"),
        full_revision_hash: string_prop(entity, "FullRevisionHash"),
        created_at,
        raw_results_url: string_prop(entity, "RawResultsURL"),
    })
}

#[async_trait]
impl RunSource for DatastoreRunSource {
    async fn fetch_all(&self) -> Result<Vec<RunDescriptor>, StorageError> {
        let mut runs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let batch = self.fetch_page(cursor.as_deref()).await?;
            for result in &batch.entity_results {
                runs.push(to_run(&result.entity)?);
            }
            debug!(page = batch.entity_results.len(), total = runs.len(), "run query page");

            if batch.more_results != "NOT_FINISHED" {
                break;
            }
            match batch.end_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => {
                    return Err(StorageError::Decode(
                        "runQuery reported NOT_FINISHED without advancing its cursor".into(),
                    ))
                }
            }
        }
        info!(kind = %self.kind, runs = runs.len(), "enumerated runs");
        Ok(runs)
    }
}
