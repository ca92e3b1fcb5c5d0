//! Bigtable REST client for `mutateRows`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use gridload_core::config::{BigtableConfig, GcpConfig};

use crate::credentials::Credentials;
use crate::error::StorageError;
use crate::store::{ColumnStore, RowMutation, RowWriteError};

/// Output table client. Cheap to share behind an `Arc`; reqwest pools
/// connections internally so concurrent `apply_bulk` calls need no locking.
pub struct BigtableStore {
    client: Client,
    endpoint: String,
    table_name: String,
    credentials: Credentials,
}

impl BigtableStore {
    pub fn new(
        gcp: &GcpConfig,
        bigtable: &BigtableConfig,
        credentials: Credentials,
    ) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(gcp.request_timeout).build()?;
        let table_name = format!(
            "projects/{}/instances/{}/tables/{}",
            gcp.project_id, bigtable.instance_id, bigtable.table_id
        );
        info!(table = %table_name, endpoint = %bigtable.endpoint, "Bigtable client ready");
        Ok(Self {
            client,
            endpoint: bigtable.endpoint.trim_end_matches('/').to_string(),
            table_name,
            credentials,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MutateRowsRequest {
    entries: Vec<Entry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    row_key: String,
    mutations: Vec<Mutation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Mutation {
    set_cell: SetCellBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetCellBody {
    family_name: String,
    column_qualifier: String,
    /// int64 travels as a decimal string in proto3 JSON.
    timestamp_micros: String,
    value: String,
}

/// Server-streaming responses arrive as a JSON array over REST; some
/// proxies unwrap single-message streams.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseStream {
    Many(Vec<MutateRowsResponse>),
    One(MutateRowsResponse),
}

#[derive(Deserialize, Default)]
struct MutateRowsResponse {
    #[serde(default)]
    entries: Vec<ResponseEntry>,
}

#[derive(Deserialize)]
struct ResponseEntry {
    #[serde(default, deserialize_with = "int64_json")]
    index: u64,
    #[serde(default)]
    status: Status,
}

#[derive(Deserialize, Default)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn int64_json<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Num(u64),
        Str(String),
    }
    match Int64::deserialize(d)? {
        Int64::Num(n) => Ok(n),
        Int64::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn encode_request(mutations: &[RowMutation]) -> MutateRowsRequest {
    MutateRowsRequest {
        entries: mutations
            .iter()
            .map(|m| Entry {
                row_key: B64.encode(m.row_key.as_bytes()),
                mutations: m
                    .cells
                    .iter()
                    .map(|c| Mutation {
                        set_cell: SetCellBody {
                            family_name: c.family.clone(),
                            column_qualifier: B64.encode(c.column.as_bytes()),
                            timestamp_micros: c.timestamp.micros().to_string(),
                            value: B64.encode(&c.value),
                        },
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn row_errors(stream: ResponseStream, mutations: &[RowMutation]) -> Vec<RowWriteError> {
    let responses = match stream {
        ResponseStream::Many(v) => v,
        ResponseStream::One(r) => vec![r],
    };
    responses
        .into_iter()
        .flat_map(|r| r.entries)
        .filter(|e| e.status.code != 0)
        .map(|e| {
            let index = e.index as usize;
            RowWriteError {
                index,
                row_key: mutations
                    .get(index)
                    .map(|m| m.row_key.clone())
                    .unwrap_or_default(),
                code: e.status.code,
                message: e.status.message,
            }
        })
        .collect()
}

#[async_trait]
impl ColumnStore for BigtableStore {
    async fn apply_bulk(&self, mutations: &[RowMutation]) -> Result<Vec<RowWriteError>, StorageError> {
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v2/{}:mutateRows", self.endpoint, self.table_name);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.credentials.bearer())
            .json(&encode_request(mutations))
            .send()
            .await?;
        let response = crate::check_status(response).await?;
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let stream: ResponseStream = serde_json::from_slice(&body)
            .map_err(|e| StorageError::Decode(format!("mutateRows response: {e}")))?;
        Ok(row_errors(stream, mutations))
    }
}
