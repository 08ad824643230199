//! Chain RPC client.
//!
//! `ChainRpc` is the seam the scanner depends on; the production
//! implementation speaks raw JSON-RPC 2.0 over HTTP with serde_json rather
//! than a full provider SDK, keeping the dependency surface small. Tests
//! substitute an in-memory fake.

use std::time::Duration;

use serde::Deserialize;

use guildnet_core::constants::OPERATION_TIMEOUT_SECS;
use guildnet_core::error::GuildError;
use guildnet_core::types::{Address, BlockNumber, TxHash};

/// One undecoded log entry as returned by `eth_getLogs`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: BlockNumber,
    pub tx_hash: TxHash,
    pub log_index: u64,
}

/// The chain surface the indexer consumes.
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<BlockNumber, GuildError>;

    /// Logs emitted by `address` in `[from, to]` (inclusive).
    async fn get_logs(
        &self,
        address: &Address,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<RawLog>, GuildError>;

    /// Calldata of a transaction, for arguments events omit.
    async fn transaction_input(&self, tx_hash: &TxHash) -> Result<Option<Vec<u8>>, GuildError>;
}

/// JSON-RPC 2.0 client over HTTP.
pub struct HttpChainClient {
    url: String,
    client: reqwest::Client,
}

impl HttpChainClient {
    pub fn new(url: &str) -> Result<Self, GuildError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(OPERATION_TIMEOUT_SECS))
            .build()
            .map_err(|e| GuildError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, GuildError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GuildError::UpstreamUnavailable(format!("{method}: {e}")))?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GuildError::UpstreamUnavailable(format!("{method}: {e}")))?;

        if let Some(err) = json.get("error") {
            return Err(GuildError::UpstreamUnavailable(format!("{method}: {err}")));
        }
        Ok(json["result"].clone())
    }
}

fn parse_hex_u64(value: &serde_json::Value, field: &str) -> Result<u64, GuildError> {
    let s = value
        .as_str()
        .ok_or_else(|| GuildError::UpstreamUnavailable(format!("{field}: not a string")))?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16)
        .map_err(|e| GuildError::UpstreamUnavailable(format!("{field}: {e}")))
}

fn parse_hex_bytes(value: &serde_json::Value, field: &str) -> Result<Vec<u8>, GuildError> {
    let s = value
        .as_str()
        .ok_or_else(|| GuildError::UpstreamUnavailable(format!("{field}: not a string")))?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| GuildError::UpstreamUnavailable(format!("{field}: {e}")))
}

#[derive(Deserialize)]
struct LogEntry {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: serde_json::Value,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "logIndex")]
    log_index: serde_json::Value,
}

#[async_trait::async_trait]
impl ChainRpc for HttpChainClient {
    async fn block_number(&self) -> Result<BlockNumber, GuildError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_hex_u64(&result, "blockNumber")
    }

    async fn get_logs(
        &self,
        address: &Address,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<RawLog>, GuildError> {
        let result = self
            .call(
                "eth_getLogs",
                serde_json::json!([{
                    "address": address.to_hex(),
                    "fromBlock": format!("0x{from:x}"),
                    "toBlock": format!("0x{to:x}"),
                }]),
            )
            .await?;

        let entries: Vec<LogEntry> = serde_json::from_value(result)
            .map_err(|e| GuildError::UpstreamUnavailable(format!("eth_getLogs: {e}")))?;

        let mut logs = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut topics = Vec::with_capacity(entry.topics.len());
            for topic in &entry.topics {
                let bytes = hex::decode(topic.strip_prefix("0x").unwrap_or(topic))
                    .map_err(|e| GuildError::UpstreamUnavailable(format!("topic: {e}")))?;
                if bytes.len() != 32 {
                    return Err(GuildError::UpstreamUnavailable("topic: bad length".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                topics.push(arr);
            }
            logs.push(RawLog {
                address: Address::from_hex(&entry.address)
                    .map_err(|e| GuildError::UpstreamUnavailable(format!("address: {e}")))?,
                topics,
                data: parse_hex_bytes(&serde_json::Value::String(entry.data), "data")?,
                block_number: parse_hex_u64(&entry.block_number, "blockNumber")?,
                tx_hash: TxHash::from_hex(&entry.transaction_hash)
                    .map_err(|e| GuildError::UpstreamUnavailable(format!("txHash: {e}")))?,
                log_index: parse_hex_u64(&entry.log_index, "logIndex")?,
            });
        }
        // Providers return logs ordered, but the cursor logic depends on it.
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(logs)
    }

    async fn transaction_input(&self, tx_hash: &TxHash) -> Result<Option<Vec<u8>>, GuildError> {
        let result = self
            .call(
                "eth_getTransactionByHash",
                serde_json::json!([tx_hash.to_hex()]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(parse_hex_bytes(&result["input"], "input")?))
    }
}
