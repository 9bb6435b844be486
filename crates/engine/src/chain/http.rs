//! JSON-RPC chain client.
//!
//! Talks to a node that manages its own signer list (`eth_accounts` +
//! `eth_sendTransaction`), which keeps key custody entirely outside the
//! engine. Transient transport failures are retried with bounded exponential
//! backoff; RPC-level errors (reverts, bad requests) are final.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use super::{ChainClient, Deployed, RawLog, TxReceipt};
use crate::error::ChainError;

/// Timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Interval between receipt polling attempts.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Overall confirmation timeout per transaction.
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// [`ChainClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    client: reqwest::Client,
    url: Url,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl HttpChainClient {
    pub fn new(url: Url) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the confirmation timeout.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ChainError> {
        let request = || async {
            self.client
                .post(self.url.clone())
                .json(&json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": &params,
                    "id": 1
                }))
                .send()
                .await?
                .json::<Value>()
                .await
        };

        // Retry transport failures only; an error *response* is final.
        let response: Value = request
            .retry(ExponentialBuilder::default())
            .notify(|err, delay| {
                tracing::trace!(error = %err, ?delay, method, "RPC transport error, retrying...");
            })
            .await
            .map_err(ChainError::Transport)?;

        if let Some(error) = response.get("error") {
            return Err(ChainError::Rpc(format!(
                "{} failed: {}",
                method,
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            )));
        }

        let result = response
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("{method}: no result in response")))?;
        serde_json::from_value(result)
            .map_err(|e| ChainError::Rpc(format!("{method}: malformed result: {e}")))
    }

    /// Poll until the transaction is mined, enforcing the confirmation timeout.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ConfirmedReceipt, ChainError> {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > self.confirmation_timeout {
                return Err(ChainError::ConfirmationTimeout { tx_hash });
            }

            let receipt: Option<RpcReceipt> = self
                .rpc_call("eth_getTransactionReceipt", vec![json!(tx_hash)])
                .await?;

            match receipt {
                Some(receipt) => return receipt.into_receipt(tx_hash),
                None => {
                    tracing::trace!(%tx_hash, "Transaction not yet confirmed, polling...");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

impl ChainClient for HttpChainClient {
    async fn account(&self, index: u32) -> Result<Address, ChainError> {
        let accounts: Vec<Address> = self.rpc_call("eth_accounts", vec![]).await?;
        accounts
            .get(index as usize)
            .copied()
            .ok_or(ChainError::MissingAccount {
                index,
                available: accounts.len(),
            })
    }

    async fn deploy(&self, bytecode: Bytes, from: Address) -> Result<Deployed, ChainError> {
        let tx_hash: B256 = self
            .rpc_call(
                "eth_sendTransaction",
                vec![json!({ "from": from, "data": bytecode })],
            )
            .await?;
        tracing::debug!(%tx_hash, %from, "Deployment transaction submitted");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            ChainError::Rpc(format!("receipt for {tx_hash} carries no contract address"))
        })?;

        Ok(Deployed {
            address,
            receipt: receipt.into(),
        })
    }

    async fn send(&self, to: Address, calldata: Bytes, from: Address) -> Result<TxReceipt, ChainError> {
        let tx_hash: B256 = self
            .rpc_call(
                "eth_sendTransaction",
                vec![json!({ "from": from, "to": to, "data": calldata })],
            )
            .await?;
        tracing::debug!(%tx_hash, %to, %from, "Call transaction submitted");

        Ok(self.wait_for_receipt(tx_hash).await?.into())
    }

    async fn transaction_logs(&self, tx_hash: B256) -> Result<Vec<RawLog>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .rpc_call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        let receipt = receipt
            .ok_or_else(|| ChainError::Rpc(format!("no receipt found for {tx_hash}")))?;
        Ok(receipt.into_receipt(tx_hash)?.logs)
    }
}

/// Receipt as returned by `eth_getTransactionReceipt`, reduced to the fields
/// the engine consumes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

impl RpcReceipt {
    /// A mined-but-reverted transaction is a hard failure.
    fn into_receipt(self, tx_hash: B256) -> Result<ConfirmedReceipt, ChainError> {
        if self.status.as_deref() == Some("0x0") {
            return Err(ChainError::Reverted { tx_hash });
        }
        Ok(ConfirmedReceipt {
            tx_hash,
            contract_address: self.contract_address,
            block_number: self.block_number,
            logs: self.logs,
        })
    }
}

#[derive(Debug)]
struct ConfirmedReceipt {
    tx_hash: B256,
    contract_address: Option<Address>,
    block_number: u64,
    logs: Vec<RawLog>,
}

impl From<ConfirmedReceipt> for TxReceipt {
    fn from(receipt: ConfirmedReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            logs: receipt.logs,
        }
    }
}

/// Deserialize a u64 from a hex quantity string (0x-prefixed).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}
