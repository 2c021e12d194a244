//! JSON-RPC implementation of [`ChainClient`].

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::chain::{ChainClient, ChainError, Confirmations, Receipt};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between polling attempts when waiting for confirmations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Number of attempts for requests that never reached the node.
const MAX_CONNECT_RETRIES: usize = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Requests that fail to connect are retried with exponential backoff. Anything
/// that may have reached the node is not retried, so a transaction is never
/// submitted twice.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });

    let response = (|| async { client.post(url.clone()).json(&body).send().await })
        .retry(ExponentialBuilder::default().with_max_times(MAX_CONNECT_RETRIES))
        .when(|e: &reqwest::Error| e.is_connect())
        .notify(|e: &reqwest::Error, backoff: Duration| {
            tracing::debug!(error = %e, ?backoff, method, "RPC connection failed, retrying...");
        })
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error in {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// The fields of `eth_getTransactionReceipt` the client reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    status: u64,
    #[serde(default)]
    contract_address: Option<Address>,
}

/// Decode a receipt returned by the node. A receipt that does not decode will
/// not decode on the next poll either.
fn parse_receipt(tx_hash: B256, value: Value) -> anyhow::Result<TransactionReceipt> {
    serde_json::from_value(value).with_context(|| format!("Malformed receipt for {}", tx_hash))
}

/// [`ChainClient`] talking to a node over HTTP JSON-RPC.
///
/// Transactions are sent with `eth_sendTransaction` from the node-managed
/// account, so no key material ever passes through this process.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    network: String,
    signer: Address,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Connect to `url` and use the node's first account as signer.
    pub async fn connect(
        network: impl Into<String>,
        url: Url,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let network = network.into();
        let client = create_client()?;

        let accounts: Vec<Address> = json_rpc_call(&client, &url, "eth_accounts", vec![])
            .await
            .with_context(|| format!("Failed to list accounts on {}", network))?;
        let signer = *accounts
            .first()
            .with_context(|| format!("Node for {} exposes no signer account", network))?;

        tracing::info!(%network, %signer, "Connected to chain");

        Ok(Self {
            client,
            url,
            network,
            signer,
            poll_interval,
        })
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let block: String =
            json_rpc_call(&self.client, &self.url, "eth_blockNumber", vec![]).await?;
        u64::from_str_radix(block.trim_start_matches("0x"), 16)
            .with_context(|| format!("Invalid block number: {}", block))
    }

    async fn receipt(&self, tx_hash: B256) -> anyhow::Result<Option<Value>> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await
    }

    async fn poll_confirmations(&self, tx_hash: B256, depth: u64) -> anyhow::Result<Receipt> {
        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(value)) => {
                    let receipt = parse_receipt(tx_hash, value)?;
                    if receipt.status == 0 {
                        return Err(ChainError::Reverted {
                            tx_hash: receipt.transaction_hash,
                        }
                        .into());
                    }

                    let head = self.block_number().await.unwrap_or(receipt.block_number);
                    let confirmations = head.saturating_sub(receipt.block_number) + 1;
                    if confirmations >= depth {
                        return Ok(Receipt {
                            tx_hash: receipt.transaction_hash,
                            block_number: receipt.block_number,
                            contract_address: receipt.contract_address,
                        });
                    }
                    tracing::trace!(%tx_hash, confirmations, depth, "Waiting for confirmations...");
                }
                Ok(None) => {
                    tracing::trace!(%tx_hash, "Transaction not mined yet");
                }
                Err(e) => {
                    tracing::warn!(error = %e, %tx_hash, "Receipt query failed, retrying...");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl ChainClient for RpcChainClient {
    fn network(&self) -> &str {
        &self.network
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn deploy_contract(&self, bytecode: Bytes) -> anyhow::Result<B256> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": self.signer,
                "data": bytecode,
            })],
        )
        .await
        .context("Failed to send contract creation")
    }

    async fn send_transaction(&self, to: Address, calldata: Bytes) -> anyhow::Result<B256> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": self.signer,
                "to": to,
                "data": calldata,
            })],
        )
        .await
        .with_context(|| format!("Failed to send transaction to {}", to))
    }

    async fn call(&self, to: Address, calldata: Bytes) -> anyhow::Result<Bytes> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": calldata }),
                serde_json::json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("Failed to call {}", to))
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: B256,
        confirmations: Confirmations,
    ) -> anyhow::Result<Receipt> {
        tokio::time::timeout(
            confirmations.timeout,
            self.poll_confirmations(tx_hash, confirmations.depth),
        )
        .await
        .map_err(|_| ChainError::ConfirmationTimeout {
            tx_hash,
            confirmations: confirmations.depth,
            timeout: confirmations.timeout,
        })?
    }
}
