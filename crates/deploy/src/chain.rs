//! Boundary between the provisioning engine and a live chain.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;

/// On-chain outcomes the engine needs to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The transaction was mined but reverted. Not retried automatically.
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    /// The transaction did not reach the requested depth in time. The next
    /// invocation retries the step.
    #[error(
        "transaction {tx_hash} did not reach {confirmations} confirmations within {}s",
        .timeout.as_secs()
    )]
    ConfirmationTimeout {
        tx_hash: B256,
        confirmations: u64,
        timeout: Duration,
    },
}

impl ChainError {
    /// Whether an error anywhere in the chain of `err` is a revert.
    pub fn is_revert(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<ChainError>(),
                Some(ChainError::Reverted { .. })
            )
        })
    }
}

/// A mined, sufficiently confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// Set for plain contract creations.
    pub contract_address: Option<Address>,
}

/// How deep a transaction must be buried before a step counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmations {
    pub depth: u64,
    pub timeout: Duration,
}

impl Confirmations {
    pub fn new(depth: u64, timeout: Duration) -> Self {
        Self { depth, timeout }
    }
}

/// Connection to one chain, acting as one signer account.
///
/// Every provisioning and linking call receives its client explicitly; there is
/// no notion of a globally active network.
pub trait ChainClient: Send + Sync {
    /// Name of the network this client is connected to.
    fn network(&self) -> &str;

    /// The account transactions are sent from.
    fn signer(&self) -> Address;

    /// Submit a plain contract creation and return its transaction hash.
    fn deploy_contract(&self, bytecode: Bytes) -> impl Future<Output = Result<B256>> + Send;

    /// Submit a transaction calling `to` and return its transaction hash.
    fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// Execute a read-only call against the latest state.
    fn call(&self, to: Address, calldata: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Wait until `tx_hash` is mined with at least `confirmations.depth` blocks on
    /// top of it.
    ///
    /// Fails with [`ChainError::Reverted`] if the transaction reverted and with
    /// [`ChainError::ConfirmationTimeout`] if the depth is not reached in time.
    fn wait_for_confirmations(
        &self,
        tx_hash: B256,
        confirmations: Confirmations,
    ) -> impl Future<Output = Result<Receipt>> + Send;
}
