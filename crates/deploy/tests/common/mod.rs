//! Shared test infrastructure: an in-process chain double and fixtures.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::{SolCall, SolValue},
};
use anyhow::Result;
use nexus_deploy::{
    ChainClient, ChainConnector, ChainEntry, ChainError, ChainParameters, Confirmations,
    ModuleArtifact, ModuleArtifacts, ModuleDeployer, Network, NexusConfig, Receipt, RecordStore,
    contracts::{IDeployer, IModuleCatalog, IRoutingGateway, IVaultController},
};
use tempdir::TempDir;

/// A transaction as seen by the mock chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockTx {
    CreateDeployer,
    Deploy {
        factory: Address,
        bytecode_hash: B256,
        args: Bytes,
    },
    ApproveGateway {
        controller: Address,
        gateway: Address,
    },
    AddOffering {
        catalog: Address,
        module: Address,
        fee_token: Address,
        fee_amount: U256,
    },
    Initialize {
        gateway: Address,
        routes: Vec<(u64, String, Address)>,
    },
}

/// How an injected failure shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Revert,
}

type TxMatcher = Box<dyn Fn(&MockTx) -> bool + Send>;

struct PendingTx {
    tx: MockTx,
    outcome: Result<Option<Address>, Failure>,
    block_number: u64,
}

#[derive(Default)]
struct MockState {
    block_number: u64,
    nonce: u64,
    pending: HashMap<B256, PendingTx>,
    /// Every submitted transaction, in order, including failed ones.
    submitted: Vec<MockTx>,
    /// Transactions that took effect on chain.
    applied: Vec<MockTx>,
    deployed: HashSet<(Address, B256)>,
    initialized_gateways: HashSet<Address>,
    /// Confirmation depth requested for each awaited transaction, in order.
    waits: Vec<(MockTx, u64)>,
    reads: usize,
    injected: Vec<(TxMatcher, Failure)>,
    failing_reads: usize,
}

/// Address of the `nonce`-th contract created by `creator` on the mock chain.
pub fn created_by(creator: Address, nonce: u64) -> Address {
    creator.create2(B256::from(U256::from(nonce).to_be_bytes::<32>()), B256::ZERO)
}

/// In-process [`ChainClient`] recording every transaction it receives.
#[derive(Clone)]
pub struct MockChain {
    network: String,
    signer: Address,
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    pub fn new(network: impl Into<String>) -> Self {
        let network = network.into();
        Self {
            signer: Address::from_word(keccak256(network.as_bytes())),
            network,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Make the next transaction matching `matcher` fail once.
    pub fn fail_once(&self, failure: Failure, matcher: impl Fn(&MockTx) -> bool + Send + 'static) {
        self.state
            .lock()
            .unwrap()
            .injected
            .push((Box::new(matcher), failure));
    }

    /// Make the next `count` read calls fail.
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().unwrap().failing_reads = count;
    }

    pub fn signer_address(&self) -> Address {
        self.signer
    }

    pub fn submitted(&self) -> Vec<MockTx> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn applied(&self) -> Vec<MockTx> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn waits(&self) -> Vec<(MockTx, u64)> {
        self.state.lock().unwrap().waits.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn deploys_of(&self, bytecode_hash: B256) -> usize {
        self.submitted()
            .iter()
            .filter(|tx| matches!(tx, MockTx::Deploy { bytecode_hash: hash, .. } if *hash == bytecode_hash))
            .count()
    }

    /// The vault-module a controller creates.
    pub fn vault_module_of(controller: Address) -> Address {
        created_by(controller, 1)
    }

    fn decode(to: Address, calldata: &[u8]) -> MockTx {
        let selector = &calldata[..4];

        if selector == IDeployer::deployContractCall::SELECTOR {
            let call = IDeployer::deployContractCall::abi_decode(calldata, true).unwrap();
            MockTx::Deploy {
                factory: to,
                bytecode_hash: keccak256(&call.bytecode),
                args: call.args,
            }
        } else if selector == IVaultController::addApprovedGatewayCall::SELECTOR {
            let call = IVaultController::addApprovedGatewayCall::abi_decode(calldata, true).unwrap();
            MockTx::ApproveGateway {
                controller: to,
                gateway: call.gateway,
            }
        } else if selector == IModuleCatalog::addOfferingCall::SELECTOR {
            let call = IModuleCatalog::addOfferingCall::abi_decode(calldata, true).unwrap();
            MockTx::AddOffering {
                catalog: to,
                module: call.facet,
                fee_token: call.feeToken,
                fee_amount: call.feeAmount,
            }
        } else if selector == IRoutingGateway::initializeCall::SELECTOR {
            let call = IRoutingGateway::initializeCall::abi_decode(calldata, true).unwrap();
            MockTx::Initialize {
                gateway: to,
                routes: call
                    .routes
                    .into_iter()
                    .map(|route| (route.chainId.to::<u64>(), route.chainName, route.gatewayAddress))
                    .collect(),
            }
        } else {
            panic!("unexpected selector {:?}", selector)
        }
    }

    fn submit(&self, tx: MockTx) -> B256 {
        let mut state = self.state.lock().unwrap();
        state.nonce += 1;
        state.block_number += 1;
        let nonce = state.nonce;
        let block_number = state.block_number;
        let tx_hash = B256::from(U256::from(nonce).to_be_bytes::<32>());

        state.submitted.push(tx.clone());

        let injected = state.injected.iter().position(|(matcher, _)| matcher(&tx));
        let outcome = match injected {
            Some(index) => Err(state.injected.remove(index).1),
            None => Self::apply(&mut state, &tx, self.signer, nonce),
        };

        state.pending.insert(
            tx_hash,
            PendingTx {
                tx,
                outcome,
                block_number,
            },
        );
        tx_hash
    }

    fn apply(
        state: &mut MockState,
        tx: &MockTx,
        signer: Address,
        nonce: u64,
    ) -> Result<Option<Address>, Failure> {
        let created = match tx {
            MockTx::CreateDeployer => Some(created_by(signer, nonce)),
            MockTx::Deploy {
                factory,
                bytecode_hash,
                ..
            } => {
                // A second CREATE2 with the same bytecode collides.
                if !state.deployed.insert((*factory, *bytecode_hash)) {
                    return Err(Failure::Revert);
                }
                None
            }
            MockTx::Initialize { gateway, .. } => {
                if !state.initialized_gateways.insert(*gateway) {
                    return Err(Failure::Revert);
                }
                None
            }
            MockTx::ApproveGateway { .. } | MockTx::AddOffering { .. } => None,
        };

        state.applied.push(tx.clone());
        Ok(created)
    }
}

impl ChainClient for MockChain {
    fn network(&self) -> &str {
        &self.network
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn deploy_contract(&self, _bytecode: Bytes) -> Result<B256> {
        Ok(self.submit(MockTx::CreateDeployer))
    }

    async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256> {
        Ok(self.submit(Self::decode(to, &calldata)))
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            anyhow::bail!("connection reset");
        }

        assert_eq!(
            &calldata[..4],
            IVaultController::facetAddressCall::SELECTOR.as_slice()
        );
        Ok(Self::vault_module_of(to).abi_encode().into())
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: B256,
        confirmations: Confirmations,
    ) -> Result<Receipt> {
        let mut state = self.state.lock().unwrap();
        let (tx, outcome, block_number) = {
            let pending = state
                .pending
                .get(&tx_hash)
                .ok_or_else(|| anyhow::anyhow!("unknown transaction {}", tx_hash))?;
            (pending.tx.clone(), pending.outcome, pending.block_number)
        };
        state.waits.push((tx, confirmations.depth));

        match outcome {
            Ok(contract_address) => Ok(Receipt {
                tx_hash,
                block_number,
                contract_address,
            }),
            Err(Failure::Revert) => Err(ChainError::Reverted { tx_hash }.into()),
            Err(Failure::Timeout) => Err(ChainError::ConfirmationTimeout {
                tx_hash,
                confirmations: confirmations.depth,
                timeout: confirmations.timeout,
            }
            .into()),
        }
    }
}

/// Hands out [`MockChain`]s by network name.
#[derive(Clone, Default)]
pub struct MockConnector {
    chains: Arc<Mutex<HashMap<String, MockChain>>>,
    unreachable: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockConnector {
    pub fn chain(&self, network: &str) -> MockChain {
        self.chains
            .lock()
            .unwrap()
            .entry(network.to_string())
            .or_insert_with(|| MockChain::new(network))
            .clone()
    }

    /// Refuse the next `count` connections to `network`.
    pub fn refuse(&self, network: &str, count: usize) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(network.to_string(), count);
    }

    pub fn total_submitted(&self) -> usize {
        self.chains
            .lock()
            .unwrap()
            .values()
            .map(|chain| chain.submitted().len())
            .sum()
    }
}

impl ChainConnector for MockConnector {
    type Client = MockChain;

    async fn connect(&self, chain: &ChainEntry) -> Result<MockChain> {
        {
            let mut unreachable = self.unreachable.lock().unwrap();
            if let Some(count) = unreachable.get_mut(&chain.network) {
                if *count > 0 {
                    *count -= 1;
                    anyhow::bail!("{} is unreachable", chain.network);
                }
            }
        }
        Ok(self.chain(&chain.network))
    }
}

/// Artifacts with small, distinct bytecodes.
pub fn test_artifacts() -> ModuleArtifacts {
    ModuleArtifacts {
        deployer: ModuleArtifact::new("Deployer", vec![0x60u8, 0x00]),
        loupe_module: ModuleArtifact::new("DiamondLoupeFacet", vec![0x60u8, 0x01]),
        factory: ModuleArtifact::new("NexusFactory", vec![0x60u8, 0x02]),
        module_catalog: ModuleArtifact::new("FacetCatalog", vec![0x60u8, 0x03]),
        vault_controller: ModuleArtifact::new("VaultV1Controller", vec![0x60u8, 0x04]),
        routing_gateway: ModuleArtifact::new("NexusGateway", vec![0x60u8, 0x05]),
    }
}

pub fn test_module_deployer() -> ModuleDeployer {
    let timeout = Duration::from_secs(1);
    ModuleDeployer::new(Confirmations::new(1, timeout), Confirmations::new(2, timeout))
}

pub fn test_parameters(chain_id: u64) -> ChainParameters {
    ChainParameters {
        chain_label: format!("Chain{}", chain_id),
        fee_token: Address::repeat_byte(0xfe),
        creation_fee: U256::from(5),
        messaging_gateway: Address::repeat_byte(0xa1),
        messaging_gas_service: Address::repeat_byte(0xa2),
        vault_module_fee: U256::from(100),
        loupe_module_fee: U256::from(7),
    }
}

/// A configuration with `count` test chains, ids starting at 1.
pub fn test_config(records_dir: &std::path::Path, count: u64) -> NexusConfig {
    let testnet = (1..=count)
        .map(|chain_id| ChainEntry {
            network: format!("chain-{}", chain_id),
            rpc_url: format!("http://localhost:{}", 8544 + chain_id).parse().unwrap(),
            chain_id,
            parameters: test_parameters(chain_id),
        })
        .collect();

    NexusConfig {
        records_dir: records_dir.to_path_buf(),
        confirmation_timeout_secs: 1,
        testnet,
        ..Default::default()
    }
}

/// A temporary testnet record store.
pub struct TestStore {
    pub dir: TempDir,
    pub store: RecordStore,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new("nexus-test").unwrap();
        let store = RecordStore::open(dir.path(), Network::Testnet).unwrap();
        Self { dir, store }
    }
}
