//! Shared test support: a scriptable stub chain and canned artifacts.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use embark_engine::{
    AbiEntry, AbiParam, Artifact, ArtifactError, ArtifactSource, ChainClient, ChainError,
    Deployed, RawLog, TxReceipt, abi,
};

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn param(name: &str, ty: &str) -> AbiParam {
    AbiParam {
        name: name.to_string(),
        ty: ty.to_string(),
        indexed: false,
    }
}

fn entry(kind: &str, name: Option<&str>, inputs: Vec<AbiParam>) -> AbiEntry {
    AbiEntry {
        kind: kind.to_string(),
        name: name.map(str::to_string),
        inputs,
    }
}

/// A deterministic `AdminChanged(previousAdmin, newAdmin)` log, encoded the
/// way the ERC-1967 proxy emits it (both arguments unindexed).
pub fn admin_changed_log(previous: Address, new_admin: Address) -> RawLog {
    let inputs = [param("previousAdmin", "address"), param("newAdmin", "address")];
    RawLog {
        address: addr(0xB0),
        topics: vec![abi::event_topic("AdminChanged", &inputs).expect("topic")],
        data: Bytes::from(
            abi::encode_arguments(
                &inputs,
                &[previous.into(), new_admin.into()],
            )
            .expect("encode"),
        ),
    }
}

/// In-memory artifact set for the auction/proxy fixtures.
#[derive(Debug, Clone, Default)]
pub struct StubArtifacts {
    artifacts: BTreeMap<String, Artifact>,
}

impl StubArtifacts {
    pub fn with(mut self, artifact: Artifact) -> Self {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
        self
    }
}

impl ArtifactSource for StubArtifacts {
    fn load(&self, contract_name: &str) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .get(contract_name)
            .cloned()
            .ok_or_else(|| ArtifactError::ArtifactNotFound {
                contract: contract_name.to_string(),
                path: format!("stub://{contract_name}").into(),
            })
    }
}

/// Artifacts for the upgradeable-auction scenario: the implementation, the
/// OpenZeppelin proxy pair, and a V2 implementation.
pub fn auction_artifacts() -> StubArtifacts {
    StubArtifacts::default()
        .with(Artifact {
            contract_name: "Auction".to_string(),
            abi: vec![
                entry("function", Some("initialize"), vec![param("owner", "address")]),
                entry("function", Some("pause"), vec![]),
            ],
            bytecode: Bytes::from(vec![0x60, 0x01]),
        })
        .with(Artifact {
            contract_name: "AuctionV2".to_string(),
            abi: vec![entry(
                "function",
                Some("initialize"),
                vec![param("owner", "address")],
            )],
            bytecode: Bytes::from(vec![0x60, 0x02]),
        })
        .with(Artifact {
            contract_name: "TransparentUpgradeableProxy".to_string(),
            abi: vec![
                entry(
                    "constructor",
                    None,
                    vec![
                        param("logic", "address"),
                        param("initialOwner", "address"),
                        param("data", "bytes"),
                    ],
                ),
                entry(
                    "event",
                    Some("AdminChanged"),
                    vec![
                        param("previousAdmin", "address"),
                        param("newAdmin", "address"),
                    ],
                ),
            ],
            bytecode: Bytes::from(vec![0x60, 0x03]),
        })
        .with(Artifact {
            contract_name: "ProxyAdmin".to_string(),
            abi: vec![entry(
                "function",
                Some("upgradeAndCall"),
                vec![
                    param("proxy", "address"),
                    param("implementation", "address"),
                    param("data", "bytes"),
                ],
            )],
            bytecode: Bytes::from(vec![0x60, 0x04]),
        })
}

/// One scripted deployment outcome.
#[derive(Debug, Clone)]
struct DeployScript {
    address: Address,
    logs: Vec<RawLog>,
}

/// A call observed by the stub.
#[derive(Debug, Clone)]
pub struct SentCall {
    pub to: Address,
    pub calldata: Bytes,
    pub from: Address,
}

#[derive(Debug, Default)]
struct StubState {
    deploys: VecDeque<DeployScript>,
    fail_next_deploy: Option<String>,
    sent: Vec<SentCall>,
    logs_by_tx: BTreeMap<B256, Vec<RawLog>>,
    deploy_count: usize,
    next_tx: u64,
}

/// Scriptable in-memory chain boundary.
///
/// Deployments pop scripted outcomes in order; calls always succeed and are
/// recorded for assertions. Clones share state, so tests keep a handle for
/// scripting while the executor owns another.
#[derive(Debug, Clone, Default)]
pub struct StubChain {
    accounts: Vec<Address>,
    state: Arc<Mutex<StubState>>,
}

impl StubChain {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            state: Arc::default(),
        }
    }

    /// Queue the outcome of the next unscripted deployment.
    pub fn script_deploy(&self, address: Address, logs: Vec<RawLog>) {
        self.lock().deploys.push_back(DeployScript { address, logs });
    }

    /// Make the next deployment fail with `message`.
    pub fn fail_next_deploy(&self, message: &str) {
        self.lock().fail_next_deploy = Some(message.to_string());
    }

    pub fn sent_calls(&self) -> Vec<SentCall> {
        self.lock().sent.clone()
    }

    pub fn deploy_count(&self) -> usize {
        self.lock().deploy_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state lock")
    }

    fn next_receipt(state: &mut StubState, logs: Vec<RawLog>) -> TxReceipt {
        state.next_tx += 1;
        let tx_hash = B256::from(U256::from(state.next_tx));
        state.logs_by_tx.insert(tx_hash, logs.clone());
        TxReceipt {
            tx_hash,
            block_number: state.next_tx,
            logs,
        }
    }
}

impl ChainClient for StubChain {
    async fn account(&self, index: u32) -> Result<Address, ChainError> {
        self.accounts
            .get(index as usize)
            .copied()
            .ok_or(ChainError::MissingAccount {
                index,
                available: self.accounts.len(),
            })
    }

    async fn deploy(&self, _bytecode: Bytes, _from: Address) -> Result<Deployed, ChainError> {
        let mut state = self.lock();
        if let Some(message) = state.fail_next_deploy.take() {
            return Err(ChainError::Rpc(message));
        }
        let script = state
            .deploys
            .pop_front()
            .ok_or_else(|| ChainError::Rpc("no scripted deployment left".to_string()))?;
        state.deploy_count += 1;
        let receipt = Self::next_receipt(&mut state, script.logs);
        Ok(Deployed {
            address: script.address,
            receipt,
        })
    }

    async fn send(&self, to: Address, calldata: Bytes, from: Address) -> Result<TxReceipt, ChainError> {
        let mut state = self.lock();
        state.sent.push(SentCall { to, calldata, from });
        Ok(Self::next_receipt(&mut state, Vec::new()))
    }

    async fn transaction_logs(&self, tx_hash: B256) -> Result<Vec<RawLog>, ChainError> {
        self.lock()
            .logs_by_tx
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no receipt found for {tx_hash}")))
    }
}
