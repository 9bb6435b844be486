//! Chain boundary: the external service that executes transactions.
//!
//! The engine treats "deploy a contract" and "send a call" as atomic external
//! operations whose only relevant effects are a resulting address, emitted
//! logs, and success or failure. Implementations never expose key material to
//! the engine, and any transport-level retry belongs to them; the engine
//! itself retries nothing.

mod http;

pub use http::HttpChainClient;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// A raw, undecoded log entry from a transaction receipt.
///
/// Decoding happens engine-side against the emitting contract's artifact
/// ABI, so clients stay trivial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Receipt of a confirmed, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub logs: Vec<RawLog>,
}

/// Result of a contract deployment.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub address: Address,
    pub receipt: TxReceipt,
}

/// External chain boundary consumed by the [`Executor`](crate::Executor).
pub trait ChainClient: Send + Sync {
    /// Address of the externally managed signer at `index`.
    fn account(&self, index: u32) -> impl Future<Output = Result<Address, ChainError>> + Send;

    /// Deploy a contract from `bytecode` (constructor arguments already
    /// appended) and wait for confirmation.
    fn deploy(
        &self,
        bytecode: Bytes,
        from: Address,
    ) -> impl Future<Output = Result<Deployed, ChainError>> + Send;

    /// Send a state-changing call and wait for confirmation.
    fn send(
        &self,
        to: Address,
        calldata: Bytes,
        from: Address,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    /// Logs emitted by a previously confirmed transaction.
    ///
    /// Used when resuming: the transaction hash comes from the journal and
    /// the receipt is no longer held in memory.
    fn transaction_logs(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Vec<RawLog>, ChainError>> + Send;
}
