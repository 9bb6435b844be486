//! Error taxonomy for the engine.
//!
//! Build-time errors ([`BuildError`], [`ResolveError`]) reject a module
//! before anything touches the chain. Execution-time errors halt the run at
//! the failing action; completed journal records are left intact so the next
//! run resumes after the last success.

use std::path::PathBuf;

use alloy_core::primitives::B256;
use thiserror::Error;

use crate::abi::AbiError;
use crate::module::ActionId;

/// Module definition errors, raised while recording actions.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("identifier collision: '{id}' is already defined; pass an explicit id to disambiguate")]
    IdentifierCollision { id: ActionId },

    #[error("dangling reference: '{id}' does not belong to module '{module}' or any module it reuses")]
    DanglingReference { id: ActionId, module: String },

    #[error("module collision: a different module named '{name}' is already in use")]
    ModuleCollision { name: String },

    #[error("module has no output named '{name}'")]
    UnknownOutput { name: String },
}

/// Graph resolution errors, raised before any execution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cyclic dependency: {}", format_cycle(.path))]
    CyclicDependency { path: Vec<ActionId> },

    #[error("dangling reference: '{id}' (consumed by '{consumer}') is not produced by any action in the graph")]
    DanglingReference { id: ActionId, consumer: ActionId },

    #[error("module collision: two different modules named '{name}' are reachable in the same graph")]
    ModuleCollision { name: String },
}

fn format_cycle(path: &[ActionId]) -> String {
    path.iter()
        .map(ActionId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Journal integrity and persistence errors.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("inconsistent replay: '{id}' already completed with a different definition or result; wipe it explicitly to redeploy")]
    InconsistentReplay { id: ActionId },

    #[error("journal at {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error("corrupt journal at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact lookup and parsing errors.
///
/// These surface during the executor's pre-flight pass, before any chain
/// interaction.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no artifact for contract '{contract}' (looked at {path})")]
    ArtifactNotFound { contract: String, path: PathBuf },

    #[error("invalid artifact for contract '{contract}': {reason}")]
    InvalidArtifact { contract: String, reason: String },

    #[error("artifact I/O error for contract '{contract}': {source}")]
    Io {
        contract: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by the chain boundary.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    #[error("timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout { tx_hash: B256 },

    #[error("no account at index {index} (signer list has {available})")]
    MissingAccount { index: u32, available: usize },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors halting an execution run.
///
/// A halted run names the failing action identifier and the underlying
/// cause; nothing downstream of the failure is attempted.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("event '{event}' was not emitted by the transaction recorded for '{id}'")]
    EventNotEmitted { id: ActionId, event: String },

    #[error("event '{event}' has no argument named '{argument}'")]
    ArgumentNotFound { event: String, argument: String },

    #[error("contract '{contract}' has no function '{function}' in its ABI")]
    FunctionNotFound { contract: String, function: String },

    #[error("contract '{contract}' has no event '{event}' in its ABI")]
    EventNotInAbi { contract: String, event: String },

    #[error("ABI mismatch for '{contract}.{item}': {source}")]
    Abi {
        contract: String,
        item: String,
        #[source]
        source: AbiError,
    },

    #[error("action '{id}' produced a {actual} value where an {expected} was required")]
    ValueKind {
        id: ActionId,
        expected: &'static str,
        actual: String,
    },

    #[error("no transaction recorded for '{id}'; its logs cannot be read")]
    MissingTransaction { id: ActionId },

    #[error("no result recorded for '{id}'")]
    MissingResult { id: ActionId },

    #[error("action '{id}' failed: {source}")]
    ActionFailed {
        id: ActionId,
        #[source]
        source: ChainError,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
