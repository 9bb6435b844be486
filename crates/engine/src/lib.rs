//! embark-engine - Declarative deployment orchestration for EVM contracts.
//!
//! This crate turns named deployment *modules* (contract deployments,
//! constructor and call arguments, cross-module references, post-deploy
//! calls) into an ordered execution plan, runs it against a chain boundary,
//! and journals every action so interrupted runs resume idempotently.
//!
//! The phases are kept strictly apart: [`Module::build`] is pure graph
//! construction, [`ExecutionPlan::resolve`] orders the graph and rejects
//! cycles, and [`Executor::run`] is the only place with side effects.

pub mod abi;

mod artifacts;
pub use artifacts::{AbiEntry, AbiParam, Artifact, ArtifactSource, FileArtifactSource};

mod chain;
pub use chain::{ChainClient, Deployed, HttpChainClient, RawLog, TxReceipt};

mod config;
pub use config::{DeploymentConfig, EMBARK_FILENAME};

mod error;
pub use error::{ArtifactError, BuildError, ChainError, ExecuteError, JournalError, ResolveError};

mod execute;
pub use execute::{ExecutionReport, Executor};

mod graph;
pub use graph::ExecutionPlan;

mod journal;
pub use journal::{ExecutionRecord, FileJournal, Journal, MemoryJournal, RecordStatus};

mod module;
pub use module::{
    Account, ActionId, Arg, ArgValue, BindOptions, CallHandle, CallOptions, ContractHandle,
    DeployOptions, EncodedCall, EventArg, Module, ModuleBuilder, ModuleOutputs,
};

pub mod proxy;
