//! Deployment execution engine.
//!
//! Runs a resolved plan sequentially against the chain boundary, consulting
//! the journal before every action: completed actions are skipped and their
//! stored results substituted downstream, so an interrupted run resumes
//! exactly after the last success. Failures are recorded and halt the run:
//! nothing downstream of a failed action is attempted, and the engine never
//! retries.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256, Bytes};

use crate::abi;
use crate::artifacts::{AbiParam, ArtifactSource};
use crate::chain::{ChainClient, RawLog};
use crate::error::{ExecuteError, JournalError};
use crate::graph::ExecutionPlan;
use crate::journal::{ExecutionRecord, Journal};
use crate::module::{ActionDecl, ActionId, ActionKind, Arg, ArgValue, Module};

/// Outcome of a run: what executed, what was skipped, and the module's
/// resolved outputs.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Actions executed by this run, in order.
    pub executed: Vec<ActionId>,
    /// Actions skipped because the journal already held a completed record.
    pub skipped: Vec<ActionId>,
    /// The module's declared outputs, resolved to concrete values.
    pub outputs: BTreeMap<String, ArgValue>,
}

/// Executes modules against the chain boundary.
pub struct Executor<C, A> {
    chain: C,
    artifacts: A,
}

/// What a single dispatched action produced.
struct ActionOutcome {
    result: Option<ArgValue>,
    tx_hash: Option<B256>,
    logs: Option<Vec<RawLog>>,
}

impl<C, A> Executor<C, A>
where
    C: ChainClient,
    A: ArtifactSource,
{
    pub fn new(chain: C, artifacts: A) -> Self {
        Self { chain, artifacts }
    }

    /// Resolve `module` and execute it, journaling every action.
    pub async fn run<J: Journal>(
        &self,
        module: &Module,
        journal: &mut J,
    ) -> Result<ExecutionReport, ExecuteError> {
        let plan = ExecutionPlan::resolve(module)?;
        tracing::info!(
            module = module.name(),
            actions = plan.len(),
            "Execution plan resolved"
        );

        // Artifact problems surface here, before any chain interaction.
        self.preflight(&plan)?;

        let mut results: BTreeMap<ActionId, ArgValue> = BTreeMap::new();
        let mut tx_hashes: BTreeMap<ActionId, B256> = BTreeMap::new();
        let mut run_logs: BTreeMap<ActionId, Vec<RawLog>> = BTreeMap::new();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for action in plan.actions() {
            let digest = action.digest();

            if let Some(record) = journal.get(&action.id) {
                if record.is_completed() {
                    if record.digest != digest {
                        return Err(JournalError::InconsistentReplay {
                            id: action.id.clone(),
                        }
                        .into());
                    }
                    if let Some(value) = &record.result {
                        results.insert(action.id.clone(), value.clone());
                    }
                    if let Some(tx_hash) = record.tx_hash {
                        tx_hashes.insert(action.id.clone(), tx_hash);
                    }
                    tracing::debug!(action = %action.id, "Already completed, skipping");
                    skipped.push(action.id.clone());
                    continue;
                }
                // A failed record does not block a retry in a fresh run.
                tracing::debug!(action = %action.id, "Retrying previously failed action");
            }

            tracing::info!(action = %action.id, "Executing");
            match self
                .dispatch(action, &results, &tx_hashes, &run_logs)
                .await
            {
                Ok(outcome) => {
                    journal.put(
                        &action.id,
                        ExecutionRecord::completed(
                            outcome.result.clone(),
                            outcome.tx_hash,
                            digest,
                        ),
                    )?;
                    if let Some(value) = outcome.result {
                        results.insert(action.id.clone(), value);
                    }
                    if let Some(tx_hash) = outcome.tx_hash {
                        tx_hashes.insert(action.id.clone(), tx_hash);
                    }
                    if let Some(logs) = outcome.logs {
                        run_logs.insert(action.id.clone(), logs);
                    }
                    executed.push(action.id.clone());
                }
                Err(err) => {
                    journal.put(
                        &action.id,
                        ExecutionRecord::failed(err.to_string(), digest),
                    )?;
                    tracing::error!(action = %action.id, error = %err, "Action failed, halting run");
                    return Err(err);
                }
            }
        }

        let mut outputs = BTreeMap::new();
        for (name, handle) in &module.inner().outputs {
            if let Some(value) = results.get(handle.action_id()) {
                outputs.insert(name.clone(), value.clone());
            }
        }

        tracing::info!(
            module = module.name(),
            executed = executed.len(),
            skipped = skipped.len(),
            "Run complete"
        );

        Ok(ExecutionReport {
            executed,
            skipped,
            outputs,
        })
    }

    /// Validate that every artifact the plan touches loads and exposes the
    /// functions and events the plan refers to.
    fn preflight(&self, plan: &ExecutionPlan) -> Result<(), ExecuteError> {
        for action in plan.actions() {
            match &action.kind {
                ActionKind::Deploy { contract, .. } => {
                    self.artifacts.load(contract)?;
                }
                ActionKind::Encode {
                    contract, function, ..
                }
                | ActionKind::Call {
                    contract, function, ..
                } => {
                    let artifact = self.artifacts.load(contract)?;
                    if artifact.function(function).is_none() {
                        return Err(ExecuteError::FunctionNotFound {
                            contract: contract.clone(),
                            function: function.clone(),
                        });
                    }
                }
                ActionKind::ReadEvent {
                    contract, event, ..
                } => {
                    let artifact = self.artifacts.load(contract)?;
                    if artifact.event(event).is_none() {
                        return Err(ExecuteError::EventNotInAbi {
                            contract: contract.clone(),
                            event: event.clone(),
                        });
                    }
                }
                ActionKind::Bind { .. } => {}
            }
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        action: &ActionDecl,
        results: &BTreeMap<ActionId, ArgValue>,
        tx_hashes: &BTreeMap<ActionId, B256>,
        run_logs: &BTreeMap<ActionId, Vec<RawLog>>,
    ) -> Result<ActionOutcome, ExecuteError> {
        match &action.kind {
            ActionKind::Deploy {
                contract,
                args,
                from,
            } => {
                let artifact = self.artifacts.load(contract)?;
                let values = self.resolve_args(&action.id, args, results).await?;
                let ctor_params: &[AbiParam] = artifact
                    .constructor()
                    .map(|c| c.inputs.as_slice())
                    .unwrap_or(&[]);
                let encoded_args = abi::encode_arguments(ctor_params, &values).map_err(
                    |source| ExecuteError::Abi {
                        contract: contract.clone(),
                        item: "constructor".to_string(),
                        source,
                    },
                )?;

                let mut bytecode = artifact.bytecode.to_vec();
                bytecode.extend_from_slice(&encoded_args);

                let sender = self.sender(&action.id, *from).await?;
                let deployed = self
                    .chain
                    .deploy(Bytes::from(bytecode), sender)
                    .await
                    .map_err(|source| ExecuteError::ActionFailed {
                        id: action.id.clone(),
                        source,
                    })?;

                tracing::info!(
                    action = %action.id,
                    address = %deployed.address,
                    tx_hash = %deployed.receipt.tx_hash,
                    "Contract deployed"
                );

                Ok(ActionOutcome {
                    result: Some(ArgValue::Address(deployed.address)),
                    tx_hash: Some(deployed.receipt.tx_hash),
                    logs: Some(deployed.receipt.logs),
                })
            }

            ActionKind::Bind { address, .. } => {
                let value = self.resolve_arg(&action.id, address, results).await?;
                let address = self.expect_address(&action.id, &value)?;
                tracing::info!(action = %action.id, %address, "Existing contract bound");
                Ok(ActionOutcome {
                    result: Some(ArgValue::Address(address)),
                    tx_hash: None,
                    logs: None,
                })
            }

            ActionKind::Encode {
                contract,
                function,
                args,
                ..
            } => {
                let calldata = self
                    .encode_calldata(&action.id, contract, function, args, results)
                    .await?;
                Ok(ActionOutcome {
                    result: Some(ArgValue::Bytes(calldata)),
                    tx_hash: None,
                    logs: None,
                })
            }

            ActionKind::Call {
                target,
                contract,
                function,
                args,
                from,
            } => {
                let calldata = self
                    .encode_calldata(&action.id, contract, function, args, results)
                    .await?;
                let to_value = results
                    .get(target)
                    .cloned()
                    .ok_or_else(|| ExecuteError::MissingResult { id: target.clone() })?;
                let to = self.expect_address(target, &to_value)?;
                let sender = self.sender(&action.id, *from).await?;

                let receipt = self
                    .chain
                    .send(to, calldata, sender)
                    .await
                    .map_err(|source| ExecuteError::ActionFailed {
                        id: action.id.clone(),
                        source,
                    })?;

                tracing::info!(
                    action = %action.id,
                    %to,
                    tx_hash = %receipt.tx_hash,
                    "Call confirmed"
                );

                Ok(ActionOutcome {
                    result: None,
                    tx_hash: Some(receipt.tx_hash),
                    logs: Some(receipt.logs),
                })
            }

            ActionKind::ReadEvent {
                source,
                contract,
                event,
                argument,
            } => {
                let artifact = self.artifacts.load(contract)?;
                let entry =
                    artifact
                        .event(event)
                        .ok_or_else(|| ExecuteError::EventNotInAbi {
                            contract: contract.clone(),
                            event: event.clone(),
                        })?;

                // Logs from this run if the source just executed, otherwise
                // refetched by the journaled transaction hash.
                let logs: Vec<RawLog> = match run_logs.get(source) {
                    Some(logs) => logs.clone(),
                    None => {
                        let tx_hash = tx_hashes.get(source).copied().ok_or_else(|| {
                            ExecuteError::MissingTransaction { id: source.clone() }
                        })?;
                        self.chain.transaction_logs(tx_hash).await.map_err(|source| {
                            ExecuteError::ActionFailed {
                                id: action.id.clone(),
                                source,
                            }
                        })?
                    }
                };

                let topic = abi::event_topic(event, &entry.inputs).map_err(|source| {
                    ExecuteError::Abi {
                        contract: contract.clone(),
                        item: event.clone(),
                        source,
                    }
                })?;
                let log = logs
                    .iter()
                    .find(|log| log.topics.first() == Some(&topic))
                    .ok_or_else(|| ExecuteError::EventNotEmitted {
                        id: source.clone(),
                        event: event.clone(),
                    })?;

                let decoded =
                    abi::decode_event(&entry.inputs, log).map_err(|source| ExecuteError::Abi {
                        contract: contract.clone(),
                        item: event.clone(),
                        source,
                    })?;
                let value = decoded
                    .into_iter()
                    .find(|(name, _)| name == argument)
                    .map(|(_, value)| value)
                    .ok_or_else(|| ExecuteError::ArgumentNotFound {
                        event: event.clone(),
                        argument: argument.clone(),
                    })?;

                tracing::info!(action = %action.id, event, argument, "Event argument read");

                Ok(ActionOutcome {
                    result: Some(value),
                    tx_hash: None,
                    logs: None,
                })
            }
        }
    }

    async fn encode_calldata(
        &self,
        id: &ActionId,
        contract: &str,
        function: &str,
        args: &[Arg],
        results: &BTreeMap<ActionId, ArgValue>,
    ) -> Result<Bytes, ExecuteError> {
        let artifact = self.artifacts.load(contract)?;
        let entry = artifact
            .function(function)
            .ok_or_else(|| ExecuteError::FunctionNotFound {
                contract: contract.to_string(),
                function: function.to_string(),
            })?;
        let values = self.resolve_args(id, args, results).await?;
        abi::encode_call(function, &entry.inputs, &values).map_err(|source| ExecuteError::Abi {
            contract: contract.to_string(),
            item: function.to_string(),
            source,
        })
    }

    async fn resolve_args(
        &self,
        id: &ActionId,
        args: &[Arg],
        results: &BTreeMap<ActionId, ArgValue>,
    ) -> Result<Vec<ArgValue>, ExecuteError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.resolve_arg(id, arg, results).await?);
        }
        Ok(values)
    }

    /// Substitute one argument with its concrete value.
    ///
    /// References are guaranteed resolvable by the plan's ordering; a miss
    /// means the journal lost a result and is surfaced, not papered over.
    async fn resolve_arg(
        &self,
        id: &ActionId,
        arg: &Arg,
        results: &BTreeMap<ActionId, ArgValue>,
    ) -> Result<ArgValue, ExecuteError> {
        match arg {
            Arg::Literal { value } => Ok(value.clone()),
            Arg::ContractAddress { id } | Arg::Encoded { id } | Arg::EventValue { id } => results
                .get(id)
                .cloned()
                .ok_or_else(|| ExecuteError::MissingResult { id: id.clone() }),
            Arg::AccountIndex { index } => {
                let address = self.chain.account(*index).await.map_err(|source| {
                    ExecuteError::ActionFailed {
                        id: id.clone(),
                        source,
                    }
                })?;
                Ok(ArgValue::Address(address))
            }
        }
    }

    async fn sender(&self, id: &ActionId, from: Option<u32>) -> Result<Address, ExecuteError> {
        self.chain
            .account(from.unwrap_or(0))
            .await
            .map_err(|source| ExecuteError::ActionFailed {
                id: id.clone(),
                source,
            })
    }

    fn expect_address(&self, id: &ActionId, value: &ArgValue) -> Result<Address, ExecuteError> {
        value.as_address().ok_or_else(|| ExecuteError::ValueKind {
            id: id.clone(),
            expected: "address",
            actual: value.kind().to_string(),
        })
    }
}
