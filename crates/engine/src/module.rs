//! Declarative deployment modules.
//!
//! A [`Module`] is a named set of deployment actions plus declared outputs.
//! Building one is pure graph construction: every [`ModuleBuilder`] method
//! records an action and returns a placeholder handle, and nothing touches
//! the chain until the module is handed to an [`Executor`](crate::Executor).
//! Modules compose through [`ModuleBuilder::use_module`], which imports
//! another module's actions and exposes its outputs by reference.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alloy_core::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BuildError;

/// Stable identifier for an action, formatted as `<module>#<local>`.
///
/// The local part defaults to the contract name (deploys and binds),
/// `<Contract>.<fn>` (calls), `encode(<Contract>.<fn>)` (encodings) or
/// `<Contract>.<event>.<arg>` (event reads); an explicit id option replaces
/// it. Identifiers key the journal, so they must stay stable across runs.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub(crate) fn new(module: &str, local: &str) -> Self {
        Self(format!("{module}#{local}"))
    }

    /// The module part of the identifier.
    pub fn module(&self) -> &str {
        self.0.split('#').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A concrete value flowing through the action graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    Bytes(Bytes),
    String(String),
}

impl ArgValue {
    /// Short name of the value kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::Uint(_) => "uint",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// An argument to a deployment or call action.
///
/// Literals are embedded directly; the reference variants point at the
/// future result of another action and are substituted at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Arg {
    Literal { value: ArgValue },
    /// The address produced by a deploy or bind action.
    ContractAddress { id: ActionId },
    /// The calldata produced by an encode action.
    Encoded { id: ActionId },
    /// The value produced by an event-argument read.
    EventValue { id: ActionId },
    /// The address of the externally managed signer at `index`.
    AccountIndex { index: u32 },
}

impl Arg {
    /// Reference the signer account at `index`.
    pub fn account(index: u32) -> Self {
        Self::AccountIndex { index }
    }

    pub(crate) fn referenced_action(&self) -> Option<&ActionId> {
        match self {
            Self::ContractAddress { id } | Self::Encoded { id } | Self::EventValue { id } => {
                Some(id)
            }
            Self::Literal { .. } | Self::AccountIndex { .. } => None,
        }
    }
}

macro_rules! literal_arg_from {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Self::Literal { value: value.into() }
            }
        })*
    };
}

literal_arg_from!(ArgValue, Address, U256, bool, Bytes, String, &str, u64);

impl From<&ContractHandle> for Arg {
    fn from(handle: &ContractHandle) -> Self {
        Self::ContractAddress {
            id: handle.id.clone(),
        }
    }
}

impl From<&EncodedCall> for Arg {
    fn from(handle: &EncodedCall) -> Self {
        Self::Encoded {
            id: handle.id.clone(),
        }
    }
}

impl From<&EventArg> for Arg {
    fn from(handle: &EventArg) -> Self {
        Self::EventValue {
            id: handle.id.clone(),
        }
    }
}

impl From<Account> for Arg {
    fn from(account: Account) -> Self {
        Self::AccountIndex {
            index: account.index,
        }
    }
}

/// Handle to the future address of a deploy or bind action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractHandle {
    id: ActionId,
    contract: String,
}

impl ContractHandle {
    /// The action identifier backing this handle.
    pub fn action_id(&self) -> &ActionId {
        &self.id
    }

    /// The contract name this handle is typed as.
    pub fn contract_name(&self) -> &str {
        &self.contract
    }
}

/// Handle to the future calldata of an encode action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedCall {
    id: ActionId,
}

impl EncodedCall {
    pub fn action_id(&self) -> &ActionId {
        &self.id
    }
}

/// Handle to the future value of an event-argument read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventArg {
    id: ActionId,
}

impl EventArg {
    pub fn action_id(&self) -> &ActionId {
        &self.id
    }
}

/// Handle to a recorded state-changing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallHandle {
    id: ActionId,
}

impl CallHandle {
    pub fn action_id(&self) -> &ActionId {
        &self.id
    }
}

/// Opaque reference into the externally managed ordered signer list.
///
/// The engine never holds key material; accounts resolve to addresses at
/// execution time through the chain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Account {
    index: u32,
}

impl Account {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// The kind of work an action performs, with its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ActionKind {
    Deploy {
        contract: String,
        args: Vec<Arg>,
        from: Option<u32>,
    },
    Bind {
        contract: String,
        address: Arg,
    },
    Encode {
        target: ActionId,
        contract: String,
        function: String,
        args: Vec<Arg>,
    },
    Call {
        target: ActionId,
        contract: String,
        function: String,
        args: Vec<Arg>,
        from: Option<u32>,
    },
    ReadEvent {
        source: ActionId,
        contract: String,
        event: String,
        argument: String,
    },
}

/// One declared action: an identifier plus its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ActionDecl {
    pub(crate) id: ActionId,
    pub(crate) kind: ActionKind,
}

impl ActionDecl {
    /// SHA-256 digest of the canonical action definition.
    ///
    /// Stored in the journal when the action completes; a later run whose
    /// definition no longer matches is rejected instead of replayed.
    pub(crate) fn digest(&self) -> String {
        let json = serde_json::to_string(self).expect("action definitions always serialize");
        hex::encode(Sha256::digest(json.as_bytes()))
    }

    /// Action identifiers this action consumes.
    pub(crate) fn dependencies(&self) -> Vec<ActionId> {
        fn arg_refs(args: &[Arg], deps: &mut Vec<ActionId>) {
            deps.extend(args.iter().filter_map(|a| a.referenced_action().cloned()));
        }

        let mut deps = Vec::new();
        match &self.kind {
            ActionKind::Deploy { args, .. } => arg_refs(args, &mut deps),
            ActionKind::Bind { address, .. } => arg_refs(std::slice::from_ref(address), &mut deps),
            ActionKind::Encode { target, args, .. } | ActionKind::Call { target, args, .. } => {
                deps.push(target.clone());
                arg_refs(args, &mut deps);
            }
            ActionKind::ReadEvent { source, .. } => deps.push(source.clone()),
        }
        deps
    }
}

/// A named, immutable set of actions plus declared outputs.
///
/// Cheap to clone; reuse through [`ModuleBuilder::use_module`] is
/// deduplicated by identity, so the same module never contributes duplicate
/// actions to a graph.
#[derive(Debug, Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

#[derive(Debug)]
pub(crate) struct ModuleInner {
    pub(crate) name: String,
    pub(crate) actions: Vec<ActionDecl>,
    pub(crate) submodules: Vec<Module>,
    pub(crate) outputs: BTreeMap<String, ContractHandle>,
}

impl Module {
    /// Define a module by recording actions through a [`ModuleBuilder`].
    pub fn build<F>(name: impl Into<String>, f: F) -> Result<Module, BuildError>
    where
        F: FnOnce(&mut ModuleBuilder) -> Result<(), BuildError>,
    {
        let mut builder = ModuleBuilder::new(name.into());
        f(&mut builder)?;
        Ok(builder.finish())
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The module's declared outputs.
    pub fn outputs(&self) -> ModuleOutputs {
        ModuleOutputs {
            outputs: self.inner.outputs.clone(),
        }
    }

    pub(crate) fn inner(&self) -> &ModuleInner {
        &self.inner
    }

    pub(crate) fn ptr_eq(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// All action identifiers declared by this module and its submodules.
    pub(crate) fn all_action_ids(&self) -> BTreeSet<ActionId> {
        let mut ids = BTreeSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut BTreeSet<ActionId>) {
        for submodule in &self.inner.submodules {
            submodule.collect_ids(ids);
        }
        for action in &self.inner.actions {
            ids.insert(action.id.clone());
        }
    }
}

/// Outputs of a module, as seen through [`ModuleBuilder::use_module`] or
/// [`Module::outputs`].
#[derive(Debug, Clone)]
pub struct ModuleOutputs {
    outputs: BTreeMap<String, ContractHandle>,
}

impl ModuleOutputs {
    /// Look up a contract output by name.
    pub fn contract(&self, name: &str) -> Result<ContractHandle, BuildError> {
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownOutput {
                name: name.to_string(),
            })
    }

    /// Declared output names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

/// Options for [`ModuleBuilder::contract_with`].
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Explicit identifier, replacing the contract name as the local id part.
    pub id: Option<String>,
    /// Sender account; defaults to account 0.
    pub from: Option<Account>,
}

/// Options for [`ModuleBuilder::contract_at_with`].
#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    /// Explicit identifier, replacing the contract name as the local id part.
    pub id: Option<String>,
}

/// Options for [`ModuleBuilder::call_with`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Explicit identifier, replacing `<Contract>.<fn>` as the local id part.
    pub id: Option<String>,
    /// Sender account; defaults to account 0.
    pub from: Option<Account>,
}

/// Records actions for a module under construction.
///
/// Obtained through [`Module::build`]. All methods are deferred: they record
/// intent and return placeholder handles that later actions (or other
/// modules) can reference.
pub struct ModuleBuilder {
    name: String,
    actions: Vec<ActionDecl>,
    ids: BTreeSet<ActionId>,
    submodules: Vec<Module>,
    known_refs: BTreeSet<ActionId>,
    outputs: BTreeMap<String, ContractHandle>,
}

impl ModuleBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            actions: Vec::new(),
            ids: BTreeSet::new(),
            submodules: Vec::new(),
            known_refs: BTreeSet::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// The name of the module being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a contract deployment and return a handle to its future address.
    pub fn contract<I>(&mut self, contract: &str, args: I) -> Result<ContractHandle, BuildError>
    where
        I: IntoIterator<Item = Arg>,
    {
        self.contract_with(contract, args, DeployOptions::default())
    }

    /// [`Self::contract`] with an explicit identifier and/or sender.
    pub fn contract_with<I>(
        &mut self,
        contract: &str,
        args: I,
        opts: DeployOptions,
    ) -> Result<ContractHandle, BuildError>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args: Vec<Arg> = args.into_iter().collect();
        self.check_args(&args)?;
        let id = self.insert_id(opts.id.as_deref().unwrap_or(contract))?;
        self.actions.push(ActionDecl {
            id: id.clone(),
            kind: ActionKind::Deploy {
                contract: contract.to_string(),
                args,
                from: opts.from.map(|a| a.index),
            },
        });
        Ok(ContractHandle {
            id,
            contract: contract.to_string(),
        })
    }

    /// Bind an already-deployed address to a typed handle without deploying.
    pub fn contract_at(
        &mut self,
        contract: &str,
        address: impl Into<Arg>,
    ) -> Result<ContractHandle, BuildError> {
        self.contract_at_with(contract, address, BindOptions::default())
    }

    /// [`Self::contract_at`] with an explicit identifier.
    pub fn contract_at_with(
        &mut self,
        contract: &str,
        address: impl Into<Arg>,
        opts: BindOptions,
    ) -> Result<ContractHandle, BuildError> {
        let address = address.into();
        self.check_args(std::slice::from_ref(&address))?;
        let id = self.insert_id(opts.id.as_deref().unwrap_or(contract))?;
        self.actions.push(ActionDecl {
            id: id.clone(),
            kind: ActionKind::Bind {
                contract: contract.to_string(),
                address,
            },
        });
        Ok(ContractHandle {
            id,
            contract: contract.to_string(),
        })
    }

    /// Record a pure calldata encoding against `target`'s interface.
    ///
    /// Never touches the chain; the encoded bytes become available to
    /// downstream actions (typically a proxy constructor).
    pub fn encode_function_call<I>(
        &mut self,
        target: &ContractHandle,
        function: &str,
        args: I,
    ) -> Result<EncodedCall, BuildError>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args: Vec<Arg> = args.into_iter().collect();
        self.check_ref(&target.id)?;
        self.check_args(&args)?;
        let local = format!("encode({}.{})", target.contract, function);
        let id = self.insert_id(&local)?;
        self.actions.push(ActionDecl {
            id: id.clone(),
            kind: ActionKind::Encode {
                target: target.id.clone(),
                contract: target.contract.clone(),
                function: function.to_string(),
                args,
            },
        });
        Ok(EncodedCall { id })
    }

    /// Record a state-changing call to `target`.
    pub fn call<I>(
        &mut self,
        target: &ContractHandle,
        function: &str,
        args: I,
    ) -> Result<CallHandle, BuildError>
    where
        I: IntoIterator<Item = Arg>,
    {
        self.call_with(target, function, args, CallOptions::default())
    }

    /// [`Self::call`] with an explicit identifier and/or sender.
    pub fn call_with<I>(
        &mut self,
        target: &ContractHandle,
        function: &str,
        args: I,
        opts: CallOptions,
    ) -> Result<CallHandle, BuildError>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args: Vec<Arg> = args.into_iter().collect();
        self.check_ref(&target.id)?;
        self.check_args(&args)?;
        let local = format!("{}.{}", target.contract, function);
        let id = self.insert_id(opts.id.as_deref().unwrap_or(&local))?;
        self.actions.push(ActionDecl {
            id: id.clone(),
            kind: ActionKind::Call {
                target: target.id.clone(),
                contract: target.contract.clone(),
                function: function.to_string(),
                args,
                from: opts.from.map(|a| a.index),
            },
        });
        Ok(CallHandle { id })
    }

    /// Read one argument of an event emitted by `source`'s transaction.
    pub fn read_event_argument(
        &mut self,
        source: &ContractHandle,
        event: &str,
        argument: &str,
    ) -> Result<EventArg, BuildError> {
        self.check_ref(&source.id)?;
        let local = format!("{}.{}.{}", source.contract, event, argument);
        let id = self.insert_id(&local)?;
        self.actions.push(ActionDecl {
            id: id.clone(),
            kind: ActionKind::ReadEvent {
                source: source.id.clone(),
                contract: source.contract.clone(),
                event: event.to_string(),
                argument: argument.to_string(),
            },
        });
        Ok(EventArg { id })
    }

    /// Reference the externally managed signer account at `index`.
    pub fn account(&self, index: u32) -> Account {
        Account { index }
    }

    /// Import another module's action set and return its declared outputs.
    ///
    /// Reusing the same module twice is idempotent: the second call returns
    /// the same outputs without duplicating any action. Registering a
    /// *different* module under an already-used name is a
    /// [`BuildError::ModuleCollision`].
    pub fn use_module(&mut self, module: &Module) -> Result<ModuleOutputs, BuildError> {
        if module.name() == self.name {
            return Err(BuildError::ModuleCollision {
                name: self.name.clone(),
            });
        }
        if let Some(existing) = self.submodules.iter().find(|m| m.name() == module.name()) {
            if existing.ptr_eq(module) {
                return Ok(module.outputs());
            }
            return Err(BuildError::ModuleCollision {
                name: module.name().to_string(),
            });
        }
        self.known_refs.extend(module.all_action_ids());
        self.submodules.push(module.clone());
        Ok(module.outputs())
    }

    /// Declare a named output of this module.
    pub fn export(&mut self, name: &str, handle: &ContractHandle) {
        self.outputs.insert(name.to_string(), handle.clone());
    }

    fn finish(self) -> Module {
        Module {
            inner: Arc::new(ModuleInner {
                name: self.name,
                actions: self.actions,
                submodules: self.submodules,
                outputs: self.outputs,
            }),
        }
    }

    fn insert_id(&mut self, local: &str) -> Result<ActionId, BuildError> {
        let id = ActionId::new(&self.name, local);
        if !self.ids.insert(id.clone()) {
            return Err(BuildError::IdentifierCollision { id });
        }
        self.known_refs.insert(id.clone());
        Ok(id)
    }

    fn check_args(&self, args: &[Arg]) -> Result<(), BuildError> {
        for id in args.iter().filter_map(Arg::referenced_action) {
            self.check_ref(id)?;
        }
        Ok(())
    }

    fn check_ref(&self, id: &ActionId) -> Result<(), BuildError> {
        if self.known_refs.contains(id) {
            return Ok(());
        }
        Err(BuildError::DanglingReference {
            id: id.clone(),
            module: self.name.clone(),
        })
    }
}
