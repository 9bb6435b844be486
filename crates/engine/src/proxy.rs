//! Transparent-upgradeable-proxy lifecycle modules.
//!
//! A fixed protocol built from the builder primitives, reusable for any
//! upgradeable contract: deploy the implementation, deploy a
//! `TransparentUpgradeableProxy` pointing at it with the encoded initializer
//! call, recover the auto-deployed admin's address from the proxy's
//! `AdminChanged` event, and bind typed handles to both. A later upgrade
//! module reuses those outputs, deploys the next implementation, and calls
//! `upgradeAndCall` on the admin.

use alloy_core::primitives::Bytes;

use crate::error::BuildError;
use crate::module::{Arg, BindOptions, CallOptions, Module};

/// OpenZeppelin transparent proxy contract name.
pub const TRANSPARENT_PROXY_CONTRACT: &str = "TransparentUpgradeableProxy";
/// Admin contract auto-deployed by the proxy constructor.
pub const PROXY_ADMIN_CONTRACT: &str = "ProxyAdmin";
/// Event emitted when the proxy's admin is set.
pub const ADMIN_CHANGED_EVENT: &str = "AdminChanged";
/// `AdminChanged` argument carrying the new admin address.
pub const ADMIN_CHANGED_NEW_ADMIN: &str = "newAdmin";
/// Admin function swapping the implementation.
pub const UPGRADE_AND_CALL_FUNCTION: &str = "upgradeAndCall";

/// Output name for the proxy handle.
pub const PROXY_OUTPUT: &str = "proxy";
/// Output name for the proxy admin handle.
pub const PROXY_ADMIN_OUTPUT: &str = "proxy_admin";
/// Output name for the proxy bound under the implementation's interface.
pub const INSTANCE_OUTPUT: &str = "instance";

/// Deploy `contract` behind a fresh transparent proxy.
///
/// The proxy constructor receives the implementation address, the admin
/// owner account, and the encoded initializer call; it stores the
/// implementation, auto-deploys its own `ProxyAdmin`, and emits
/// `AdminChanged`, from which the admin handle is recovered.
///
/// Outputs: [`PROXY_OUTPUT`], [`PROXY_ADMIN_OUTPUT`].
pub fn proxy_module(
    module_name: &str,
    contract: &str,
    init_function: &str,
    init_args: Vec<Arg>,
    admin_account: u32,
) -> Result<Module, BuildError> {
    Module::build(module_name, |m| {
        let owner = m.account(admin_account);

        let implementation = m.contract(contract, [])?;
        let init_call = m.encode_function_call(&implementation, init_function, init_args)?;

        let proxy = m.contract(
            TRANSPARENT_PROXY_CONTRACT,
            [
                Arg::from(&implementation),
                Arg::from(owner),
                Arg::from(&init_call),
            ],
        )?;

        let admin_address =
            m.read_event_argument(&proxy, ADMIN_CHANGED_EVENT, ADMIN_CHANGED_NEW_ADMIN)?;
        let admin = m.contract_at(PROXY_ADMIN_CONTRACT, &admin_address)?;

        m.export(PROXY_OUTPUT, &proxy);
        m.export(PROXY_ADMIN_OUTPUT, &admin);
        Ok(())
    })
}

/// Address the proxy through `contract`'s interface, transparently to call
/// sites.
///
/// Outputs: [`INSTANCE_OUTPUT`], [`PROXY_OUTPUT`], [`PROXY_ADMIN_OUTPUT`].
pub fn proxied_contract_module(
    module_name: &str,
    contract: &str,
    proxy_module: &Module,
) -> Result<Module, BuildError> {
    Module::build(module_name, |m| {
        let outputs = m.use_module(proxy_module)?;
        let proxy = outputs.contract(PROXY_OUTPUT)?;
        let proxy_admin = outputs.contract(PROXY_ADMIN_OUTPUT)?;

        let instance = m.contract_at(contract, &proxy)?;

        m.export(INSTANCE_OUTPUT, &instance);
        m.export(PROXY_OUTPUT, &proxy);
        m.export(PROXY_ADMIN_OUTPUT, &proxy_admin);
        Ok(())
    })
}

/// Swap the proxy's implementation for `new_contract`.
///
/// Reuses the proxy module's outputs, deploys the new implementation, sends
/// `upgradeAndCall(proxy, newImplementation, extraCalldata)` to the admin
/// from the admin owner account, and rebinds the proxy address under the new
/// interface with the distinct `bind_id`, so the pre- and post-upgrade
/// handles coexist in the journal without identifier collision.
///
/// Outputs: [`INSTANCE_OUTPUT`], [`PROXY_OUTPUT`], [`PROXY_ADMIN_OUTPUT`].
pub fn upgrade_module(
    module_name: &str,
    proxy_module: &Module,
    new_contract: &str,
    bind_id: &str,
    admin_account: u32,
    extra_calldata: Bytes,
) -> Result<Module, BuildError> {
    Module::build(module_name, |m| {
        let owner = m.account(admin_account);

        let outputs = m.use_module(proxy_module)?;
        let proxy = outputs.contract(PROXY_OUTPUT)?;
        let admin = outputs.contract(PROXY_ADMIN_OUTPUT)?;

        let new_implementation = m.contract(new_contract, [])?;
        m.call_with(
            &admin,
            UPGRADE_AND_CALL_FUNCTION,
            [
                Arg::from(&proxy),
                Arg::from(&new_implementation),
                Arg::from(extra_calldata),
            ],
            CallOptions {
                from: Some(owner),
                ..Default::default()
            },
        )?;

        let upgraded = m.contract_at_with(
            new_contract,
            &proxy,
            BindOptions {
                id: Some(bind_id.to_string()),
            },
        )?;

        m.export(INSTANCE_OUTPUT, &upgraded);
        m.export(PROXY_OUTPUT, &proxy);
        m.export(PROXY_ADMIN_OUTPUT, &admin);
        Ok(())
    })
}
