//! Resume, fail-fast, and replay-consistency behavior.

mod support;

use alloy_core::primitives::Address;
use embark_engine::{
    Arg, ArgValue, ExecuteError, Executor, Journal, MemoryJournal, Module, RecordStatus, proxy,
};
use support::{StubChain, addr, admin_changed_log, auction_artifacts};

fn auction_proxy_module() -> Module {
    proxy::proxy_module(
        "AuctionProxy",
        "Auction",
        "initialize",
        vec![Arg::account(0)],
        0,
    )
    .expect("proxy module builds")
}

#[tokio::test]
async fn a_failed_deploy_halts_the_run_and_leaves_downstream_untouched() {
    let chain = StubChain::new(vec![addr(0x01)]);
    chain.fail_next_deploy("nonce too low");

    let module = Module::build("Halt", |m| {
        let auction = m.contract("Auction", [])?;
        m.call(&auction, "pause", [])?;
        Ok(())
    })
    .expect("module builds");

    let mut journal = MemoryJournal::new();
    let err = Executor::new(chain.clone(), auction_artifacts())
        .run(&module, &mut journal)
        .await
        .expect_err("the deploy failure halts the run");
    assert!(matches!(err, ExecuteError::ActionFailed { .. }));

    // The deploy is journaled as failed; the downstream call has no record
    // at all and was never sent.
    let failed = journal
        .entries()
        .iter()
        .find(|(id, _)| id.as_str() == "Halt#Auction")
        .map(|(_, record)| record.status)
        .expect("failed deploy is journaled");
    assert_eq!(failed, RecordStatus::Failed);
    assert!(
        !journal
            .entries()
            .keys()
            .any(|id| id.as_str() == "Halt#Auction.pause")
    );
    assert!(chain.sent_calls().is_empty());
}

#[tokio::test]
async fn interrupted_run_resumes_exactly_after_the_last_completed_action() {
    let module = auction_proxy_module();
    let mut journal = MemoryJournal::new();

    // First run: the implementation deploys; the proxy deploy fails because
    // only one outcome is scripted.
    let chain = StubChain::new(vec![addr(0x01)]);
    chain.script_deploy(addr(0xAA), vec![]);

    Executor::new(chain.clone(), auction_artifacts())
        .run(&module, &mut journal)
        .await
        .expect_err("the proxy deploy fails");

    let status_of = |journal: &MemoryJournal, id: &str| {
        journal
            .entries()
            .iter()
            .find(|(key, _)| key.as_str() == id)
            .map(|(_, record)| record.status)
    };
    assert_eq!(
        status_of(&journal, "AuctionProxy#Auction"),
        Some(RecordStatus::Completed)
    );
    assert_eq!(
        status_of(&journal, "AuctionProxy#TransparentUpgradeableProxy"),
        Some(RecordStatus::Failed)
    );
    assert_eq!(
        status_of(&journal, "AuctionProxy#ProxyAdmin"),
        None,
        "nothing past the failure is attempted"
    );

    // Second run against the same journal: only the suffix executes. The
    // stub has a single scripted deploy, so a re-deploy of the
    // implementation would fail the run.
    let resumed = StubChain::new(vec![addr(0x01)]);
    resumed.script_deploy(addr(0xBB), vec![admin_changed_log(Address::ZERO, addr(0xCC))]);

    let report = Executor::new(resumed.clone(), auction_artifacts())
        .run(&module, &mut journal)
        .await
        .expect("the resumed run completes");

    let executed: Vec<_> = report.executed.iter().map(|id| id.as_str()).collect();
    assert_eq!(
        executed,
        vec![
            "AuctionProxy#TransparentUpgradeableProxy",
            "AuctionProxy#TransparentUpgradeableProxy.AdminChanged.newAdmin",
            "AuctionProxy#ProxyAdmin",
        ]
    );
    let skipped: Vec<_> = report.skipped.iter().map(|id| id.as_str()).collect();
    assert_eq!(
        skipped,
        vec![
            "AuctionProxy#Auction",
            "AuctionProxy#encode(Auction.initialize)",
        ]
    );
    assert_eq!(resumed.deploy_count(), 1, "the implementation is not redeployed");

    // The final journal matches an uninterrupted run's.
    let mut uninterrupted = MemoryJournal::new();
    let fresh = StubChain::new(vec![addr(0x01)]);
    fresh.script_deploy(addr(0xAA), vec![]);
    fresh.script_deploy(addr(0xBB), vec![admin_changed_log(Address::ZERO, addr(0xCC))]);
    Executor::new(fresh, auction_artifacts())
        .run(&module, &mut uninterrupted)
        .await
        .expect("uninterrupted run completes");

    let results = |journal: &MemoryJournal| -> Vec<(String, Option<ArgValue>)> {
        journal
            .entries()
            .iter()
            .map(|(id, record)| (id.as_str().to_string(), record.result.clone()))
            .collect()
    };
    assert_eq!(results(&journal), results(&uninterrupted));
}

#[tokio::test]
async fn rerunning_a_completed_module_executes_nothing() {
    let module = auction_proxy_module();
    let mut journal = MemoryJournal::new();

    let chain = StubChain::new(vec![addr(0x01)]);
    chain.script_deploy(addr(0xAA), vec![]);
    chain.script_deploy(addr(0xBB), vec![admin_changed_log(Address::ZERO, addr(0xCC))]);

    let executor = Executor::new(chain.clone(), auction_artifacts());
    executor
        .run(&module, &mut journal)
        .await
        .expect("first run completes");

    // Nothing is scripted for the second run; any chain interaction would
    // error out.
    let report = executor
        .run(&module, &mut journal)
        .await
        .expect("second run is a pure journal read");
    assert!(report.executed.is_empty());
    assert_eq!(report.skipped.len(), 5);
    assert_eq!(chain.deploy_count(), 2, "no additional deployments happened");

    // Outputs are still resolved from the journal.
    assert_eq!(
        report.outputs.get("proxy"),
        Some(&ArgValue::Address(addr(0xBB)))
    );
}

#[tokio::test]
async fn a_redefined_action_is_an_inconsistent_replay() {
    let chain = StubChain::new(vec![addr(0x01)]);
    chain.script_deploy(addr(0xAA), vec![]);

    let original = Module::build("Tokens", |m| {
        m.contract("Auction", [])?;
        Ok(())
    })
    .expect("module builds");

    let mut journal = MemoryJournal::new();
    let executor = Executor::new(chain.clone(), auction_artifacts());
    executor
        .run(&original, &mut journal)
        .await
        .expect("first run completes");

    // Same identifier, different definition: the sender changed.
    let redefined = Module::build("Tokens", |m| {
        let owner = m.account(1);
        m.contract_with(
            "Auction",
            [],
            embark_engine::DeployOptions {
                from: Some(owner),
                ..Default::default()
            },
        )?;
        Ok(())
    })
    .expect("module builds");

    let err = executor
        .run(&redefined, &mut journal)
        .await
        .expect_err("a changed definition must not silently reuse the result");
    assert!(matches!(
        err,
        ExecuteError::Journal(embark_engine::JournalError::InconsistentReplay { .. })
    ));
}
