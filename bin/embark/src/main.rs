//! embark is a CLI for declarative, journal-backed contract deployments:
//! deploy a contract behind a transparent upgradeable proxy, resume
//! interrupted runs, and upgrade the implementation later.

mod cli;

use std::path::PathBuf;
use std::time::Duration;

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

use cli::{Cli, Command, StatusFormat};
use embark_engine::{
    Arg, ArgValue, DeploymentConfig, EMBARK_FILENAME, ExecutionReport, Executor,
    FileArtifactSource, FileJournal, HttpChainClient, Journal, Module, proxy,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // `init` writes the configuration file the other commands load.
    if let Command::Init { force } = cli.command {
        return init(cli.config.as_ref(), force);
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Deploy {
            contract,
            init_fn,
            admin_account,
        } => deploy(&config, &contract, &init_fn, admin_account).await,
        Command::Upgrade {
            contract,
            new_contract,
            init_fn,
            admin_account,
            bind_id,
            calldata,
        } => {
            upgrade(
                &config,
                &contract,
                &new_contract,
                &init_fn,
                admin_account,
                bind_id,
                &calldata,
            )
            .await
        }
        Command::Status { format } => status(&config, format),
        Command::Wipe { action_id, all } => wipe(&config, action_id, all),
    }
}

fn init(path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = path
        .cloned()
        .unwrap_or_else(|| PathBuf::from(EMBARK_FILENAME));
    let path = if path.is_dir() {
        path.join(EMBARK_FILENAME)
    } else {
        path
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    DeploymentConfig::default().save_to_file(&path)
}

/// Layered configuration: built-in defaults, then Embark.toml, then
/// `EMBARK_*` environment variables.
fn load_config(path: Option<&PathBuf>) -> Result<DeploymentConfig> {
    if let Some(path) = path
        && !path.exists()
    {
        anyhow::bail!("Configuration file or directory not found: {}", path.display());
    }

    let config_path = path
        .cloned()
        .unwrap_or_else(|| PathBuf::from(EMBARK_FILENAME));
    let config_path = if config_path.is_dir() {
        config_path.join(EMBARK_FILENAME)
    } else {
        config_path
    };

    let mut figment = Figment::from(Serialized::defaults(DeploymentConfig::default()));
    if config_path.exists() {
        tracing::debug!(path = %config_path.display(), "Loading configuration file");
        figment = figment.merge(Toml::file(&config_path));
    }

    figment
        .merge(Env::prefixed("EMBARK_"))
        .extract()
        .context("Failed to load deployment configuration")
}

async fn deploy(
    config: &DeploymentConfig,
    contract: &str,
    init_fn: &str,
    admin_account: u32,
) -> Result<()> {
    let proxy_module = proxy::proxy_module(
        &format!("{contract}ProxyModule"),
        contract,
        init_fn,
        vec![Arg::account(admin_account)],
        admin_account,
    )?;
    let module =
        proxy::proxied_contract_module(&format!("{contract}Module"), contract, &proxy_module)?;

    let report = run_module(config, &module).await?;
    print_outputs(&report);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upgrade(
    config: &DeploymentConfig,
    contract: &str,
    new_contract: &str,
    init_fn: &str,
    admin_account: u32,
    bind_id: Option<String>,
    calldata: &str,
) -> Result<()> {
    // Rebuild the original proxy module so its action identifiers line up
    // with the existing journal records.
    let proxy_module = proxy::proxy_module(
        &format!("{contract}ProxyModule"),
        contract,
        init_fn,
        vec![Arg::account(admin_account)],
        admin_account,
    )?;

    let bind_id = bind_id.unwrap_or_else(|| format!("{new_contract}AtProxy"));
    let calldata = hex::decode(calldata.trim_start_matches("0x"))
        .context("--calldata is not valid hex")?;

    let module = proxy::upgrade_module(
        &format!("{new_contract}UpgradeModule"),
        &proxy_module,
        new_contract,
        &bind_id,
        admin_account,
        Bytes::from(calldata),
    )?;

    let report = run_module(config, &module).await?;
    print_outputs(&report);
    Ok(())
}

async fn run_module(config: &DeploymentConfig, module: &Module) -> Result<ExecutionReport> {
    let url = config
        .rpc_url
        .parse::<url::Url>()
        .context("Invalid RPC URL in configuration")?;
    let chain = HttpChainClient::new(url)?
        .with_confirmation_timeout(Duration::from_secs(config.tx_timeout_secs));
    let artifacts = FileArtifactSource::new(&config.artifacts_dir);
    let mut journal = FileJournal::open(config.journal_dir())?;

    tracing::info!(
        network = %config.network_name,
        chain_id = config.chain_id,
        rpc_url = %config.rpc_url,
        module = module.name(),
        "Starting deployment run..."
    );

    let report = Executor::new(chain, artifacts).run(module, &mut journal).await?;

    tracing::info!(
        executed = report.executed.len(),
        skipped = report.skipped.len(),
        "✓ Deployment run complete"
    );
    Ok(report)
}

fn print_outputs(report: &ExecutionReport) {
    for (name, value) in &report.outputs {
        tracing::info!("{name}: {}", format_value(value));
    }
}

fn format_value(value: &ArgValue) -> String {
    match value {
        ArgValue::Address(address) => address.to_string(),
        ArgValue::Uint(value) => value.to_string(),
        ArgValue::Bool(value) => value.to_string(),
        ArgValue::Bytes(bytes) => bytes.to_string(),
        ArgValue::String(value) => value.clone(),
    }
}

fn status(config: &DeploymentConfig, format: StatusFormat) -> Result<()> {
    let journal = FileJournal::open(config.journal_dir())?;

    match format {
        StatusFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(journal.entries())
                    .context("Failed to render journal as JSON")?
            );
        }
        StatusFormat::Table => {
            if journal.entries().is_empty() {
                tracing::info!(
                    network = %config.network_name,
                    "Journal is empty; nothing deployed yet"
                );
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["Action", "Status", "Result", "Transaction"]);
            for (id, record) in journal.entries() {
                table.add_row(vec![
                    id.to_string(),
                    record.status.to_string(),
                    record
                        .result
                        .as_ref()
                        .map(format_value)
                        .unwrap_or_default(),
                    record
                        .tx_hash
                        .map(|tx_hash| tx_hash.to_string())
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn wipe(config: &DeploymentConfig, action_id: Option<String>, all: bool) -> Result<()> {
    let mut journal = FileJournal::open(config.journal_dir())?;

    if all {
        journal.reset_all()?;
        return Ok(());
    }

    let Some(action_id) = action_id else {
        anyhow::bail!("Pass an action id to wipe, or --all for the whole journal");
    };
    let Some(key) = journal
        .entries()
        .keys()
        .find(|id| id.as_str() == action_id)
        .cloned()
    else {
        anyhow::bail!("No journal record for '{action_id}'");
    };
    journal.reset(&key)?;
    Ok(())
}
