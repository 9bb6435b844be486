use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Rendering of the `status` subcommand's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StatusFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "embark")]
#[command(
    author,
    version,
    about = "Declarative, journal-backed contract deployments"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "EMBARK_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to an Embark.toml configuration file (or its directory).
    ///
    /// Defaults to ./Embark.toml; any value in it can be overridden through
    /// EMBARK_* environment variables.
    #[arg(short, long, env = "EMBARK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter Embark.toml configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Deploy a contract behind a fresh transparent upgradeable proxy.
    ///
    /// Re-running against an existing journal skips everything already
    /// completed, so an interrupted deployment picks up where it stopped.
    Deploy {
        /// Contract name; its artifact must exist in the artifacts directory.
        contract: String,

        /// Initializer function encoded into the proxy constructor.
        #[arg(long, default_value = "initialize", env = "EMBARK_INIT_FN")]
        init_fn: String,

        /// Signer index owning the proxy admin.
        #[arg(long, default_value_t = 0, env = "EMBARK_ADMIN_ACCOUNT")]
        admin_account: u32,
    },

    /// Upgrade a proxied contract to a new implementation.
    ///
    /// The original deployment's journal records are reused, so only the new
    /// implementation deploy and the upgrade call hit the chain.
    Upgrade {
        /// Contract currently behind the proxy.
        contract: String,

        /// New implementation contract name.
        new_contract: String,

        /// Initializer function of the original deployment (must match for
        /// the journal records to line up).
        #[arg(long, default_value = "initialize", env = "EMBARK_INIT_FN")]
        init_fn: String,

        /// Signer index owning the proxy admin.
        #[arg(long, default_value_t = 0, env = "EMBARK_ADMIN_ACCOUNT")]
        admin_account: u32,

        /// Journal identifier for the rebound proxy handle.
        /// Defaults to `<NewContract>AtProxy`.
        #[arg(long)]
        bind_id: Option<String>,

        /// Extra calldata forwarded by upgradeAndCall (hex).
        #[arg(long, default_value = "0x")]
        calldata: String,
    },

    /// Show the deployment journal.
    Status {
        #[arg(long, default_value_t = StatusFormat::Table)]
        format: StatusFormat,
    },

    /// Wipe journal records, allowing an explicit redeploy.
    Wipe {
        /// Action identifier to wipe (as shown by `status`).
        action_id: Option<String>,

        /// Wipe every record of the deployment.
        #[arg(long)]
        all: bool,
    },
}
