use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached identity checkouts
    List,

    /// Remove every cached checkout
    Clean,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration files
    Validate,

    /// Show effective configuration after merging all sources
    Show,
}

#[derive(Parser, Debug)]
#[command(name = "agent-fleet")]
#[command(about = "Resolve agent identities and reconcile fleet deployment manifests", long_about = None)]
#[command(version = env!("AGENT_FLEET_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment manifest to operate on (default: fleet.toml)
    #[arg(short = 'm', long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Show debug logs
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Log filter directive, e.g. info or agent_fleet=trace
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one identity and print its summary
    Resolve {
        /// Identity reference: a path or scheme://host/repo[#subfolder]
        reference: String,

        /// Tag, branch or commit to check out (remote sources only)
        #[arg(long = "version")]
        version_ref: Option<String>,
    },

    /// Validate the deployment manifest and report every problem
    Validate,

    /// Fetch an identity and append an agent for it to the manifest
    Add {
        /// Identity reference: a path or scheme://host/repo[#subfolder]
        reference: String,

        /// Tag, branch or commit to check out (remote sources only)
        #[arg(long = "version")]
        version_ref: Option<String>,

        /// Agent name (default: agent-<identity name>)
        #[arg(long)]
        name: Option<String>,
    },

    /// Re-fetch identities and reconcile the manifest against them
    Sync {
        /// Template variable value, NAME=VALUE (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Add agents for identities no existing agent matches
        #[arg(long)]
        adopt_new: bool,

        /// Write even with missing secrets or unresolved variables
        #[arg(long)]
        allow_incomplete: bool,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the secrets the fleet needs and which are missing
    Secrets,

    /// Manage the identity cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show version information
    Version,
}
