//! geneos CLI
//!
//! One pass over the selected instances per invocation. Instances are
//! named `[TYPE:]NAME[@HOST]`; no names selects every instance.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geneos_ctl::commands;
use gx_core::config::{self, ENV_CONFIG, ENV_HOME};
use gx_core::{Context, GlobalConfig, HostsFile, StartOptions, StopOptions};

#[derive(Parser)]
#[command(name = "geneos")]
#[command(author, version, about = "Manage Geneos instances on local and remote hosts")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = ENV_CONFIG)]
    config: Option<PathBuf>,

    /// Path to the remote hosts file (defaults to hosts.toml beside the config)
    #[arg(long, global = true)]
    hosts_file: Option<PathBuf>,

    /// Geneos root directory (overrides config)
    #[arg(short, long, global = true, env = ENV_HOME)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Instance selection shared by most commands
#[derive(Args)]
struct Selection {
    /// Instances as [TYPE:]NAME[@HOST]; wildcards allowed, none means all
    instances: Vec<String>,
}

#[derive(Args)]
struct StopFlags {
    /// Send SIGKILL straight away
    #[arg(short, long)]
    kill: bool,
    /// Stop protected instances too
    #[arg(short, long)]
    force: bool,
}

impl From<&StopFlags> for StopOptions {
    fn from(flags: &StopFlags) -> Self {
        StopOptions {
            force: flags.force,
            kill: flags.kill,
        }
    }
}

#[derive(Args)]
struct StartFlags {
    /// Extra environment variable for the process (KEY=VALUE, repeatable)
    #[arg(short, long = "env")]
    env: Vec<String>,
    /// Extra command line argument for the process (repeatable)
    #[arg(short, long = "arg", allow_hyphen_values = true)]
    arg: Vec<String>,
}

impl From<&StartFlags> for StartOptions {
    fn from(flags: &StartFlags) -> Self {
        StartOptions {
            extra_args: flags.arg.clone(),
            extra_env: flags.env.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List instances and their configuration
    #[command(alias = "ls")]
    List(Selection),

    /// Show running instances with PID, owner, uptime and listening ports
    #[command(alias = "status")]
    Ps(Selection),

    /// Start instances that are not running
    Start {
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        flags: StartFlags,
    },

    /// Stop running instances, escalating to SIGKILL
    Stop {
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        flags: StopFlags,
    },

    /// Stop then start instances
    Restart {
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        stop: StopFlags,
        #[command(flatten)]
        start: StartFlags,
    },

    /// Signal instances to reload their configuration
    Reload(Selection),

    /// Create a new instance with default settings
    Add {
        /// Component type: gateway, netprobe, webserver, licd or san
        kind: String,
        /// Instance name as NAME[@HOST]
        name: String,
        /// Port to use instead of the next free one
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Change settings: geneos set [INSTANCE...] -- key=value...
    Set {
        #[command(flatten)]
        selection: Selection,
        /// Settings as key=value
        #[arg(last = true, required = true)]
        assignments: Vec<String>,
    },

    /// Remove settings
    Unset {
        #[command(flatten)]
        selection: Selection,
        /// Setting to remove (repeatable)
        #[arg(short, long = "key", required = true)]
        keys: Vec<String>,
    },

    /// Print instance settings as JSON
    Show(Selection),

    /// Remove the disabled marker so instances can start
    Enable(Selection),

    /// Mark instances disabled so they cannot start
    Disable(Selection),

    /// Remove temporary files from instance homes
    Clean {
        #[command(flatten)]
        selection: Selection,
        /// Also remove logs and state, restarting running instances
        #[arg(short = 'F', long)]
        full: bool,
    },

    /// Convert legacy .rc configuration to JSON
    Migrate {
        #[command(flatten)]
        selection: Selection,
        /// Restore the legacy .rc file instead
        #[arg(long)]
        revert: bool,
    },

    /// Replace files with their staged .new copies, keeping .old backups
    Roll {
        /// Files to roll out
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Host the files are on
        #[arg(short = 'H', long, default_value = gx_host::LOCALHOST)]
        host: String,
    },

    /// Manage remote hosts
    Hosts {
        #[command(subcommand)]
        action: Option<HostsAction>,
    },
}

#[derive(Subcommand)]
enum HostsAction {
    /// List configured hosts
    List,
    /// Add or replace a remote host
    Add {
        /// Name used in NAME@HOST references
        name: String,
        /// Address to dial (defaults to the name)
        #[arg(long)]
        hostname: Option<String>,
        /// SSH port
        #[arg(short, long, default_value_t = 22)]
        port: u16,
        /// Login user (defaults to the current user)
        #[arg(short, long)]
        user: Option<String>,
        /// Geneos root on that host (defaults to the global root)
        #[arg(long)]
        remote_root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut global = GlobalConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config file: {:?}", config_path))?;
    if let Some(root) = &cli.root {
        global.root = root.clone();
    }

    let hosts_path = cli.hosts_file.clone().unwrap_or_else(|| {
        config_path
            .parent()
            .map(|dir| dir.join("hosts.toml"))
            .unwrap_or_else(config::default_hosts_path)
    });
    let mut hosts = HostsFile::load_or_default(&hosts_path)
        .with_context(|| format!("Failed to load hosts file: {:?}", hosts_path))?;

    if let Commands::Hosts { action } = &cli.command {
        return match action {
            None | Some(HostsAction::List) => commands::hosts_list_command(&hosts),
            Some(HostsAction::Add {
                name,
                hostname,
                port,
                user,
                remote_root,
            }) => commands::hosts_add_command(
                &hosts_path,
                &mut hosts,
                name,
                hostname.clone(),
                *port,
                user.clone(),
                remote_root.clone(),
            ),
        };
    }

    let ctx = Context::new(global, hosts);
    let result = run(&ctx, cli.command).await;
    ctx.close().await;
    result
}

async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::List(s) => commands::list_command(ctx, &s.instances).await,
        Commands::Ps(s) => commands::ps_command(ctx, &s.instances).await,
        Commands::Start { selection, flags } => {
            commands::start_command(ctx, &selection.instances, (&flags).into()).await
        }
        Commands::Stop { selection, flags } => {
            commands::stop_command(ctx, &selection.instances, (&flags).into()).await
        }
        Commands::Restart {
            selection,
            stop,
            start,
        } => {
            commands::restart_command(ctx, &selection.instances, (&stop).into(), (&start).into())
                .await
        }
        Commands::Reload(s) => commands::reload_command(ctx, &s.instances).await,
        Commands::Add { kind, name, port } => commands::add_command(ctx, &kind, &name, port).await,
        Commands::Set {
            selection,
            assignments,
        } => commands::set_command(ctx, &selection.instances, &assignments).await,
        Commands::Unset { selection, keys } => {
            commands::unset_command(ctx, &selection.instances, &keys).await
        }
        Commands::Show(s) => commands::show_command(ctx, &s.instances).await,
        Commands::Enable(s) => commands::enable_command(ctx, &s.instances).await,
        Commands::Disable(s) => commands::disable_command(ctx, &s.instances).await,
        Commands::Clean { selection, full } => {
            commands::clean_command(ctx, &selection.instances, full).await
        }
        Commands::Migrate { selection, revert } => {
            commands::migrate_command(ctx, &selection.instances, revert).await
        }
        Commands::Roll { paths, host } => commands::roll_command(ctx, &host, &paths).await,
        // handled before the context is built
        Commands::Hosts { .. } => Ok(()),
    }
}
