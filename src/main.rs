#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use nodectl::ctl::bootstrap::{Bootstrap, Bootstrapped};
use nodectl::ctl::channel::{ChannelTarget, RemoteTarget, TargetChannelFactory};
use nodectl::ctl::config::ExecSettings;
use nodectl::ctl::error::{BootstrapError, ExecError};
use nodectl::ctl::identity::KeystoneValidator;
use nodectl::ctl::prompt::TerminalPrompt;
use nodectl::ctl::store::{CredentialStore, JsonFileStore};
use nodectl::ctl::{logging, paths};

/// Exit code for a run interrupted by Ctrl+C: 128 + SIGINT.
const SIGINT_EXIT_CODE: u8 = 130;

#[derive(Parser)]
#[command(name = "nodectl")]
#[command(about = "Prepare hosts for the control plane, locally or over SSH", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base directory for the stored config and logs (default ~/.nodectl)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Remote host to run on. Commands run locally when `--ip` is absent.
#[derive(Args)]
struct TargetArgs {
    /// IP or hostname of the remote node
    #[arg(short, long, global = true)]
    ip: Option<String>,

    /// SSH port of the remote node
    #[arg(long, global = true, default_value_t = 22)]
    port: u16,

    /// SSH username for the remote node
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// SSH password for the remote node
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// SSH private key file for the remote node
    #[arg(short, long, global = true, value_name = "FILE")]
    ssh_key: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored control-plane credentials
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Validate credentials, then run a command on the target
    Exec {
        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Prompt for new credentials, validate and store them
    Set,
    /// Print the stored credentials with the password masked
    Get,
}

impl TargetArgs {
    async fn channel_target(&self) -> Result<ChannelTarget> {
        let Some(host) = self.ip.clone() else {
            return Ok(ChannelTarget::from_host(None));
        };
        let Some(username) = self.user.clone() else {
            bail!("--user is required with --ip");
        };
        if self.password.is_none() && self.ssh_key.is_none() {
            info!("No password or key given for {}, falling back to the SSH agent", host);
        }

        let private_key = match &self.ssh_key {
            Some(path) => Some(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read SSH key {}", path.display()))?,
            ),
            None => None,
        };

        Ok(ChannelTarget::from_host(Some(RemoteTarget {
            host,
            port: self.port,
            username,
            private_key,
            password: self.password.clone().map(|p| SecretString::new(p.into())),
        })))
    }
}

/// Ctrl+C, as opposed to a failure or a timeout.
fn interrupted(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<BootstrapError>(), Some(BootstrapError::Cancelled))
        || matches!(e.downcast_ref::<ExecError>(), Some(ExecError::Cancelled))
}

fn bootstrapper(store: JsonFileStore, target: ChannelTarget, settings: ExecSettings) -> Bootstrap {
    let validator = KeystoneValidator::new(settings.identity_timeout);
    Bootstrap::new(
        Box::new(store),
        Box::new(TerminalPrompt),
        Box::new(TargetChannelFactory::new(target, settings)),
        Box::new(validator),
    )
}

fn config_get(store: &JsonFileStore) -> Result<()> {
    let Some(config) = store.load()? else {
        println!("No config found at {}", store.path().display());
        return Ok(());
    };

    println!("Account URL:    {}", config.fqdn);
    println!("Username:       {}", config.username);
    println!("Password:       {}", config.masked_password());
    println!("Region:         {}", config.region);
    println!("Tenant:         {}", config.tenant);
    println!("Proxy URL:      {}", config.proxy_url);
    println!("Allow insecure: {}", config.allow_insecure);
    Ok(())
}

async fn config_set(bootstrap: Bootstrap, cancel: &CancellationToken) -> Result<(), BootstrapError> {
    let done = bootstrap.explicit_set(true).run(cancel).await?;
    if done.state.is_new_config {
        warn!("Credentials are valid but could not be stored");
    } else {
        println!("{}Stored config for {}", "✓ ".green(), done.config.username);
    }
    done.channel.close().await.ok();
    Ok(())
}

async fn exec(bootstrap: Bootstrap, command: &[String], cancel: &CancellationToken) -> Result<()> {
    let Some((name, args)) = command.split_first() else {
        bail!("no command given");
    };
    let Bootstrapped { channel, .. } = bootstrap.run(cancel).await?;

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = channel.run_captured(name, &args, cancel).await;
    channel.close().await.ok();

    let stdout = result.with_context(|| format!("`{}` failed on {}", name, channel.describe()))?;
    print!("{}", stdout);
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let home = paths::resolve_home(cli.home);
    let store = JsonFileStore::new(paths::config_file(&home));

    match cli.command {
        Commands::Config {
            action: ConfigAction::Get,
        } => config_get(&store),
        Commands::Config {
            action: ConfigAction::Set,
        } => {
            let target = cli.target.channel_target().await?;
            let bootstrap = bootstrapper(store, target, ExecSettings::from_env());
            Ok(config_set(bootstrap, &cancel).await?)
        }
        Commands::Exec { command } => {
            let target = cli.target.channel_target().await?;
            let bootstrap = bootstrapper(store, target, ExecSettings::from_env());
            exec(bootstrap, &command, &cancel).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let home = paths::resolve_home(cli.home.clone());
    // Held until exit so the file writer flushes
    let _log_guard = match logging::init(cli.verbose, &paths::log_dir(&home)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console(cli.verbose);
            warn!("Failed to set up the log file: {}", e);
            None
        }
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if interrupted(&e) {
                error!("{}", e);
                ExitCode::from(SIGINT_EXIT_CODE)
            } else {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        }
    }
}
