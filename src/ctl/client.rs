//! SSH session establishment and command execution over russh.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: inactivity timeout, keepalive and compression.
//! 2. **Transport**: a direct TCP connection, or an HTTP `CONNECT` tunnel when
//!    a proxy URL is configured (see [`crate::ctl::proxy`]).
//! 3. **Authentication**: private key, then password, then SSH agent.
//! 4. **Execution**: one session channel per command; stdout, stderr and the
//!    exit status are collected until the channel closes.
//!
//! ## Retry Strategy
//!
//! Connection attempts use exponential backoff with jitter via `backon`,
//! starting at the configured delay and capped at [`MAX_RETRY_DELAY`].
//! Only failures classified as transient by [`is_retryable_error`] are
//! retried; authentication failures fail immediately to avoid lockouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, Disconnect, client};
use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use crate::ctl::auth::{AuthChain, AuthStrategy};
use crate::ctl::channel::SessionTransport;
use crate::ctl::config::{ExecSettings, MAX_RETRY_DELAY};
use crate::ctl::error::{ExecError, is_retryable_error};
use crate::ctl::proxy::open_tunnel;
use crate::ctl::session::SshClientHandler;
use crate::ctl::types::CommandOutput;

/// Build the russh client configuration.
///
/// Keepalives every 30 seconds (3 missed ones drop the session); zlib is
/// offered first when `compress` is set.
pub(crate) fn build_client_config(timeout: Duration, compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: Some(timeout),
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Everything needed to open one authenticated SSH session.
pub(crate) struct SshLogin<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub private_key: Option<&'a [u8]>,
    pub password: Option<&'a SecretString>,
    pub proxy_url: &'a str,
}

impl SshLogin<'_> {
    pub(crate) fn display_target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Connect and authenticate once, without retries.
async fn connect_to_ssh(
    login: &SshLogin<'_>,
    settings: &ExecSettings,
) -> Result<client::Handle<SshClientHandler>, String> {
    let config = build_client_config(settings.command_timeout, settings.compress);
    let timeout = settings.connect_timeout;

    let connect = async {
        if login.proxy_url.is_empty() {
            client::connect(config, (login.host, login.port), SshClientHandler)
                .await
                .map_err(|e| format!("Failed to connect: {}", e))
        } else {
            let stream = open_tunnel(login.proxy_url, login.host, login.port).await?;
            client::connect_stream(config, stream, SshClientHandler)
                .await
                .map_err(|e| format!("Failed to connect through proxy: {}", e))
        }
    };

    let mut handle = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| format!("Connection timed out after {:?}", timeout))??;

    let auth_chain = AuthChain::for_credentials(login.private_key, login.password);
    let success = auth_chain.authenticate(&mut handle, login.username).await?;

    if !success {
        return Err("Authentication failed: no authentication methods succeeded".to_string());
    }

    Ok(handle)
}

/// Connect with exponential backoff on transient failures.
///
/// Returns the session handle and the number of retries it took.
pub(crate) async fn connect_to_ssh_with_retry(
    login: &SshLogin<'_>,
    settings: &ExecSettings,
) -> Result<(client::Handle<SshClientHandler>, u32), String> {
    let attempt_counter = AtomicU32::new(0);
    let target = login.display_target();

    let backoff = ExponentialBuilder::default()
        .with_min_delay(settings.retry_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(settings.connect_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
        if current_attempt > 0 {
            warn!("SSH connection retry attempt {} to {}", current_attempt, target);
        }
        connect_to_ssh(login, settings).await
    })
    .retry(backoff)
    .when(|e| {
        let retryable = is_retryable_error(e);
        if !retryable {
            warn!("SSH connection to {} failed with non-retryable error: {}", target, e);
        }
        retryable
    })
    .notify(|err, dur| {
        warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
    })
    .await;

    let total_attempts = attempt_counter.load(Ordering::SeqCst);
    let retry_count = total_attempts.saturating_sub(1);

    match result {
        Ok(handle) => {
            if retry_count > 0 {
                info!("SSH connection to {} succeeded after {} retry attempt(s)", target, retry_count);
            }
            Ok((handle, retry_count))
        }
        Err(e) => {
            error!(
                "SSH connection to {} failed after {} attempt(s). Last error: {}",
                target, total_attempts, e
            );
            Err(format!("failed after {} attempt(s): {}", total_attempts, e))
        }
    }
}

/// Run one command line on its own session channel and collect the output.
///
/// The caller is responsible for bounding how long this may take.
pub(crate) async fn execute_ssh_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<CommandOutput, String> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| format!("Failed to open channel: {}", e))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let mut output = CommandOutput {
        stdout: Vec::with_capacity(4096),
        stderr: Vec::with_capacity(1024),
        exit_code: None,
    };

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                output.stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                // ext == 1 is stderr in the SSH protocol
                if ext == 1 {
                    output.stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                output.exit_code = Some(exit_status);
            }
            Some(ChannelMsg::Eof) => {
                if output.exit_code.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    let _ = channel.close().await;

    Ok(output)
}

/// A live, authenticated SSH session.
pub struct SshTransport {
    handle: client::Handle<SshClientHandler>,
    target: String,
}

impl SshTransport {
    pub(crate) async fn connect(login: &SshLogin<'_>, settings: &ExecSettings) -> Result<Self, ExecError> {
        let target = login.display_target();
        let (handle, retries) = connect_to_ssh_with_retry(login, settings)
            .await
            .map_err(|reason| ExecError::Connection {
                target: target.clone(),
                reason,
            })?;
        debug!("SSH session to {} ready ({} retries)", target, retries);
        Ok(Self { handle, target })
    }
}

#[async_trait]
impl SessionTransport for SshTransport {
    async fn run_command(&self, line: &str) -> Result<CommandOutput, ExecError> {
        execute_ssh_command(&self.handle, line)
            .await
            .map_err(|reason| ExecError::Spawn {
                command: line.to_string(),
                reason,
            })
    }

    async fn close(&self) -> Result<(), ExecError> {
        debug!("Closing SSH session to {}", self.target);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| ExecError::Connection {
                target: self.target.clone(),
                reason: format!("Failed to disconnect: {}", e),
            })
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}
