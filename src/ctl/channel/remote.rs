//! Execution over one owned SSH session.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CommandChannel, HTTPS_PROXY_VAR, SessionTransport};
use crate::ctl::client::{SshLogin, SshTransport};
use crate::ctl::config::ExecSettings;
use crate::ctl::error::ExecError;

/// Where and as whom to open the remote session.
#[derive(Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Contents of a private key file.
    pub private_key: Option<Vec<u8>>,
    pub password: Option<SecretString>,
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password)
            .finish()
    }
}

/// Serialize a command into the single line sent to the remote shell.
///
/// Every argument is wrapped in double quotes and nothing else is escaped:
/// embedded quotes or shell metacharacters pass through as-is. A non-empty
/// proxy URL is prepended as an `https_proxy=` assignment.
pub fn build_command_line(name: &str, args: &[&str], proxy_url: &str) -> String {
    let mut line = name.to_string();
    for arg in args {
        line.push_str(" \"");
        line.push_str(arg);
        line.push('"');
    }
    if proxy_url.is_empty() {
        line
    } else {
        format!("{}={} {}", HTTPS_PROXY_VAR, proxy_url, line)
    }
}

/// Command channel owning exactly one remote session.
///
/// The session is opened eagerly by [`RemoteChannel::connect`] and released
/// by [`CommandChannel::close`]; once closed, every run fails.
pub struct RemoteChannel {
    transport: Mutex<Option<Box<dyn SessionTransport>>>,
    proxy_url: String,
    timeout: Duration,
    description: String,
}

impl RemoteChannel {
    /// Open and authenticate the SSH session, failing with
    /// [`ExecError::Connection`] if the handshake or login fails.
    pub async fn connect(
        target: &RemoteTarget,
        proxy_url: &str,
        settings: &ExecSettings,
        cancel: &CancellationToken,
    ) -> Result<Self, ExecError> {
        let login = SshLogin {
            host: &target.host,
            port: target.port,
            username: &target.username,
            private_key: target.private_key.as_deref(),
            password: target.password.as_ref(),
            proxy_url,
        };

        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
            result = SshTransport::connect(&login, settings) => result?,
        };

        Ok(Self::with_transport(
            Box::new(transport),
            proxy_url,
            settings.command_timeout,
        ))
    }

    /// Wrap an already established session.
    pub fn with_transport(
        transport: Box<dyn SessionTransport>,
        proxy_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let description = transport.describe();
        Self {
            transport: Mutex::new(Some(transport)),
            proxy_url: proxy_url.into(),
            timeout,
            description,
        }
    }
}

#[async_trait]
impl CommandChannel for RemoteChannel {
    async fn run_captured(
        &self,
        name: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, ExecError> {
        let line = build_command_line(name, args, &self.proxy_url);

        let guard = self.transport.lock().await;
        let transport = guard.as_ref().ok_or_else(|| ExecError::Connection {
            target: self.description.clone(),
            reason: "session already closed".to_string(),
        })?;

        let output = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ExecError::Cancelled),

            result = tokio::time::timeout(self.timeout, transport.run_command(&line)) => result
                .map_err(|_| ExecError::TimedOut(self.timeout))??,
        };

        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        debug!("Running command {} stdout: {} stderr: {}", line, stdout, stderr);

        if !output.success() {
            return Err(ExecError::Failed {
                command: line,
                exit_code: output.exit_code.map(|c| c as i32),
                stderr,
            });
        }

        Ok(stdout)
    }

    async fn close(&self) -> Result<(), ExecError> {
        let transport = self.transport.lock().await.take();
        match transport {
            Some(transport) => transport.close().await.inspect_err(|e| {
                warn!("Failed to close session to {}: {}", self.description, e);
            }),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
