//! Chooses and constructs the channel for a target host.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{CommandChannel, Elevation, LocalChannel, RemoteChannel, RemoteTarget};
use crate::ctl::config::ExecSettings;
use crate::ctl::error::ExecError;

/// Where provisioning commands should run.
#[derive(Debug, Clone)]
pub enum ChannelTarget {
    /// This machine.
    Local { elevation: Elevation },
    /// A remote host over SSH.
    Remote(RemoteTarget),
}

impl ChannelTarget {
    /// Local unless a remote host was given.
    pub fn from_host(host: Option<RemoteTarget>) -> Self {
        match host {
            Some(remote) => ChannelTarget::Remote(remote),
            None => ChannelTarget::Local {
                elevation: Elevation::Sudo,
            },
        }
    }
}

/// Builds a fresh channel for each bootstrap attempt.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Construct a channel injecting `proxy_url`. Remote channels connect
    /// eagerly, so a bad host or bad SSH credentials fail here.
    async fn build(
        &self,
        proxy_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn CommandChannel>, ExecError>;
}

pub struct TargetChannelFactory {
    target: ChannelTarget,
    settings: ExecSettings,
}

impl TargetChannelFactory {
    pub fn new(target: ChannelTarget, settings: ExecSettings) -> Self {
        Self { target, settings }
    }

    pub fn target(&self) -> &ChannelTarget {
        &self.target
    }
}

#[async_trait]
impl ChannelFactory for TargetChannelFactory {
    async fn build(
        &self,
        proxy_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn CommandChannel>, ExecError> {
        match &self.target {
            ChannelTarget::Local { elevation } => Ok(Box::new(
                LocalChannel::new(proxy_url, self.settings.command_timeout).with_elevation(*elevation),
            )),
            ChannelTarget::Remote(remote) => {
                info!("Connecting to {}@{}:{}", remote.username, remote.host, remote.port);
                let channel = RemoteChannel::connect(remote, proxy_url, &self.settings, cancel).await?;
                Ok(Box::new(channel))
            }
        }
    }
}
