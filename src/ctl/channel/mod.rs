//! Privileged command execution, locally or on a remote host.
//!
//! A [`CommandChannel`] runs a program with arguments and reports a single
//! [`ExecError`] on failure. Two variants exist:
//!
//! - [`LocalChannel`]: elevated child process on this machine
//! - [`RemoteChannel`]: command line sent over one owned SSH session
//!
//! Both inject the configured proxy as `https_proxy` for the command.
//! [`ChannelFactory`] picks the variant for a target.

mod factory;
mod local;
mod remote;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ctl::error::ExecError;
use crate::ctl::types::CommandOutput;

pub use factory::{ChannelFactory, ChannelTarget, TargetChannelFactory};
pub use local::{Elevation, LocalChannel};
pub use remote::{RemoteChannel, RemoteTarget, build_command_line};

/// Name of the proxy variable handed to every command.
pub const HTTPS_PROXY_VAR: &str = "https_proxy";

/// Capability to run privileged commands on the target host.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run `name args..`; succeeds iff the command exits with status zero.
    async fn run(&self, name: &str, args: &[&str], cancel: &CancellationToken) -> Result<(), ExecError> {
        self.run_captured(name, args, cancel).await.map(|_| ())
    }

    /// Run `name args..` and return its standard output.
    ///
    /// On a nonzero exit the error carries the captured standard error.
    async fn run_captured(
        &self,
        name: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, ExecError>;

    /// Release whatever the channel holds open. Idempotent.
    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Human readable description of where commands run.
    fn describe(&self) -> String;
}

/// One authenticated remote session able to run a command line.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn run_command(&self, line: &str) -> Result<CommandOutput, ExecError>;

    async fn close(&self) -> Result<(), ExecError>;

    fn describe(&self) -> String;
}
