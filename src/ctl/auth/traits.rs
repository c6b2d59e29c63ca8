//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::ctl::session::SshClientHandler;

/// One way of proving identity to the SSH server.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate on an already handshaken connection.
    ///
    /// * `Ok(true)` - authenticated
    /// * `Ok(false)` - credentials rejected
    /// * `Err(message)` - the attempt itself failed
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}
