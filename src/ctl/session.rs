//! russh client handler for remote channels.
//!
//! `SshClientHandler` accepts every server host key, the equivalent of
//! `StrictHostKeyChecking=no` in OpenSSH. Provisioning targets are freshly
//! installed hosts whose keys are not known ahead of time.

use russh::{client, keys};

pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
