//! SSH agent authentication.
//!
//! Only used when the target was given without `--password` or `--ssh-key`.
//! Every failure to use the agent reads "No authentication available", which
//! [`is_retryable_error`](crate::ctl::error::is_retryable_error) treats as
//! permanent: reconnecting cannot make an agent appear.

use std::env;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use russh::client;
use russh::keys::agent::client::AgentClient;
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::ctl::session::SshClientHandler;

use super::traits::AuthStrategy;

const AGENT_SOCK_ENV: &str = "SSH_AUTH_SOCK";

/// Socket of the running agent.
fn agent_socket() -> Result<PathBuf, String> {
    env::var_os(AGENT_SOCK_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            format!(
                "No authentication available: {} is not set and neither a password nor a key was given",
                AGENT_SOCK_ENV
            )
        })
}

async fn connect_agent(socket: &Path) -> Result<AgentClient<UnixStream>, String> {
    AgentClient::connect_uds(socket).await.map_err(|e| {
        format!(
            "No authentication available: SSH agent at {} is unreachable ({})",
            socket.display(),
            e
        )
    })
}

/// Offers each identity held by the agent behind `SSH_AUTH_SOCK`.
pub struct AgentAuth;

#[async_trait]
impl AuthStrategy for AgentAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let socket = agent_socket()?;
        let mut agent = connect_agent(&socket).await?;

        let identities = agent
            .request_identities()
            .await
            .map_err(|e| format!("No authentication available: SSH agent did not list identities ({})", e))?;
        if identities.is_empty() {
            return Err("No authentication available: SSH agent holds no identities".to_string());
        }

        let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();

        for identity in identities {
            let comment = identity.comment().to_string();
            match handle
                .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => {
                    info!("Authenticated as {} with agent identity {:?}", username, comment);
                    return Ok(true);
                }
                Ok(_) => debug!("Agent identity {:?} rejected", comment),
                Err(e) => debug!("Agent identity {:?} failed: {}", comment, e),
            }
        }

        Ok(false)
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}
