//! Interactive collection of credentials.

use async_trait::async_trait;
use dialoguer::{Confirm, Input, Password};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::ctl::error::PromptError;
use crate::ctl::types::Config;

pub const DEFAULT_REGION: &str = "RegionOne";
pub const DEFAULT_TENANT: &str = "service";

/// Supplies a [`Config`] when none is stored or the last one was rejected.
#[async_trait]
pub trait ConfigPrompt: Send + Sync {
    /// `previous` is the last config tried in this invocation, if any; its
    /// non-secret fields are offered as defaults.
    async fn prompt(
        &self,
        previous: Option<&Config>,
        cancel: &CancellationToken,
    ) -> Result<Config, PromptError>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

fn text(prompt: &str, default: &str, allow_empty: bool) -> Result<String, PromptError> {
    let mut input = Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(allow_empty);
    if !default.is_empty() {
        input = input.default(default.to_string());
    }
    input
        .interact_text()
        .map(|s| s.trim().to_string())
        .map_err(|e| PromptError::Io(e.to_string()))
}

fn read_config(previous: Option<Config>) -> Result<Config, PromptError> {
    let previous = previous.unwrap_or_default();
    let or_default = |value: &str, fallback: &'static str| {
        if value.is_empty() {
            fallback.to_string()
        } else {
            value.to_string()
        }
    };

    let fqdn = text("Account URL", &previous.fqdn, false)?;
    let username = text("Username", &previous.username, false)?;
    let password = Password::new()
        .with_prompt("Password")
        .allow_empty_password(false)
        .interact()
        .map_err(|e| PromptError::Io(e.to_string()))?;
    let region = text("Region", &or_default(&previous.region, DEFAULT_REGION), false)?;
    let tenant = text("Tenant", &or_default(&previous.tenant, DEFAULT_TENANT), false)?;
    let proxy_url = text("Proxy URL (empty for none)", &previous.proxy_url, true)?;
    let allow_insecure = Confirm::new()
        .with_prompt("Allow insecure TLS connections")
        .default(previous.allow_insecure)
        .interact()
        .map_err(|e| PromptError::Io(e.to_string()))?;

    Ok(Config {
        fqdn,
        username,
        password: SecretString::new(password.into()),
        tenant,
        region,
        allow_insecure,
        proxy_url,
    })
}

#[async_trait]
impl ConfigPrompt for TerminalPrompt {
    async fn prompt(
        &self,
        previous: Option<&Config>,
        cancel: &CancellationToken,
    ) -> Result<Config, PromptError> {
        let previous = previous.cloned();
        // The blocking read cannot be interrupted; on cancel we stop waiting for it
        let task = tokio::task::spawn_blocking(move || read_config(previous));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PromptError::Cancelled),
            joined = task => joined.map_err(|e| PromptError::Io(e.to_string()))?,
        }
    }
}
