//! Runtime settings for channels and the identity client.
//!
//! Values resolve with a three-tier priority:
//!
//! 1. **Parameter** - explicitly provided value (highest priority)
//! 2. **Environment Variable** - value from the environment (or `.env`)
//! 3. **Default** - built-in default (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NODECTL_CONNECT_TIMEOUT` | 30s | SSH connect and handshake timeout in seconds |
//! | `NODECTL_COMMAND_TIMEOUT` | 180s | Command execution timeout in seconds |
//! | `NODECTL_IDENTITY_TIMEOUT` | 60s | Identity service request timeout in seconds |
//! | `NODECTL_CONNECT_RETRIES` | 3 | Transient SSH connect retries |
//! | `NODECTL_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `NODECTL_COMPRESSION` | true | Enable zlib compression on SSH |

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 180;
pub(crate) const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_CONNECT_RETRIES: u32 = 3;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Backoff delay never grows past this.
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "NODECTL_CONNECT_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "NODECTL_COMMAND_TIMEOUT";
pub(crate) const IDENTITY_TIMEOUT_ENV_VAR: &str = "NODECTL_IDENTITY_TIMEOUT";
pub(crate) const CONNECT_RETRIES_ENV_VAR: &str = "NODECTL_CONNECT_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "NODECTL_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "NODECTL_COMPRESSION";

/// Timeouts and retry knobs shared by every channel and the identity client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSettings {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub identity_timeout: Duration,
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub compress: bool,
}

impl ExecSettings {
    /// Resolve every setting from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: Duration::from_secs(resolve_connect_timeout(None)),
            command_timeout: Duration::from_secs(resolve_command_timeout(None)),
            identity_timeout: Duration::from_secs(resolve_identity_timeout(None)),
            connect_retries: resolve_connect_retries(None),
            retry_delay: Duration::from_millis(resolve_retry_delay_ms(None)),
            compress: resolve_compression(None),
        }
    }
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            identity_timeout: Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECS),
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            compress: true,
        }
    }
}

fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve the connect timeout (seconds): parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(param: Option<u64>) -> u64 {
    resolve(param, CONNECT_TIMEOUT_ENV_VAR, DEFAULT_CONNECT_TIMEOUT_SECS)
}

/// Resolve the command timeout (seconds): parameter -> env var -> default
pub(crate) fn resolve_command_timeout(param: Option<u64>) -> u64 {
    resolve(param, COMMAND_TIMEOUT_ENV_VAR, DEFAULT_COMMAND_TIMEOUT_SECS)
}

/// Resolve the identity request timeout (seconds): parameter -> env var -> default
pub(crate) fn resolve_identity_timeout(param: Option<u64>) -> u64 {
    resolve(param, IDENTITY_TIMEOUT_ENV_VAR, DEFAULT_IDENTITY_TIMEOUT_SECS)
}

pub(crate) fn resolve_connect_retries(param: Option<u32>) -> u32 {
    resolve(param, CONNECT_RETRIES_ENV_VAR, DEFAULT_CONNECT_RETRIES)
}

pub(crate) fn resolve_retry_delay_ms(param: Option<u64>) -> u64 {
    resolve(param, RETRY_DELAY_MS_ENV_VAR, DEFAULT_RETRY_DELAY_MS)
}

/// Resolve compression: parameter -> env var ("true"/"1") -> default (true)
pub(crate) fn resolve_compression(param: Option<bool>) -> bool {
    if let Some(compress) = param {
        return compress;
    }

    if let Ok(raw) = env::var(COMPRESSION_ENV_VAR) {
        return raw.eq_ignore_ascii_case("true") || raw == "1";
    }

    true
}
