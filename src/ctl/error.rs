//! Error types for command execution, identity validation and the
//! credential bootstrap.
//!
//! # Connection Failure Classification
//!
//! SSH connection errors are split into two groups when a remote channel is
//! being constructed:
//!
//! 1. **Authentication failures (not retried)**: wrong password, rejected key,
//!    denied access. Retrying only risks locking the account.
//!
//! 2. **Transient failures (retried with backoff)**: refused or reset
//!    connections, timeouts, unreachable networks, proxy hiccups.
//!
//! Unknown messages are retried unless they look like an SSH protocol error.
//! Authentication keywords win over connection keywords.

use std::time::Duration;

use thiserror::Error;

/// Failure of a command run through a [`CommandChannel`](crate::ctl::channel::CommandChannel).
///
/// Both channel variants report through this one type; a command that ran
/// and exited nonzero and a command that never started are not told apart
/// at the trait level.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with status {}: {stderr}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

impl ExecError {
    /// True for caller-initiated cancellation and deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled | ExecError::TimedOut(_))
    }

    /// The SSH server was reached but refused every login method, or no
    /// method could be attempted. The SSH credentials come from flags, so
    /// another attempt with a new prompted config cannot fix it.
    pub fn is_login_rejected(&self) -> bool {
        match self {
            ExecError::Connection { reason, .. } => is_login_rejection(reason),
            _ => false,
        }
    }

    /// Captured standard error of a failed command, empty otherwise.
    pub fn stderr(&self) -> &str {
        match self {
            ExecError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Failure talking to the identity service.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("identity service response carried no token")]
    MissingToken,

    #[error("region `{0}` not found")]
    RegionNotFound(String),

    #[error("invalid identity service URL: {0}")]
    InvalidUrl(String),

    #[error("identity request cancelled")]
    Cancelled,

    #[error("identity request timed out after {0:?}")]
    TimedOut(Duration),
}

impl IdentityError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IdentityError::Cancelled | IdentityError::TimedOut(_))
    }
}

/// Failure reading or writing the stored credentials.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Failure while prompting for credentials.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt failed: {0}")]
    Io(String),

    #[error("prompt cancelled")]
    Cancelled,
}

/// Terminal failure of the credential bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("unable to load the config: {0}")]
    ConfigLoad(#[from] StoreError),

    #[error("unable to reach host: {0}")]
    Connection(ExecError),

    #[error("unable to read credentials: {0}")]
    Prompt(#[from] PromptError),

    #[error("{message}")]
    RetryBoundExceeded { message: String },

    #[error("bootstrap cancelled")]
    Cancelled,

    #[error("bootstrap timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<ExecError> for BootstrapError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Cancelled => BootstrapError::Cancelled,
            ExecError::TimedOut(d) => BootstrapError::TimedOut(d),
            other => BootstrapError::Connection(other),
        }
    }
}

impl BootstrapError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BootstrapError::Cancelled | BootstrapError::TimedOut(_))
    }
}

/// SSH login error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "authentication rejected",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
    "failed to decode private key",
];

/// 4xx from the proxy: bad proxy credentials or a forbidden target.
const PROXY_CLIENT_ERRORS: &[&str] = &["proxy returned 4"];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "proxy returned 502",
    "proxy returned 503",
    "proxy returned 504",
];

/// True when `error` reports an SSH login refusal rather than a transport
/// problem.
pub(crate) fn is_login_rejection(error: &str) -> bool {
    let error_lower = error.to_lowercase();
    AUTH_ERRORS.iter().any(|p| error_lower.contains(p))
}

/// Determines if an SSH connection error is transient and worth retrying.
///
/// Authentication patterns are checked first. Messages matching neither list
/// are retried unless they mention "ssh" without also mentioning a timeout
/// or a connect failure.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if is_login_rejection(&error_lower) || PROXY_CLIENT_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return true;
    }

    !error_lower.contains("ssh") || error_lower.contains("timeout") || error_lower.contains("connect")
}
