//! Data types shared by the execution channels and the credential bootstrap.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Serializes a `SecretString` as a plain string.
mod secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize as DeserializeTrait, Serialize as SerializeTrait};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        secret.expose_secret().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecretString::new(s.into()))
    }
}

/// One set of control-plane credentials.
///
/// The password is held as a [`SecretString`] so it never shows up in
/// `Debug` output or log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fqdn: String,
    pub username: String,
    #[serde(with = "secret_string")]
    pub password: SecretString,
    pub tenant: String,
    pub region: String,
    #[serde(default)]
    pub allow_insecure: bool,
    #[serde(default)]
    pub proxy_url: String,
}

impl Config {
    /// Account URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.fqdn.trim_end_matches('/')
    }

    /// Password rendered as asterisks, for display.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.expose_secret().chars().count())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fqdn: String::new(),
            username: String::new(),
            password: SecretString::new(String::new().into()),
            tenant: String::new(),
            region: String::new(),
            allow_insecure: false,
            proxy_url: String::new(),
        }
    }
}

/// Token issued by the identity service.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub token: SecretString,
    pub user_id: String,
    pub project_id: String,
}

/// Result of one credential validation attempt.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Success { token: AuthToken, endpoint: String },
    AuthFailure,
    RegionFailure { reason: String },
}

impl ValidationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationOutcome::Success { .. })
    }
}

/// Raw output of one command run over a session transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the remote side closed without reporting a status.
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
