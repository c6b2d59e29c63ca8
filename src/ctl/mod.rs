//! Provisioning core: command channels and the credential bootstrap.
//!
//! - [`channel`]: run privileged commands locally or over SSH with the
//!   configured proxy injected
//! - [`bootstrap`]: load or prompt for credentials, validate them and retry
//!   within a fixed budget
//!
//! The remaining modules are the collaborators both build on.

pub mod auth;
pub mod bootstrap;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod paths;
pub mod prompt;
mod proxy;
pub mod session;
pub mod store;
pub mod types;

pub use bootstrap::{Bootstrap, Bootstrapped};
pub use channel::{ChannelFactory, ChannelTarget, CommandChannel, RemoteTarget, TargetChannelFactory};
pub use config::ExecSettings;
pub use error::{BootstrapError, ExecError, IdentityError, PromptError, StoreError};
pub use identity::{IdentityValidator, KeystoneValidator};
pub use prompt::{ConfigPrompt, TerminalPrompt};
pub use store::{CredentialStore, JsonFileStore};
pub use types::{AuthToken, Config, ValidationOutcome};
