//! Authentication strategies for remote channels.
//!
//! - [`KeyAuth`]: private key material handed over as bytes
//! - [`PasswordAuth`]: password authentication
//! - [`AgentAuth`]: identities from the running SSH agent
//!
//! [`AuthChain`] tries them in order and stops at the first success.

mod agent;
mod chain;
mod key;
mod password;
mod traits;

pub use agent::AgentAuth;
pub use chain::AuthChain;
pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
