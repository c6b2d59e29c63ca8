//! Private key SSH authentication.
//!
//! The key arrives as raw bytes (the contents of an OpenSSH or PEM private
//! key file), so callers can read it from wherever they like.

use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::ctl::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication from in-memory key material.
///
/// Passphrase-protected keys are not supported.
pub struct KeyAuth {
    key_material: Vec<u8>,
}

impl KeyAuth {
    pub fn new(key_material: impl Into<Vec<u8>>) -> Self {
        Self {
            key_material: key_material.into(),
        }
    }

    fn decode(&self) -> Result<keys::PrivateKey, String> {
        let text = std::str::from_utf8(&self.key_material)
            .map_err(|e| format!("Failed to decode private key: not UTF-8 ({})", e))?;
        keys::decode_secret_key(text, None).map_err(|e| format!("Failed to decode private key: {}", e))
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let key_pair = self.decode()?;

        // RSA keys need the strongest hash the server offers
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| format!("Key authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
