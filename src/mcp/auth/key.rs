//! Public key SSH authentication.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh::keys::{Algorithm, HashAlg, PrivateKey, PrivateKeyWithHashAlg};
use tracing::debug;

use crate::mcp::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Signature hash algorithms to offer, in order, for one key.
///
/// Non-RSA keys sign with their own fixed algorithm, so a single attempt is made.
/// RSA keys try the server's advertised preference first, then SHA-512, SHA-256
/// and finally legacy SHA-1 (`ssh-rsa`, represented as `None`), without repeats.
///
/// `server_best` is `None` when the server sent no preference.
pub fn signature_candidates(
    is_rsa: bool,
    server_best: Option<Option<HashAlg>>,
) -> Vec<Option<HashAlg>> {
    if !is_rsa {
        return vec![None];
    }

    let mut candidates = Vec::with_capacity(4);
    let ordered = server_best
        .into_iter()
        .chain([Some(HashAlg::Sha512), Some(HashAlg::Sha256), None]);
    for hash_alg in ordered {
        if !candidates.contains(&hash_alg) {
            candidates.push(hash_alg);
        }
    }
    candidates
}

/// Public key authentication with an already decoded key.
///
/// The key is decoded once per batch and shared by every session.
pub struct KeyAuth {
    key: Arc<PrivateKey>,
}

impl KeyAuth {
    pub fn new(key: Arc<PrivateKey>) -> Self {
        Self { key }
    }

    fn is_rsa(&self) -> bool {
        matches!(self.key.algorithm(), Algorithm::Rsa { .. })
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let server_best = if self.is_rsa() {
            handle.best_supported_rsa_hash().await.ok().flatten()
        } else {
            None
        };

        for hash_alg in signature_candidates(self.is_rsa(), server_best) {
            debug!(
                "Trying public key authentication for {} with hash {:?}",
                username, hash_alg
            );
            let key_with_hash = PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg);
            let result = handle
                .authenticate_publickey(username, key_with_hash)
                .await
                .map_err(|e| format!("Key authentication failed: {}", e))?;

            if result.success() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn name(&self) -> &'static str {
        "publickey"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::testing::{TEST_ECDSA_KEY, TEST_ED25519_KEY};
    use russh::keys;

    fn auth_for(pem: &str) -> KeyAuth {
        KeyAuth::new(Arc::new(keys::decode_secret_key(pem, None).unwrap()))
    }

    mod candidates {
        use super::*;

        #[test]
        fn test_non_rsa_single_attempt() {
            assert_eq!(signature_candidates(false, None), vec![None]);
            assert_eq!(
                signature_candidates(false, Some(Some(HashAlg::Sha256))),
                vec![None]
            );
        }

        #[test]
        fn test_rsa_without_server_preference() {
            assert_eq!(
                signature_candidates(true, None),
                vec![Some(HashAlg::Sha512), Some(HashAlg::Sha256), None]
            );
        }

        #[test]
        fn test_rsa_server_preference_first() {
            assert_eq!(
                signature_candidates(true, Some(Some(HashAlg::Sha256))),
                vec![Some(HashAlg::Sha256), Some(HashAlg::Sha512), None]
            );
        }

        #[test]
        fn test_rsa_legacy_server_preference() {
            assert_eq!(
                signature_candidates(true, Some(None)),
                vec![None, Some(HashAlg::Sha512), Some(HashAlg::Sha256)]
            );
        }
    }

    mod strategy {
        use super::*;

        #[test]
        fn test_key_auth_name() {
            assert_eq!(auth_for(TEST_ED25519_KEY).name(), "publickey");
        }

        #[test]
        fn test_non_rsa_keys_detected() {
            assert!(!auth_for(TEST_ED25519_KEY).is_rsa());
            assert!(!auth_for(TEST_ECDSA_KEY).is_rsa());
        }
    }
}
