//! At-rest encryption for stored mailbox passwords and API keys.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher keyed from the deployment's `ENCRYPTION_KEY`.
///
/// Ciphertexts are `base64url(nonce || sealed)` with a fresh random nonce
/// per encryption, so the same plaintext never produces the same token.
#[derive(Clone)]
pub struct SecretCipher {
    key: Key<Aes256Gcm>,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the AEAD key from arbitrary key material via SHA-256.
    pub fn new(key_material: &str) -> Self {
        let digest = Sha256::digest(key_material.as_bytes());
        Self {
            key: Key::<Aes256Gcm>::clone_from_slice(&digest),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(&self.key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Crypto("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(&self, token: &str) -> Result<String> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| CoreError::Crypto(format!("invalid ciphertext encoding: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(CoreError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CoreError::Crypto("decryption failed".into()))?;

        let plaintext = Zeroizing::new(plaintext);
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CoreError::Crypto("decrypted secret is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let cipher = SecretCipher::new("test-key-material");
        let token = cipher.encrypt("hunter2").unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let cipher = SecretCipher::new("test-key-material");
        let a = cipher.encrypt("same-secret").unwrap();
        let b = cipher.encrypt("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let token = SecretCipher::new("key-a").encrypt("secret").unwrap();
        let err = SecretCipher::new("key-b").decrypt(&token);
        assert!(matches!(err, Err(CoreError::Crypto(_))));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let cipher = SecretCipher::new("key");
        assert!(cipher.decrypt("not base64 !!!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }
}
